//! Raw origin match payload.
//!
//! Upstream numbers arrive as JSON numbers, numeric strings, or not at all,
//! so every numeric field goes through a lenient deserializer.
//!
//! Shape (fields not listed are ignored):
//!
//! ```text
//! { "key", "status",
//!   "teams":   { "a": {"name"}, "b": {"name"} },
//!   "play":    { "innings_order": ["a_1", ...],
//!                "innings": { "a_1": { "score": {"runs","wickets","balls","run_rate"},
//!                                      "overs": [whole, balls],
//!                                      "extra_runs": {"extra","bye","leg_bye","wide","no_ball"},
//!                                      "batting_order": [player_key], "bowling_order": [player_key],
//!                                      "batting_stats": [rich line], "bowling_stats": [rich line] } },
//!                "result": {"msg"} },
//!   "players": { player_key: { "name", "innings": { "a_1": {"batting", "bowling"} } } } }
//! ```

use serde::{de::DeserializeOwned, Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::collections::HashMap;

#[derive(Debug, Default, Deserialize)]
pub struct RawMatch {
    #[serde(default, deserialize_with = "de_null_default")]
    pub play: RawPlay,
    #[serde(default, deserialize_with = "de_null_default")]
    pub teams: HashMap<String, RawTeam>,
    #[serde(default, deserialize_with = "de_null_default")]
    pub players: HashMap<String, LegacyPlayer>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawTeam {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawPlay {
    #[serde(default)]
    pub innings_order: Option<Vec<String>>,
    /// Kept as an ordered map; entries are decoded one at a time.
    #[serde(default, deserialize_with = "de_null_default")]
    pub innings: Map<String, Value>,
    #[serde(default, deserialize_with = "de_message_opt")]
    pub result: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawInnings {
    #[serde(default, deserialize_with = "de_null_default")]
    pub score: RawScore,
    #[serde(default, deserialize_with = "de_overs_opt")]
    pub overs: Option<(u32, u32)>,
    #[serde(default, deserialize_with = "de_null_default")]
    pub extra_runs: RawExtras,
    #[serde(default, deserialize_with = "de_null_default")]
    pub batting_order: Vec<String>,
    #[serde(default, deserialize_with = "de_null_default")]
    pub bowling_order: Vec<String>,
    #[serde(default, deserialize_with = "de_null_default")]
    pub batting_stats: Vec<RichBatting>,
    #[serde(default, deserialize_with = "de_null_default")]
    pub bowling_stats: Vec<RichBowling>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawScore {
    #[serde(default, deserialize_with = "de_u32")]
    pub runs: u32,
    #[serde(default, deserialize_with = "de_u32")]
    pub wickets: u32,
    #[serde(default, deserialize_with = "de_u32_opt")]
    pub balls: Option<u32>,
    #[serde(default, deserialize_with = "de_f64_opt")]
    pub run_rate: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawExtras {
    #[serde(default, deserialize_with = "de_u32_opt")]
    pub extra: Option<u32>,
    #[serde(default, deserialize_with = "de_u32")]
    pub bye: u32,
    #[serde(default, deserialize_with = "de_u32")]
    pub leg_bye: u32,
    #[serde(default, deserialize_with = "de_u32")]
    pub wide: u32,
    #[serde(default, deserialize_with = "de_u32")]
    pub no_ball: u32,
}

#[derive(Debug, Default, Deserialize)]
pub struct BattingFigures {
    #[serde(default, deserialize_with = "de_u32")]
    pub runs: u32,
    #[serde(default, deserialize_with = "de_u32")]
    pub balls: u32,
    #[serde(default, deserialize_with = "de_u32")]
    pub fours: u32,
    #[serde(default, deserialize_with = "de_u32")]
    pub sixes: u32,
    #[serde(default, deserialize_with = "de_f64_opt")]
    pub strike_rate: Option<f64>,
    #[serde(default, deserialize_with = "de_message_opt")]
    pub dismissal: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BowlingFigures {
    #[serde(default, deserialize_with = "de_overs_opt")]
    pub overs: Option<(u32, u32)>,
    #[serde(default, deserialize_with = "de_u32")]
    pub maidens: u32,
    #[serde(default, deserialize_with = "de_u32")]
    pub runs: u32,
    #[serde(default, deserialize_with = "de_u32")]
    pub wickets: u32,
    #[serde(default, deserialize_with = "de_f64_opt")]
    pub economy: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RichBatting {
    #[serde(alias = "key", default)]
    pub player_key: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub figures: BattingFigures,
}

#[derive(Debug, Default, Deserialize)]
pub struct RichBowling {
    #[serde(alias = "key", default)]
    pub player_key: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub figures: BowlingFigures,
}

/// Legacy per-player record, looked up by player key.
#[derive(Debug, Default, Deserialize)]
pub struct LegacyPlayer {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "de_null_default")]
    pub innings: HashMap<String, LegacyInnings>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LegacyInnings {
    #[serde(default)]
    pub batting: Option<BattingFigures>,
    #[serde(default)]
    pub bowling: Option<BowlingFigures>,
}

/// Which participant-stats layout an innings uses, decided once per innings.
#[derive(Debug)]
pub enum InningsStats<'a> {
    Rich {
        batting: &'a [RichBatting],
        bowling: &'a [RichBowling],
    },
    Legacy {
        innings_key: &'a str,
        batting_order: &'a [String],
        bowling_order: &'a [String],
        players: &'a HashMap<String, LegacyPlayer>,
    },
}

impl<'a> InningsStats<'a> {
    /// Rich stats win whenever present and non-empty.
    pub fn resolve(
        innings_key: &'a str,
        innings: &'a RawInnings,
        players: &'a HashMap<String, LegacyPlayer>,
    ) -> Self {
        if !innings.batting_stats.is_empty() || !innings.bowling_stats.is_empty() {
            InningsStats::Rich {
                batting: &innings.batting_stats,
                bowling: &innings.bowling_stats,
            }
        } else {
            InningsStats::Legacy {
                innings_key,
                batting_order: &innings.batting_order,
                bowling_order: &innings.bowling_order,
                players,
            }
        }
    }
}

// ===== Lenient deserializers =====

fn value_to_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                None
            } else {
                s.parse::<f64>().ok()
            }
        }
        _ => None,
    }
}

fn value_to_u32(v: &Value) -> Option<u32> {
    if let Some(n) = v.as_u64() {
        return Some(n.min(u32::MAX as u64) as u32);
    }
    value_to_f64(v)
        .filter(|f| f.is_finite() && *f >= 0.0)
        .map(|f| f.min(u32::MAX as f64) as u32)
}

pub(crate) fn de_u32<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    Ok(value_to_u32(&v).unwrap_or(0))
}

pub(crate) fn de_u32_opt<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    Ok(value_to_u32(&v))
}

pub(crate) fn de_f64_opt<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    Ok(value_to_f64(&v))
}

/// `[whole, balls]` pair. Anything else is treated as absent.
pub(crate) fn de_overs_opt<'de, D>(deserializer: D) -> Result<Option<(u32, u32)>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    match v {
        Value::Array(items) if items.len() == 2 => Ok(value_to_u32(&items[0])
            .zip(value_to_u32(&items[1]))),
        _ => Ok(None),
    }
}

/// Either a bare string or an object carrying `msg`.
pub(crate) fn de_message_opt<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    let msg = match v {
        Value::String(s) => Some(s),
        Value::Object(map) => map.get("msg").and_then(|m| m.as_str()).map(str::to_string),
        _ => None,
    };
    Ok(msg.filter(|m| !m.trim().is_empty()))
}

/// Treats an explicit `null` like a missing field.
pub(crate) fn de_null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + DeserializeOwned,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
