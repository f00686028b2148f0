use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Match lifecycle status as reported by the origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EventStatus {
    NotStarted,
    Live,
    Completed,
    Abandoned,
    Cancelled,
    #[default]
    Unknown,
}

impl EventStatus {
    /// Lenient parse of the upstream status vocabulary.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "not_started" | "notstarted" | "upcoming" | "scheduled" => EventStatus::NotStarted,
            "started" | "live" | "in_progress" => EventStatus::Live,
            "completed" | "finished" | "result" => EventStatus::Completed,
            "abandoned" => EventStatus::Abandoned,
            "cancelled" | "canceled" => EventStatus::Cancelled,
            _ => EventStatus::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::NotStarted => "not_started",
            EventStatus::Live => "live",
            EventStatus::Completed => "completed",
            EventStatus::Abandoned => "abandoned",
            EventStatus::Cancelled => "cancelled",
            EventStatus::Unknown => "unknown",
        }
    }

    /// Terminal matches are frozen after their final write.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EventStatus::Completed | EventStatus::Abandoned | EventStatus::Cancelled
        )
    }

    /// Reads `status` off a raw match payload.
    pub fn from_payload(raw: &Value) -> Self {
        raw.get("status")
            .and_then(|v| v.as_str())
            .map(EventStatus::parse)
            .unwrap_or_default()
    }
}

impl Serialize for EventStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let v = Value::deserialize(deserializer)?;
        Ok(v.as_str().map(EventStatus::parse).unwrap_or_default())
    }
}

/// Entry of the origin's featured/candidate match list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSummary {
    #[serde(alias = "match_key")]
    pub key: String,
    #[serde(default)]
    pub status: EventStatus,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub start_at: Option<i64>,
}

/// Normalized per-match scorecard pushed to subscribers.
///
/// Always rebuilt wholesale from the raw payload; never patched in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetailedUpdate {
    pub innings: Vec<InningsSummary>,
    /// Closing message, e.g. the result line.
    #[serde(default)]
    pub result: Option<String>,
    /// Set when normalization degraded; `innings` is then empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DetailedUpdate {
    pub fn degraded(reason: impl Into<String>) -> Self {
        Self {
            innings: Vec::new(),
            result: None,
            error: Some(reason.into()),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InningsSummary {
    pub key: String,
    #[serde(default)]
    pub batting_team: Option<String>,
    pub runs: u32,
    pub wickets: u32,
    /// Formatted as `"overs.balls"`.
    pub overs: String,
    /// Formatted with two decimals.
    pub run_rate: String,
    pub extras: ExtrasBreakdown,
    pub batting: Vec<BattingLine>,
    pub bowling: Vec<BowlingLine>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtrasBreakdown {
    pub total: u32,
    pub byes: u32,
    pub leg_byes: u32,
    pub wides: u32,
    pub no_balls: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattingLine {
    pub player_key: String,
    pub name: String,
    pub dismissal: String,
    pub runs: u32,
    pub balls: u32,
    pub fours: u32,
    pub sixes: u32,
    pub strike_rate: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BowlingLine {
    pub player_key: String,
    pub name: String,
    pub overs: String,
    pub maidens: u32,
    pub runs: u32,
    pub wickets: u32,
    pub economy: String,
}

/// Durable record for one match (also the shape cached under `match:{key}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDocument {
    pub key: String,
    pub status: EventStatus,
    pub raw: Value,
    pub detailed: DetailedUpdate,
    /// Epoch seconds of the last write.
    pub updated_at: i64,
}

impl EventDocument {
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn from_value(value: Value) -> Option<Self> {
        serde_json::from_value(value).ok()
    }
}

/// Ranked set of matches currently under close tracking.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionSet {
    pub keys: Vec<String>,
    pub selected_at: i64,
}

impl SelectionSet {
    pub fn new(keys: Vec<String>, selected_at: i64) -> Self {
        Self { keys, selected_at }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Frames pushed down the fan-out channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsServerEvent {
    Update {
        event_key: String,
        detailed_update: DetailedUpdate,
        timestamp: i64,
    },
    Subscribed {
        event_key: String,
    },
    Unsubscribed {
        event_key: String,
    },
    Pong {
        timestamp: i64,
    },
    Error {
        message: String,
    },
}

/// Frames accepted from fan-out clients.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsClientMessage {
    Subscribe {
        event_key: String,
    },
    Unsubscribe {
        event_key: String,
    },
    Ping {
        #[serde(default)]
        timestamp: i64,
    },
}
