//! Raw origin payload → `DetailedUpdate`.
//!
//! Pure and deterministic: the same raw payload always yields the same
//! output, so downstream equality checks can skip redundant writes.

pub mod format;
pub mod payload;

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::models::{BattingLine, BowlingLine, DetailedUpdate, ExtrasBreakdown, InningsSummary};
use format::{balls_from_overs, format_overs, format_rate, run_rate};
use payload::{InningsStats, RawInnings, RawMatch, RawTeam};

const NOT_OUT: &str = "not out";

/// Normalizes a raw match payload. Never fails; structural problems
/// produce a degraded update carrying an error marker.
pub fn normalize(raw: &Value) -> DetailedUpdate {
    match try_normalize(raw) {
        Ok(update) => update,
        Err(e) => {
            warn!(error = %e, "normalization degraded");
            DetailedUpdate::degraded(e.to_string())
        }
    }
}

pub fn try_normalize(raw: &Value) -> Result<DetailedUpdate, serde_json::Error> {
    let parsed = RawMatch::deserialize(raw)?;

    let mut innings = Vec::new();
    for key in innings_keys(&parsed) {
        let Some(entry) = parsed.play.innings.get(key) else {
            debug!(innings = %key, "innings listed in order but missing from payload");
            continue;
        };
        let entry = RawInnings::deserialize(entry)?;
        innings.push(summarize_innings(key, &entry, &parsed));
    }

    Ok(DetailedUpdate {
        innings,
        result: parsed.play.result.clone(),
        error: None,
    })
}

/// Explicit `innings_order` when given, otherwise payload order.
fn innings_keys(parsed: &RawMatch) -> Vec<&str> {
    match parsed.play.innings_order.as_deref() {
        Some(order) if !order.is_empty() => order.iter().map(String::as_str).collect(),
        _ => {
            if parsed.play.innings.len() > 1 {
                warn!("payload has no innings_order, using document order");
            }
            parsed.play.innings.keys().map(String::as_str).collect()
        }
    }
}

fn batting_team(innings_key: &str, teams: &HashMap<String, RawTeam>) -> Option<String> {
    let side = innings_key.split('_').next()?;
    teams.get(side).and_then(|t| t.name.clone())
}

fn summarize_innings(key: &str, innings: &RawInnings, parsed: &RawMatch) -> InningsSummary {
    let score = &innings.score;
    let balls = score
        .balls
        .unwrap_or_else(|| balls_from_overs(innings.overs));
    let rate = score.run_rate.or_else(|| run_rate(score.runs, balls));

    let extras = &innings.extra_runs;
    let extras = ExtrasBreakdown {
        total: extras.extra.unwrap_or_else(|| {
            extras
                .bye
                .saturating_add(extras.leg_bye)
                .saturating_add(extras.wide)
                .saturating_add(extras.no_ball)
        }),
        byes: extras.bye,
        leg_byes: extras.leg_bye,
        wides: extras.wide,
        no_balls: extras.no_ball,
    };

    let (batting, bowling) = match InningsStats::resolve(key, innings, &parsed.players) {
        InningsStats::Rich { batting, bowling } => (
            batting
                .iter()
                .map(|b| batting_line(&b.player_key, b.name.as_deref(), Some(&b.figures)))
                .collect(),
            bowling
                .iter()
                .map(|b| bowling_line(&b.player_key, b.name.as_deref(), Some(&b.figures)))
                .collect(),
        ),
        InningsStats::Legacy {
            innings_key,
            batting_order,
            bowling_order,
            players,
        } => {
            let lookup = move |pk: &str| {
                let player = players.get(pk);
                let stats = player.and_then(|p| p.innings.get(innings_key));
                (player.and_then(|p| p.name.as_deref()), stats)
            };
            (
                batting_order
                    .iter()
                    .map(|pk| {
                        let (name, stats) = lookup(pk);
                        batting_line(pk, name, stats.and_then(|s| s.batting.as_ref()))
                    })
                    .collect(),
                bowling_order
                    .iter()
                    .map(|pk| {
                        let (name, stats) = lookup(pk);
                        bowling_line(pk, name, stats.and_then(|s| s.bowling.as_ref()))
                    })
                    .collect(),
            )
        }
    };

    InningsSummary {
        key: key.to_string(),
        batting_team: batting_team(key, &parsed.teams),
        runs: score.runs,
        wickets: score.wickets,
        overs: format_overs(innings.overs),
        run_rate: format_rate(rate),
        extras,
        batting,
        bowling,
    }
}

fn batting_line(
    player_key: &str,
    name: Option<&str>,
    figures: Option<&payload::BattingFigures>,
) -> BattingLine {
    let name = name.unwrap_or(player_key).to_string();
    let Some(f) = figures else {
        return BattingLine {
            player_key: player_key.to_string(),
            name,
            dismissal: NOT_OUT.to_string(),
            strike_rate: format_rate(None),
            ..Default::default()
        };
    };
    BattingLine {
        player_key: player_key.to_string(),
        name,
        dismissal: f.dismissal.clone().unwrap_or_else(|| NOT_OUT.to_string()),
        runs: f.runs,
        balls: f.balls,
        fours: f.fours,
        sixes: f.sixes,
        strike_rate: format_rate(f.strike_rate),
    }
}

fn bowling_line(
    player_key: &str,
    name: Option<&str>,
    figures: Option<&payload::BowlingFigures>,
) -> BowlingLine {
    let name = name.unwrap_or(player_key).to_string();
    let Some(f) = figures else {
        return BowlingLine {
            player_key: player_key.to_string(),
            name,
            overs: format_overs(None),
            economy: format_rate(None),
            ..Default::default()
        };
    };
    BowlingLine {
        player_key: player_key.to_string(),
        name,
        overs: format_overs(f.overs),
        maidens: f.maidens,
        runs: f.runs,
        wickets: f.wickets,
        economy: format_rate(f.economy),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rich_payload() -> Value {
        json!({
            "key": "m1",
            "status": "started",
            "teams": {"a": {"name": "India"}, "b": {"name": "Australia"}},
            "play": {
                "innings_order": ["a_1", "b_1"],
                "innings": {
                    "b_1": {
                        "score": {"runs": 20, "wickets": 0, "balls": 12},
                        "overs": [2, 0],
                        "batting_stats": [{"player_key": "p5", "name": "Head", "runs": 15, "balls": 8}]
                    },
                    "a_1": {
                        "score": {"runs": 180, "wickets": 6, "run_rate": "9"},
                        "overs": [20, 0],
                        "extra_runs": {"extra": 9, "bye": 1, "leg_bye": 2, "wide": 5, "no_ball": 1},
                        "batting_stats": [
                            {"player_key": "p1", "name": "Rohit", "runs": 60, "balls": 40,
                             "fours": 6, "sixes": 3, "strike_rate": 150.0, "dismissal": "c Smith b Starc"},
                            {"player_key": "p2", "name": "Virat", "runs": "45", "balls": "30"}
                        ],
                        "bowling_stats": [
                            {"player_key": "p9", "name": "Starc", "overs": [4, 0], "maidens": 0,
                             "runs": 35, "wickets": 2, "economy": 8.75}
                        ]
                    }
                },
                "result": {"msg": "India need 161 runs"}
            }
        })
    }

    #[test]
    fn test_rich_stats_normalize() {
        let out = normalize(&rich_payload());
        assert!(!out.is_degraded());
        assert_eq!(out.innings.len(), 2);

        let first = &out.innings[0];
        assert_eq!(first.key, "a_1");
        assert_eq!(first.batting_team.as_deref(), Some("India"));
        assert_eq!(first.runs, 180);
        assert_eq!(first.overs, "20.0");
        assert_eq!(first.run_rate, "9.00");
        assert_eq!(first.extras.total, 9);
        assert_eq!(first.batting[0].strike_rate, "150.00");
        assert_eq!(first.batting[0].dismissal, "c Smith b Starc");
        assert_eq!(first.bowling[0].economy, "8.75");
        assert_eq!(first.bowling[0].overs, "4.0");
        assert_eq!(out.result.as_deref(), Some("India need 161 runs"));
    }

    #[test]
    fn test_missing_strike_rate_defaults_to_zero_string() {
        let out = normalize(&rich_payload());
        let virat = &out.innings[0].batting[1];
        assert_eq!(virat.runs, 45);
        assert_eq!(virat.strike_rate, "0.00");
        assert_eq!(virat.dismissal, "not out");
    }

    #[test]
    fn test_run_rate_computed_from_balls() {
        let out = normalize(&rich_payload());
        assert_eq!(out.innings[1].run_rate, "10.00");
    }

    #[test]
    fn test_legacy_stats_use_player_lookup() {
        let raw = json!({
            "play": {
                "innings": {
                    "a_1": {
                        "score": {"runs": 10, "wickets": 1},
                        "batting_order": ["p1", "ghost"],
                        "bowling_order": ["p9"]
                    }
                }
            },
            "players": {
                "p1": {"name": "Gill", "innings": {"a_1": {"batting": {
                    "runs": 10, "balls": 8, "strike_rate": 125, "dismissal": {"msg": "b Cummins"}}}}},
                "p9": {"name": "Cummins", "innings": {"a_1": {"bowling": {
                    "overs": [1, 2], "runs": 10, "wickets": 1}}}}
            }
        });
        let out = normalize(&raw);
        let inn = &out.innings[0];
        assert_eq!(inn.batting[0].name, "Gill");
        assert_eq!(inn.batting[0].strike_rate, "125.00");
        assert_eq!(inn.batting[0].dismissal, "b Cummins");
        assert_eq!(inn.batting[1].name, "ghost");
        assert_eq!(inn.batting[1].runs, 0);
        assert_eq!(inn.batting[1].strike_rate, "0.00");
        assert_eq!(inn.bowling[0].overs, "1.2");
        assert_eq!(inn.bowling[0].economy, "0.00");
        assert_eq!(inn.overs, "0.0");
    }

    #[test]
    fn test_document_order_without_innings_order() {
        let raw = json!({"play": {"innings": {"b_1": {}, "a_1": {}}}});
        let out = normalize(&raw);
        let keys: Vec<_> = out.innings.iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, vec!["b_1", "a_1"]);
    }

    #[test]
    fn test_structural_error_degrades() {
        let raw = json!({"play": {"innings": {"a_1": {"batting_stats": "oops"}}}});
        let out = normalize(&raw);
        assert!(out.is_degraded());
        assert!(out.innings.is_empty());
    }

    #[test]
    fn test_empty_payload_is_empty_update() {
        let out = normalize(&json!({"key": "m1"}));
        assert!(!out.is_degraded());
        assert!(out.innings.is_empty());
        assert!(out.result.is_none());
    }

    #[test]
    fn test_deterministic() {
        let raw = rich_payload();
        let a = serde_json::to_string(&normalize(&raw)).unwrap();
        let b = serde_json::to_string(&normalize(&raw)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_extreme_numbers_do_not_overflow() {
        let max = u32::MAX as u64;
        let raw = json!({
            "play": {
                "innings": {
                    "a_1": {
                        "score": {"runs": 1e30, "wickets": max, "balls": max},
                        "overs": [max, max],
                        "extra_runs": {"bye": max, "leg_bye": max, "wide": 1, "no_ball": 1},
                        "batting_stats": [{"player_key": "p1", "runs": max, "balls": max, "fours": max}]
                    },
                    "b_1": {
                        "extra_runs": {"extra": 5, "bye": max, "wide": 1}
                    }
                }
            }
        });
        let out = normalize(&raw);
        assert!(!out.is_degraded());
        assert_eq!(out.innings[0].extras.total, u32::MAX);
        assert_eq!(out.innings[0].runs, u32::MAX);
        assert_eq!(out.innings[1].extras.total, 5);
    }
}
