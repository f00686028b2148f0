//! Start-up configuration.
//!
//! Every setting has an env var and a CLI flag; env comes from `.env` files
//! found by `load_env` as well as the process environment.

use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::TtlPolicy;
use crate::origin::http::DEFAULT_ORIGIN_BASE;
use crate::subscriptions::SubscriptionMode;

#[derive(Parser, Debug, Clone)]
#[command(name = "livefeed")]
#[command(about = "Live cricket update distribution with tiered caching")]
pub struct Config {
    /// HTTP listen port
    #[arg(long, env = "PORT", default_value = "3000")]
    pub port: u16,

    /// Origin REST base URL
    #[arg(long, env = "ORIGIN_BASE_URL", default_value = DEFAULT_ORIGIN_BASE)]
    pub origin_base_url: String,

    #[arg(long, env = "ORIGIN_PROJECT_KEY", default_value = "")]
    pub origin_project_key: String,

    #[arg(long, env = "ORIGIN_API_KEY", default_value = "", hide_env_values = true)]
    pub origin_api_key: String,

    /// Shared secret expected on webhook deliveries (empty rejects all)
    #[arg(long, env = "WEBHOOK_SECRET", default_value = "", hide_env_values = true)]
    pub webhook_secret: String,

    #[arg(long, env = "WEBHOOK_SECRET_HEADER", default_value = "x-webhook-secret")]
    pub webhook_secret_header: String,

    /// Durable store path; relative paths resolve against the crate dir
    #[arg(long, env = "DB_PATH")]
    pub db_path: Option<String>,

    #[arg(long, env = "DISCOVERY_INTERVAL_SECS", default_value = "30")]
    pub discovery_interval_secs: u64,

    /// Number of live matches tracked closely
    #[arg(long, env = "SELECTION_SIZE", default_value = "5")]
    pub selection_size: usize,

    /// push (origin webhooks) or poll
    #[arg(long, env = "SUBSCRIPTION_MODE", default_value = "push", value_parser = parse_mode)]
    pub subscription_mode: SubscriptionMode,

    #[arg(long, env = "POLL_INTERVAL_SECS", default_value = "10")]
    pub poll_interval_secs: u64,

    /// Live-tier TTL, clamped to 10..=30
    #[arg(long, env = "LIVE_TTL_SECS", default_value = "15")]
    pub live_ttl_secs: u64,

    #[arg(long, env = "SHUTDOWN_TIMEOUT_SECS", default_value = "5")]
    pub shutdown_timeout_secs: u64,

    #[arg(long, env = "FAST_CACHE_MAX_ENTRIES", default_value = "10000")]
    pub fast_cache_max_entries: usize,
}

fn parse_mode(raw: &str) -> std::result::Result<SubscriptionMode, String> {
    SubscriptionMode::parse(raw).ok_or_else(|| format!("unknown subscription mode '{}'", raw))
}

impl Config {
    /// Loads `.env` files, then parses flags and environment.
    pub fn from_env() -> Result<Self> {
        load_env();
        Self::try_parse().context("Invalid configuration")
    }

    pub fn db_path(&self) -> String {
        resolve_data_path(self.db_path.clone(), "livefeed_store.db")
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn feed_settings(&self) -> FeedSettings {
        FeedSettings {
            selection_size: self.selection_size.max(1),
            discovery_interval: Duration::from_secs(self.discovery_interval_secs.max(1)),
            poll_interval: Duration::from_secs(self.poll_interval_secs.max(1)),
            mode: self.subscription_mode,
            ttl: TtlPolicy::with_live_secs(self.live_ttl_secs),
            webhook_secret: self.webhook_secret.clone(),
            webhook_secret_header: self.webhook_secret_header.to_ascii_lowercase(),
        }
    }
}

/// Runtime knobs of the pipeline itself, independent of where they came from.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub selection_size: usize,
    pub discovery_interval: Duration,
    pub poll_interval: Duration,
    pub mode: SubscriptionMode,
    pub ttl: TtlPolicy,
    pub webhook_secret: String,
    pub webhook_secret_header: String,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            selection_size: 5,
            discovery_interval: Duration::from_secs(30),
            poll_interval: Duration::from_secs(10),
            mode: SubscriptionMode::Push,
            ttl: TtlPolicy::default(),
            webhook_secret: String::new(),
            webhook_secret_header: "x-webhook-secret".to_string(),
        }
    }
}

fn default_data_path(filename: &str) -> String {
    let base = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    base.join(filename).to_string_lossy().to_string()
}

pub fn resolve_data_path(env_value: Option<String>, default_filename: &str) -> String {
    let base = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let Some(raw) = env_value.filter(|v| !v.trim().is_empty()) else {
        return default_data_path(default_filename);
    };
    if raw == ":memory:" {
        return raw;
    }

    let p = PathBuf::from(raw);
    if p.is_absolute() {
        return p.to_string_lossy().to_string();
    }

    base.join(p).to_string_lossy().to_string()
}

pub fn load_env() {
    // Standard dotenv search (cwd + parents)
    let _ = dotenv();

    // Also the crate dir, for runs started from elsewhere.
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    let candidate = manifest_dir.join(".env");
    if candidate.exists() {
        let _ = dotenv::from_path(&candidate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_defaults() {
        let cfg = Config::try_parse_from([
            "livefeed",
            "--port",
            "8080",
            "--subscription-mode",
            "poll",
            "--live-ttl-secs",
            "90",
            "--selection-size",
            "3",
        ])
        .unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.subscription_mode, SubscriptionMode::Poll);

        let settings = cfg.feed_settings();
        assert_eq!(settings.selection_size, 3);
        assert_eq!(settings.ttl.live, Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(Config::try_parse_from(["livefeed", "--port", "eighty"]).is_err());
        assert!(
            Config::try_parse_from(["livefeed", "--subscription-mode", "carrier-pigeon"]).is_err()
        );
    }

    #[test]
    fn test_resolve_data_path() {
        assert_eq!(resolve_data_path(Some("/tmp/x.db".into()), "d.db"), "/tmp/x.db");
        assert_eq!(resolve_data_path(Some(":memory:".into()), "d.db"), ":memory:");
        assert!(resolve_data_path(None, "d.db").ends_with("d.db"));
        assert!(resolve_data_path(Some("  ".into()), "d.db").ends_with("d.db"));
    }
}
