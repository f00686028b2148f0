//! Live cricket update distribution backend.
//!
//! Discovers live matches at the origin, keeps push subscriptions in step
//! with that selection, ingests webhook deliveries through a tiered cache
//! and fans normalized scorecards out to WebSocket clients.

pub mod api;
pub mod app;
pub mod cache;
pub mod config;
pub mod discovery;
pub mod error;
pub mod hub;
pub mod ingestion;
pub mod live_data;
pub mod middleware;
pub mod models;
pub mod normalizer;
pub mod origin;
pub mod store;
pub mod subscriptions;
pub mod writer;

pub use app::LiveFeed;
pub use config::{Config, FeedSettings};
