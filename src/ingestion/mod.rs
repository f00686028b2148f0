//! Inbound push deliveries: authenticate, decode, normalize, write through,
//! fan out.
//!
//! Gates run strictly in order and the first failure ends processing.
//! Nothing is decompressed or parsed before the shared secret matches.

pub mod decode;

use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::IngestError;
use crate::hub::FanOutHub;
use crate::writer::{UpdateWriter, WriteOutcome};

pub use decode::decode_body;

/// One raw delivery as received by the HTTP layer.
#[derive(Debug, Clone, Copy)]
pub struct InboundDelivery<'a> {
    pub secret: Option<&'a str>,
    pub content_encoding: Option<&'a str>,
    pub body: &'a [u8],
}

#[derive(Debug)]
pub enum IngestOutcome {
    Applied {
        event_key: String,
        delivered: usize,
        /// Completes when the background durable upsert has landed.
        durable: JoinHandle<()>,
    },
    /// Acknowledged without any write.
    MissingKey,
    IgnoredTerminal {
        event_key: String,
    },
    AlreadyFinal {
        event_key: String,
    },
}

pub struct IngestionService {
    secret: String,
    writer: UpdateWriter,
    hub: Arc<FanOutHub>,
}

impl IngestionService {
    /// An empty `secret` rejects every delivery.
    pub fn new(secret: impl Into<String>, writer: UpdateWriter, hub: Arc<FanOutHub>) -> Self {
        let secret = secret.into();
        if secret.is_empty() {
            warn!("⚠️  WEBHOOK_SECRET not set - all webhook deliveries will be rejected");
        }
        Self {
            secret,
            writer,
            hub,
        }
    }

    pub async fn ingest(&self, delivery: InboundDelivery<'_>) -> Result<IngestOutcome, IngestError> {
        if !self.authorized(delivery.secret) {
            return Err(IngestError::Unauthorized);
        }

        let decoded = decode_body(delivery.body, delivery.content_encoding)?;
        let parsed: Value = serde_json::from_slice(&decoded)
            .map_err(|e| IngestError::InvalidPayload(format!("malformed json: {}", e)))?;

        let payload = unwrap_envelope(parsed);
        let Some(event_key) = event_key(&payload) else {
            info!("webhook delivery without match key, acknowledged");
            return Ok(IngestOutcome::MissingKey);
        };

        match self.writer.apply(&event_key, payload, None).await {
            WriteOutcome::Applied { document, durable } => {
                let delivered = self.hub.publish(&event_key, &document.detailed);
                debug!(
                    event_key = %event_key,
                    status = document.status.as_str(),
                    delivered,
                    "webhook update applied"
                );
                Ok(IngestOutcome::Applied {
                    event_key,
                    delivered,
                    durable,
                })
            }
            WriteOutcome::IgnoredTerminal => Ok(IngestOutcome::IgnoredTerminal { event_key }),
            WriteOutcome::AlreadyFinal => Ok(IngestOutcome::AlreadyFinal { event_key }),
        }
    }

    fn authorized(&self, provided: Option<&str>) -> bool {
        match provided {
            Some(p) if !self.secret.is_empty() => {
                constant_time_eq(p.as_bytes(), self.secret.as_bytes())
            }
            _ => false,
        }
    }
}

/// Accepts a bare record or one wrapped under `data`.
pub fn unwrap_envelope(mut body: Value) -> Value {
    if body.get("data").is_some_and(Value::is_object) {
        return body["data"].take();
    }
    body
}

pub fn event_key(payload: &Value) -> Option<String> {
    ["key", "match_key"]
        .iter()
        .filter_map(|field| payload.get(*field).and_then(|v| v.as_str()))
        .map(str::trim)
        .find(|k| !k.is_empty())
        .map(str::to_string)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
