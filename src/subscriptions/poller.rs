//! Poll-mode refresh of watched matches.
//!
//! Runs each fetched payload through the same write-through and fan-out
//! path as webhook ingestion.

use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::registrar::PollRegistrar;
use crate::hub::FanOutHub;
use crate::origin::OriginClient;
use crate::writer::{UpdateWriter, WriteOutcome};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    pub applied: usize,
    pub skipped: usize,
    pub failed: usize,
    pub retired: usize,
}

pub struct LivePoller {
    registrar: Arc<PollRegistrar>,
    origin: Arc<dyn OriginClient>,
    writer: UpdateWriter,
    hub: Arc<FanOutHub>,
    interval: Duration,
}

impl LivePoller {
    pub fn new(
        registrar: Arc<PollRegistrar>,
        origin: Arc<dyn OriginClient>,
        writer: UpdateWriter,
        hub: Arc<FanOutHub>,
        interval: Duration,
    ) -> Self {
        Self {
            registrar,
            origin,
            writer,
            hub,
            interval,
        }
    }

    /// One pass over the watch set. Per-key failures are logged and counted.
    pub async fn poll_once(&self) -> PollReport {
        let keys = self.registrar.watched();
        if keys.is_empty() {
            return PollReport::default();
        }

        let fetches = keys.iter().map(|key| async move {
            (key, self.origin.get_event_details(key).await)
        });

        let mut report = PollReport::default();
        for (key, result) in join_all(fetches).await {
            let details = match result {
                Ok(d) => d,
                Err(e) => {
                    warn!(event_key = %key, error = %e, "poll fetch failed");
                    report.failed += 1;
                    continue;
                }
            };

            match self
                .writer
                .apply(key, details.payload, details.hint.as_ref())
                .await
            {
                WriteOutcome::Applied { document, .. } => {
                    self.hub.publish(key, &document.detailed);
                    report.applied += 1;
                    if document.status.is_terminal() && self.registrar.retire(key) {
                        report.retired += 1;
                    }
                }
                WriteOutcome::IgnoredTerminal | WriteOutcome::AlreadyFinal => {
                    report.skipped += 1;
                    if self.registrar.retire(key) {
                        report.retired += 1;
                    }
                }
            }
        }
        report
    }

    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(
            "🔁 Live poller started (every {}s)",
            self.interval.as_secs()
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Live poller shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let report = self.poll_once().await;
                    if report != PollReport::default() {
                        debug!(
                            applied = report.applied,
                            skipped = report.skipped,
                            failed = report.failed,
                            retired = report.retired,
                            "poll pass done"
                        );
                    }
                }
            }
        }
    }
}
