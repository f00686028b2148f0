//! Diff-based push subscription management.
//!
//! `SubscriptionBook` is the pure state machine: given a selection it plans
//! which keys to subscribe and unsubscribe. `SubscriptionManager` owns the
//! book and performs the planned calls through a `PushRegistrar`.
//!
//! State is in-process only. A restart starts empty and the next discovery
//! cycle re-establishes the right set.

pub mod poller;
pub mod registrar;

use futures_util::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::OriginError;
use crate::models::SelectionSet;

pub use poller::LivePoller;
pub use registrar::{OriginPushRegistrar, PollRegistrar, PushRegistrar};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    Unsubscribed,
    Subscribing,
    Subscribed,
    Unsubscribing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubscriptionMode {
    /// Origin pushes updates to our webhook.
    #[default]
    Push,
    /// We fetch watched matches on a timer.
    Poll,
}

impl SubscriptionMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "push" | "webhook" => Some(SubscriptionMode::Push),
            "poll" | "polling" => Some(SubscriptionMode::Poll),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionMode::Push => "push",
            SubscriptionMode::Poll => "poll",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionPlan {
    pub subscribe: Vec<String>,
    pub unsubscribe: Vec<String>,
}

impl SubscriptionPlan {
    pub fn is_empty(&self) -> bool {
        self.subscribe.is_empty() && self.unsubscribe.is_empty()
    }
}

/// Per-key subscription state. Absent keys are `Unsubscribed`.
#[derive(Debug, Default)]
pub struct SubscriptionBook {
    states: BTreeMap<String, SubscriptionState>,
}

impl SubscriptionBook {
    pub fn state(&self, key: &str) -> SubscriptionState {
        self.states
            .get(key)
            .copied()
            .unwrap_or(SubscriptionState::Unsubscribed)
    }

    /// Unsubscribe every confirmed key that left the selection; subscribe
    /// every selected key not yet confirmed, which also retries keys a
    /// previous cycle failed on.
    pub fn diff(&self, selection: &SelectionSet) -> SubscriptionPlan {
        let unsubscribe = self
            .states
            .iter()
            .filter(|(k, s)| **s == SubscriptionState::Subscribed && !selection.contains(k))
            .map(|(k, _)| k.clone())
            .collect();

        let mut subscribe: Vec<String> = Vec::with_capacity(selection.len());
        for key in &selection.keys {
            if self.state(key) != SubscriptionState::Subscribed && !subscribe.contains(key) {
                subscribe.push(key.clone());
            }
        }

        SubscriptionPlan {
            subscribe,
            unsubscribe,
        }
    }

    pub fn mark(&mut self, key: &str, state: SubscriptionState) {
        if state == SubscriptionState::Unsubscribed {
            self.states.remove(key);
        } else {
            self.states.insert(key.to_string(), state);
        }
    }

    /// Marks the plan's keys as in flight.
    pub fn begin(&mut self, plan: &SubscriptionPlan) {
        for key in &plan.subscribe {
            self.mark(key, SubscriptionState::Subscribing);
        }
        for key in &plan.unsubscribe {
            self.mark(key, SubscriptionState::Unsubscribing);
        }
    }

    pub fn subscribed(&self) -> Vec<String> {
        self.keys_in(SubscriptionState::Subscribed)
    }

    /// Every key with a registration that may exist upstream.
    pub fn tracked(&self) -> Vec<String> {
        self.states.keys().cloned().collect()
    }

    fn keys_in(&self, state: SubscriptionState) -> Vec<String> {
        self.states
            .iter()
            .filter(|(_, s)| **s == state)
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub fn clear(&mut self) {
        self.states.clear();
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionEntry {
    pub event_key: String,
    pub state: SubscriptionState,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub subscribed: Vec<String>,
    pub unsubscribed: Vec<String>,
    pub failed: Vec<String>,
}

pub struct SubscriptionManager {
    registrar: Arc<dyn PushRegistrar>,
    book: Mutex<SubscriptionBook>,
    // Serializes cycles; the book lock is never held across registrar calls.
    cycle: tokio::sync::Mutex<()>,
}

impl SubscriptionManager {
    pub fn new(registrar: Arc<dyn PushRegistrar>) -> Self {
        Self {
            registrar,
            book: Mutex::new(SubscriptionBook::default()),
            cycle: tokio::sync::Mutex::new(()),
        }
    }

    pub fn mode(&self) -> SubscriptionMode {
        self.registrar.mode()
    }

    /// Reconciles upstream registrations with `selection`. All calls of the
    /// cycle run concurrently; one failing key never affects another.
    pub async fn apply_selection(&self, selection: &SelectionSet) -> CycleReport {
        let _cycle = self.cycle.lock().await;

        let plan = {
            let mut book = self.book.lock();
            let plan = book.diff(selection);
            book.begin(&plan);
            plan
        };
        if plan.is_empty() {
            debug!("subscriptions already match selection");
            return CycleReport::default();
        }

        let registrar = &self.registrar;
        let unsubscribes = join_all(plan.unsubscribe.iter().map(|key| async move {
            (key, registrar.unregister(key).await)
        }));
        let subscribes = join_all(plan.subscribe.iter().map(|key| async move {
            (key, registrar.register(key).await)
        }));
        let (unsub_results, sub_results) = tokio::join!(unsubscribes, subscribes);

        let mut report = CycleReport::default();
        let mut book = self.book.lock();

        for (key, result) in unsub_results {
            match result {
                Ok(()) | Err(OriginError::NotFound) => {
                    book.mark(key, SubscriptionState::Unsubscribed);
                    report.unsubscribed.push(key.clone());
                }
                Err(e) => {
                    warn!(event_key = %key, error = %e, "unsubscribe failed, keeping subscription");
                    book.mark(key, SubscriptionState::Subscribed);
                    report.failed.push(key.clone());
                }
            }
        }

        for (key, result) in sub_results {
            match result {
                Ok(()) | Err(OriginError::AlreadySubscribed) => {
                    book.mark(key, SubscriptionState::Subscribed);
                    report.subscribed.push(key.clone());
                }
                Err(e) => {
                    warn!(event_key = %key, error = %e, "subscribe failed, will retry next cycle");
                    book.mark(key, SubscriptionState::Unsubscribed);
                    report.failed.push(key.clone());
                }
            }
        }

        info!(
            "🔔 Subscription cycle: +{} -{} failed={} (mode={})",
            report.subscribed.len(),
            report.unsubscribed.len(),
            report.failed.len(),
            self.registrar.mode().as_str()
        );
        report
    }

    /// Best-effort unregister of everything still tracked, bounded by
    /// `timeout`. Failures and the timeout itself are swallowed.
    pub async fn shutdown(&self, timeout: Duration) -> usize {
        let keys = {
            let mut book = self.book.lock();
            let keys = book.tracked();
            book.clear();
            keys
        };
        if keys.is_empty() {
            return 0;
        }
        info!("🔕 Unsubscribing {} matches before exit", keys.len());

        let registrar = &self.registrar;
        let calls = join_all(keys.iter().map(|key| async move {
            match registrar.unregister(key).await {
                Ok(()) => true,
                Err(e) => {
                    debug!(event_key = %key, error = %e, "unsubscribe on shutdown failed");
                    false
                }
            }
        }));

        match tokio::time::timeout(timeout, calls).await {
            Ok(results) => results.into_iter().filter(|ok| *ok).count(),
            Err(_) => {
                warn!("unsubscribe-all timed out after {:?}", timeout);
                0
            }
        }
    }

    pub fn subscribed_keys(&self) -> Vec<String> {
        self.book.lock().subscribed()
    }

    pub fn state(&self, key: &str) -> SubscriptionState {
        self.book.lock().state(key)
    }

    pub fn snapshot(&self) -> Vec<SubscriptionEntry> {
        self.book
            .lock()
            .states
            .iter()
            .map(|(k, s)| SubscriptionEntry {
                event_key: k.clone(),
                state: *s,
            })
            .collect()
    }
}
