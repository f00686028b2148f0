//! Per-match interest groups and selective fan-out.
//!
//! Each connected client gets one bounded channel of pre-serialized
//! frames. A frame is serialized once per publish and shared by every
//! member of the group. A client whose queue is full is cut off rather
//! than buffered without limit.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::models::{DetailedUpdate, WsServerEvent};

pub type Frame = Arc<str>;

/// Frames queued per subscriber before it counts as a slow consumer.
pub const SUBSCRIBER_QUEUE: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

#[derive(Default)]
struct HubState {
    senders: HashMap<SubscriberId, mpsc::Sender<Frame>>,
    groups: HashMap<String, Vec<SubscriberId>>,
}

#[derive(Default)]
pub struct FanOutHub {
    state: Mutex<HubState>,
    next_id: AtomicU64,
    serialized: AtomicU64,
    delivered: AtomicU64,
    slow_dropped: AtomicU64,
}

impl FanOutHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a subscriber handle and its delivery channel.
    pub fn register(&self) -> (SubscriberId, mpsc::Receiver<Frame>) {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE);
        self.state.lock().senders.insert(id, tx);
        (id, rx)
    }

    /// Adds `subscriber` to the group for `event_key`. Returns false for an
    /// unknown handle or a duplicate join.
    pub fn join(&self, event_key: &str, subscriber: SubscriberId) -> bool {
        let mut state = self.state.lock();
        if !state.senders.contains_key(&subscriber) {
            return false;
        }
        let members = state.groups.entry(event_key.to_string()).or_default();
        if members.contains(&subscriber) {
            return false;
        }
        members.push(subscriber);
        debug!(event_key, %subscriber, members = members.len(), "joined interest group");
        true
    }

    pub fn leave(&self, event_key: &str, subscriber: SubscriberId) -> bool {
        let mut state = self.state.lock();
        let Some(members) = state.groups.get_mut(event_key) else {
            return false;
        };
        let before = members.len();
        members.retain(|m| *m != subscriber);
        let removed = members.len() != before;
        if members.is_empty() {
            state.groups.remove(event_key);
        }
        removed
    }

    /// Removes the handle from every group and drops its channel.
    pub fn on_disconnect(&self, subscriber: SubscriberId) {
        let mut state = self.state.lock();
        state.senders.remove(&subscriber);
        state.groups.retain(|_, members| {
            members.retain(|m| *m != subscriber);
            !members.is_empty()
        });
        debug!(%subscriber, "subscriber disconnected");
    }

    /// Sends a frame to one subscriber outside any group (acks, pongs).
    pub fn send_to(&self, subscriber: SubscriberId, event: &WsServerEvent) -> bool {
        let frame = match serde_json::to_string(event) {
            Ok(s) => Frame::from(s),
            Err(e) => {
                warn!(error = %e, "failed to encode direct frame");
                return false;
            }
        };
        let mut state = self.state.lock();
        let Some(tx) = state.senders.get(&subscriber) else {
            return false;
        };
        match tx.try_send(frame) {
            Ok(()) => true,
            Err(e) => {
                self.cut_off(&mut state, subscriber, &e);
                false
            }
        }
    }

    /// Delivers `update` to every member of the group. No-op, with no
    /// serialization, when nobody is listening. Returns deliveries made.
    pub fn publish(&self, event_key: &str, update: &DetailedUpdate) -> usize {
        if self.group_size(event_key) == 0 {
            return 0;
        }

        let event = WsServerEvent::Update {
            event_key: event_key.to_string(),
            detailed_update: update.clone(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        let frame: Frame = match serde_json::to_string(&event) {
            Ok(s) => Frame::from(s),
            Err(e) => {
                warn!(event_key, error = %e, "failed to encode update frame");
                return 0;
            }
        };
        self.serialized.fetch_add(1, Ordering::Relaxed);

        // Sending under the lock keeps per-group order equal to lock order.
        let mut state = self.state.lock();
        let Some(members) = state.groups.get(event_key) else {
            return 0;
        };

        let mut delivered = 0;
        let mut failed = Vec::new();
        for id in members {
            match state.senders.get(id).map(|tx| tx.try_send(frame.clone())) {
                Some(Ok(())) => delivered += 1,
                Some(Err(e)) => failed.push((*id, e)),
                None => failed.push((*id, TrySendError::Closed(frame.clone()))),
            }
        }

        for (id, err) in failed {
            self.cut_off(&mut state, id, &err);
        }

        self.delivered.fetch_add(delivered as u64, Ordering::Relaxed);
        delivered
    }

    /// Forgets a subscriber whose channel is closed or full. Dropping the
    /// sender ends the client's receive loop once it drains.
    fn cut_off(&self, state: &mut HubState, id: SubscriberId, err: &TrySendError<Frame>) {
        if let TrySendError::Full(_) = err {
            warn!(subscriber = %id, queued = SUBSCRIBER_QUEUE, "slow subscriber dropped");
            self.slow_dropped.fetch_add(1, Ordering::Relaxed);
        }
        state.senders.remove(&id);
        state.groups.retain(|_, members| {
            members.retain(|m| *m != id);
            !members.is_empty()
        });
    }

    pub fn group_size(&self, event_key: &str) -> usize {
        self.state
            .lock()
            .groups
            .get(event_key)
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub fn group_count(&self) -> usize {
        self.state.lock().groups.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lock().senders.len()
    }

    /// Frames serialized by `publish` since start.
    pub fn serialized_frames(&self) -> u64 {
        self.serialized.load(Ordering::Relaxed)
    }

    pub fn delivered_frames(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Subscribers disconnected for not draining their queue.
    pub fn slow_dropped(&self) -> u64 {
        self.slow_dropped.load(Ordering::Relaxed)
    }
}
