//! The delivery worker loop (spec.md §4.7, §5).
//!
//! Holds the outbox lock only while selecting and transitioning a
//! record; the delivery callback itself runs outside that lock (spec.md
//! §5 "The Outbox worker holds a lock only while selecting and
//! transitioning a record; the delivery callback runs outside the
//! lock"). Never mutates `CommandRecord`s directly: callers that need
//! to react to a completed delivery register a `DeliveryObserver` and
//! fold that signal into their own state (spec.md §9 "do not let the
//! delivery worker mutate CommandRecords directly; instead emit a
//! `delivery_completed` signal the pipeline consumes").

use crate::outbox::{DEFAULT_MAX_ATTEMPTS, Outbox};
use async_trait::async_trait;
use mu_types::channel::Channel;
use mu_types::outbox::{OutboundEnvelope, OutboxRecord};
use mu_types::TimestampMs;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// A channel-specific outbound transport. Implementations live in the
/// adapters crate; this trait is the seam (spec.md §9 "adapter
/// polymorphism ... trait objects").
#[async_trait]
pub trait ChannelDelivery: Send + Sync {
    async fn deliver(&self, envelope: &OutboundEnvelope) -> Result<(), String>;
}

/// Notified after an outbox record reaches a terminal state for this
/// attempt, so a caller can fold the result into its own bookkeeping
/// without the worker reaching back into pipeline state.
pub trait DeliveryObserver: Send + Sync {
    fn on_delivery_completed(&self, record: &OutboxRecord);
}

pub struct OutboxWorker {
    outbox: Arc<Outbox>,
    channels: HashMap<Channel, Arc<dyn ChannelDelivery>>,
    max_attempts: u32,
    observer: Option<Arc<dyn DeliveryObserver>>,
}

impl OutboxWorker {
    pub fn new(outbox: Arc<Outbox>) -> Self {
        Self {
            outbox,
            channels: HashMap::new(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            observer: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn DeliveryObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn register_channel(mut self, channel: Channel, delivery: Arc<dyn ChannelDelivery>) -> Self {
        self.channels.insert(channel, delivery);
        self
    }

    /// Deliver at most one due record. Returns the record as it stood
    /// after the attempt, or `None` if nothing was due.
    pub async fn run_once(&self, now_ms: TimestampMs) -> Option<OutboxRecord> {
        let due = self.outbox.next_due(now_ms)?;
        let result = match self.channels.get(&due.envelope.channel) {
            Some(delivery) => delivery.deliver(&due.envelope).await,
            None => Err(format!("no delivery channel registered for {:?}", due.envelope.channel)),
        };

        let updated = match result {
            Ok(()) => match self.outbox.mark_delivered(&due.outbox_id, now_ms) {
                Ok(record) => {
                    info!(outbox_id = %record.outbox_id, "outbox delivery succeeded");
                    record
                }
                Err(e) => {
                    warn!(error = %e, "failed to journal delivered state");
                    return None;
                }
            },
            Err(error) => match self.outbox.mark_failed(&due.outbox_id, error.clone(), self.max_attempts, now_ms) {
                Ok(record) => {
                    warn!(outbox_id = %record.outbox_id, %error, state = ?record.state, "outbox delivery failed");
                    record
                }
                Err(e) => {
                    warn!(error = %e, "failed to journal delivery failure");
                    return None;
                }
            },
        };

        if let Some(observer) = &self.observer {
            observer.on_delivery_completed(&updated);
        }
        Some(updated)
    }

    /// Poll forever at `poll_interval`, delivering every due record on
    /// each tick before sleeping again.
    pub async fn run_forever(&self, poll_interval: Duration, now_ms_fn: impl Fn() -> TimestampMs) {
        loop {
            while self.run_once(now_ms_fn()).await.is_some() {}
            tokio::time::sleep(poll_interval).await;
        }
    }
}
