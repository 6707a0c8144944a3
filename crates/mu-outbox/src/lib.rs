//! The durable outbound queue: at-least-once delivery with dedupe and
//! retry (spec.md §4.7).

pub mod backoff;
pub mod outbox;
pub mod worker;

pub use backoff::backoff_ms;
pub use outbox::{DedupeKind, EnqueueOutcome, Outbox, DEFAULT_MAX_ATTEMPTS};
pub use worker::{ChannelDelivery, DeliveryObserver, OutboxWorker};
