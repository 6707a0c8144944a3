//! mu-types - Canonical domain types for the mu control plane
//!
//! This crate contains all foundational types shared across the control
//! plane with zero dependencies on other `mu-*` crates. It defines the
//! complete data model from the specification:
//!
//! - Identity types (`BindingId`, `IdentityBinding`, assurance tiers)
//! - Inbound/outbound envelope types
//! - `CommandRecord` and its finite state machine
//! - The `Issue` work-item graph
//! - `OutboxRecord` and dedupe keys
//! - `GenerationIdentity` and reload attempts

pub mod adapter_audit;
pub mod channel;
pub mod command;
pub mod envelope;
pub mod error;
pub mod generation;
pub mod idempotency;
pub mod identity;
pub mod issue;
pub mod outbox;
pub mod policy;

pub use adapter_audit::*;
pub use channel::*;
pub use command::*;
pub use envelope::*;
pub use error::*;
pub use generation::*;
pub use idempotency::*;
pub use identity::*;
pub use issue::*;
pub use outbox::*;
pub use policy::*;

/// Version of the control-plane on-disk schema.
pub const SCHEMA_VERSION: u32 = 1;

/// Milliseconds since the Unix epoch, used for every timestamp field in
/// this crate. Kept as a plain alias rather than `chrono::DateTime` so
/// journals serialize as plain integers.
pub type TimestampMs = i64;

/// Current wall-clock time in milliseconds, the single place every other
/// crate calls into for `now`.
pub fn now_ms() -> TimestampMs {
    chrono::Utc::now().timestamp_millis()
}
