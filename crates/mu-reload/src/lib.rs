//! Generation supervisor and reload manager: warmup / cutover / drain /
//! rollback of the adapter runtime under a live process (spec.md §4.8).

pub mod generation;
pub mod manager;

pub use generation::{GenerationSupervisor, ReloadOutcome};
pub use manager::{ReloadCounters, ReloadManager, ReloadResult, Reloader};
