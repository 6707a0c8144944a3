//! mu-store - durable, file-backed state for the mu control plane.
//!
//! Owns every journal under `<repo_root>/.mu/control-plane/` (spec.md
//! §4.1-§4.3, §6): the writer lock, the JSONL append primitive, the
//! identity binding store, the idempotency index, the command lifecycle
//! journal, the adapter audit trail, and the `server.json` discovery
//! file.

pub mod adapter_audit;
pub mod command_journal;
pub mod idempotency;
pub mod identity_store;
pub mod jsonl;
pub mod paths;
pub mod policy_store;
pub mod server_info;
pub mod writer_lock;

pub use adapter_audit::AdapterAuditLog;
pub use command_journal::CommandJournal;
pub use idempotency::IdempotencyIndex;
pub use identity_store::IdentityStore;
pub use jsonl::JsonlStore;
pub use paths::ControlPlanePaths;
pub use server_info::ServerInfo;
pub use writer_lock::WriterLock;
