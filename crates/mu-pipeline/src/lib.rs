//! mu-pipeline - the Issue DAG engine and the Command Pipeline FSM
//! (spec.md §4.5, §4.6).
//!
//! `issue_dag` is pure: no I/O, no mutation, deterministic ordering.
//! `pipeline` ties identity, idempotency, confirmation, and execution
//! dispatch together on top of `mu-store`'s journals.

pub mod command_parser;
pub mod confirmation;
pub mod executor;
pub mod issue_dag;
pub mod pipeline;
pub mod policy;

pub use executor::{CliInvoker, CommandExecutor, ExecutorOutcome, OperatorBackend};
pub use pipeline::{CommandPipeline, CommandPipelineResult};
