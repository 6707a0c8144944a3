//! Re-exports the policy type owned by `mu-types` so callers only need
//! to depend on `mu_pipeline::policy` for pipeline-facing code.

pub use mu_types::policy::Policy;
