//! `GenerationIdentity` and reload attempts (spec.md §3, §4.8).

use serde::{Deserialize, Serialize};

/// `{generation_id, generation_seq}` - a monotonically numbered instance
/// of the adapter registry (spec.md §3, GLOSSARY "Generation").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationIdentity {
    pub generation_id: u64,
    pub generation_seq: u64,
}

impl GenerationIdentity {
    pub fn genesis() -> Self {
        Self {
            generation_id: 0,
            generation_seq: 0,
        }
    }

    pub fn next(self) -> Self {
        Self {
            generation_id: self.generation_id + 1,
            generation_seq: self.generation_seq + 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReloadAttemptState {
    Planned,
    SwapInstalled,
    FinishedSuccess,
    FinishedFailure,
}

/// A single reload attempt (spec.md §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReloadAttempt {
    pub attempt_id: String,
    pub from_generation: GenerationIdentity,
    pub to_generation: GenerationIdentity,
    pub state: ReloadAttemptState,
    pub reason: String,
}
