//! `GenerationSupervisor`: a monotonic `(generation_id, generation_seq)`
//! plus the single in-flight reload attempt (spec.md §4.8).
//!
//! The ReloadManager exclusively owns this supervisor (spec.md §3); it
//! never reaches into the active generation pointer except through the
//! API below.

use mu_types::error::MuError;
use mu_types::generation::{GenerationIdentity, ReloadAttempt, ReloadAttemptState};
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    Success,
    Failure,
}

struct State {
    active_generation: GenerationIdentity,
    in_flight: Option<ReloadAttempt>,
    history: BTreeMap<String, ReloadAttempt>,
    last_reload: Option<ReloadAttempt>,
}

pub struct GenerationSupervisor {
    state: Mutex<State>,
}

impl GenerationSupervisor {
    pub fn new(active_generation: GenerationIdentity) -> Self {
        Self {
            state: Mutex::new(State {
                active_generation,
                in_flight: None,
                history: BTreeMap::new(),
                last_reload: None,
            }),
        }
    }

    pub fn active_generation(&self) -> GenerationIdentity {
        self.state.lock().unwrap().active_generation
    }

    pub fn last_reload(&self) -> Option<ReloadAttempt> {
        self.state.lock().unwrap().last_reload.clone()
    }

    pub fn get_attempt(&self, attempt_id: &str) -> Option<ReloadAttempt> {
        self.state.lock().unwrap().history.get(attempt_id).cloned()
    }

    /// `beginReload(reason) -> {attempt, coalesced}` (spec.md §4.8).
    pub fn begin_reload(&self, reason: impl Into<String>) -> (ReloadAttempt, bool) {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state.in_flight.clone() {
            return (existing, true);
        }
        let from_generation = state.active_generation;
        let attempt = ReloadAttempt {
            attempt_id: format!("reload-{}", uuid::Uuid::new_v4()),
            from_generation,
            to_generation: from_generation.next(),
            state: ReloadAttemptState::Planned,
            reason: reason.into(),
        };
        state.in_flight = Some(attempt.clone());
        state.history.insert(attempt.attempt_id.clone(), attempt.clone());
        (attempt, false)
    }

    /// `markSwapInstalled(attempt_id) -> bool` - transitions
    /// `planned -> swap_installed` and activates `to_generation`. The
    /// bool is true only for the call that actually performed the
    /// transition.
    pub fn mark_swap_installed(&self, attempt_id: &str) -> bool {
        let mut state = self.state.lock().unwrap();
        let installed = match &state.in_flight {
            Some(attempt) if attempt.attempt_id == attempt_id && attempt.state == ReloadAttemptState::Planned => true,
            _ => false,
        };
        if !installed {
            return false;
        }
        let to_generation = state.in_flight.as_ref().unwrap().to_generation;
        if let Some(attempt) = state.in_flight.as_mut() {
            attempt.state = ReloadAttemptState::SwapInstalled;
        }
        state.active_generation = to_generation;
        if let Some(attempt) = state.in_flight.clone() {
            state.history.insert(attempt.attempt_id.clone(), attempt);
        }
        true
    }

    /// `rollbackSwapInstalled(attempt_id) -> bool` - only valid from
    /// `swap_installed`; reverts the active generation to
    /// `from_generation`.
    pub fn rollback_swap_installed(&self, attempt_id: &str) -> bool {
        let mut state = self.state.lock().unwrap();
        let rollback = match &state.in_flight {
            Some(attempt) if attempt.attempt_id == attempt_id && attempt.state == ReloadAttemptState::SwapInstalled => true,
            _ => false,
        };
        if !rollback {
            return false;
        }
        let from_generation = state.in_flight.as_ref().unwrap().from_generation;
        state.active_generation = from_generation;
        true
    }

    /// `finishReload(attempt_id, outcome)` - terminal; records
    /// `last_reload`.
    pub fn finish_reload(&self, attempt_id: &str, outcome: ReloadOutcome) -> Result<ReloadAttempt, MuError> {
        let mut state = self.state.lock().unwrap();
        let mut attempt = match &state.in_flight {
            Some(attempt) if attempt.attempt_id == attempt_id => attempt.clone(),
            _ => {
                return Err(MuError::ReloadFailed {
                    stage: "finish".to_string(),
                    message: format!("no in-flight attempt {attempt_id}"),
                })
            }
        };
        attempt.state = match outcome {
            ReloadOutcome::Success => ReloadAttemptState::FinishedSuccess,
            ReloadOutcome::Failure => ReloadAttemptState::FinishedFailure,
        };
        state.in_flight = None;
        state.history.insert(attempt.attempt_id.clone(), attempt.clone());
        state.last_reload = Some(attempt.clone());
        Ok(attempt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrent_begin_reload_coalesces_into_the_in_flight_attempt() {
        let supervisor = GenerationSupervisor::new(GenerationIdentity::genesis());
        let (first, first_coalesced) = supervisor.begin_reload("cli_update");
        let (second, second_coalesced) = supervisor.begin_reload("sighup");
        assert!(!first_coalesced);
        assert!(second_coalesced);
        assert_eq!(first.attempt_id, second.attempt_id);
    }

    #[test]
    fn full_lifecycle_activates_to_generation() {
        let supervisor = GenerationSupervisor::new(GenerationIdentity::genesis());
        let (attempt, _) = supervisor.begin_reload("cli_update");
        assert!(supervisor.mark_swap_installed(&attempt.attempt_id));
        assert_eq!(supervisor.active_generation(), attempt.to_generation);
        let finished = supervisor.finish_reload(&attempt.attempt_id, ReloadOutcome::Success).unwrap();
        assert_eq!(finished.state, ReloadAttemptState::FinishedSuccess);
        assert!(supervisor.last_reload().is_some());
        let (next, coalesced) = supervisor.begin_reload("next");
        assert!(!coalesced);
        assert_eq!(next.from_generation, attempt.to_generation);
    }

    #[test]
    fn rollback_only_valid_from_swap_installed() {
        let supervisor = GenerationSupervisor::new(GenerationIdentity::genesis());
        let (attempt, _) = supervisor.begin_reload("cli_update");
        assert!(!supervisor.rollback_swap_installed(&attempt.attempt_id));
        assert!(supervisor.mark_swap_installed(&attempt.attempt_id));
        assert!(supervisor.rollback_swap_installed(&attempt.attempt_id));
        assert_eq!(supervisor.active_generation(), attempt.from_generation);
    }
}
