//! `ReloadManager`: warmup -> cutover -> drain -> rollback orchestration
//! around a `GenerationSupervisor` (spec.md §4.8).

use crate::generation::{GenerationSupervisor, ReloadOutcome};
use mu_types::error::MuError;
use mu_types::generation::{GenerationIdentity, ReloadAttempt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Notify, RwLock};
use tracing::{info, warn};

/// A swappable adapter runtime. Implementations live in `mu-adapters`
/// and `services/mu-server`; this crate only orchestrates the swap.
pub trait Reloader: Send + Sync {
    type Handle: Send + Sync + 'static;

    fn warmup(&self) -> Result<Self::Handle, String>;
    fn cutover(&self, handle: &Self::Handle) -> Result<(), String>;
    fn drain(&self, handle: &Self::Handle) -> Result<(), String>;
}

#[derive(Debug, Default)]
pub struct ReloadCounters {
    pub reload_success_total: AtomicU64,
    pub reload_failure_total: AtomicU64,
    pub duplicate_signal_total: AtomicU64,
    pub drop_signal_total: AtomicU64,
}

impl ReloadCounters {
    /// Called by signal-handling callers (outside `reload()`'s own
    /// control flow) when a signal is intentionally ignored, e.g. a
    /// SIGHUP arriving while shutdown is already in progress.
    pub fn record_dropped_signal(&self) {
        self.drop_signal_total.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct ReloadResult {
    pub attempt: ReloadAttempt,
    pub coalesced: bool,
}

pub struct ReloadManager<R: Reloader> {
    reloader: R,
    current: RwLock<Arc<R::Handle>>,
    supervisor: GenerationSupervisor,
    counters: ReloadCounters,
    notify: Notify,
}

impl<R: Reloader> ReloadManager<R> {
    pub fn new(reloader: R, initial_handle: R::Handle, active_generation: GenerationIdentity) -> Self {
        Self {
            reloader,
            current: RwLock::new(Arc::new(initial_handle)),
            supervisor: GenerationSupervisor::new(active_generation),
            counters: ReloadCounters::default(),
            notify: Notify::new(),
        }
    }

    pub fn counters(&self) -> &ReloadCounters {
        &self.counters
    }

    pub fn active_generation(&self) -> GenerationIdentity {
        self.supervisor.active_generation()
    }

    pub async fn current_handle(&self) -> Arc<R::Handle> {
        self.current.read().await.clone()
    }

    /// `reloadControlPlane(reason)` (spec.md §4.8 steps 1-6).
    pub async fn reload(&self, reason: impl Into<String>, now_ms: impl Fn() -> i64) -> Result<ReloadResult, MuError> {
        let (attempt, coalesced) = self.supervisor.begin_reload(reason);
        if coalesced {
            self.counters.duplicate_signal_total.fetch_add(1, Ordering::Relaxed);
            info!(attempt_id = %attempt.attempt_id, "reload transition coalesce:waiting");
            let finished = self.await_finish(&attempt.attempt_id).await;
            return Ok(ReloadResult {
                attempt: finished,
                coalesced: true,
            });
        }

        let handle = match self.reloader.warmup() {
            Ok(handle) => {
                info!(attempt_id = %attempt.attempt_id, "reload transition warmup:success");
                handle
            }
            Err(message) => {
                warn!(attempt_id = %attempt.attempt_id, %message, "reload transition warmup:failure");
                let finished = self.supervisor.finish_reload(&attempt.attempt_id, ReloadOutcome::Failure)?;
                self.counters.reload_failure_total.fetch_add(1, Ordering::Relaxed);
                self.notify.notify_waiters();
                return Ok(ReloadResult {
                    attempt: finished,
                    coalesced: false,
                });
            }
        };

        if let Err(message) = self.reloader.cutover(&handle) {
            warn!(attempt_id = %attempt.attempt_id, %message, "reload transition cutover:failure");
            let rolled_back = self.supervisor.rollback_swap_installed(&attempt.attempt_id);
            info!(attempt_id = %attempt.attempt_id, rolled_back, "reload transition rollback:attempted");
            let finished = self.supervisor.finish_reload(&attempt.attempt_id, ReloadOutcome::Failure)?;
            self.counters.reload_failure_total.fetch_add(1, Ordering::Relaxed);
            self.notify.notify_waiters();
            return Ok(ReloadResult {
                attempt: finished,
                coalesced: false,
            });
        }

        let previous = {
            let mut current = self.current.write().await;
            std::mem::replace(&mut *current, Arc::new(handle))
        };
        self.supervisor.mark_swap_installed(&attempt.attempt_id);
        info!(attempt_id = %attempt.attempt_id, "reload transition cutover:success");

        match self.reloader.drain(&previous) {
            Ok(()) => info!(attempt_id = %attempt.attempt_id, "reload transition drain:success"),
            Err(message) => warn!(attempt_id = %attempt.attempt_id, %message, "reload transition drain:failure"),
        }

        let _ = now_ms;
        let finished = self.supervisor.finish_reload(&attempt.attempt_id, ReloadOutcome::Success)?;
        self.counters.reload_success_total.fetch_add(1, Ordering::Relaxed);
        self.notify.notify_waiters();
        Ok(ReloadResult {
            attempt: finished,
            coalesced: false,
        })
    }

    async fn await_finish(&self, attempt_id: &str) -> ReloadAttempt {
        loop {
            if let Some(attempt) = self.supervisor.get_attempt(attempt_id) {
                if matches!(
                    attempt.state,
                    mu_types::generation::ReloadAttemptState::FinishedSuccess
                        | mu_types::generation::ReloadAttemptState::FinishedFailure
                ) {
                    return attempt;
                }
            }
            self.notify.notified().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mu_types::generation::ReloadAttemptState;

    struct Handle(u32);

    struct AlwaysSucceeds;
    impl Reloader for AlwaysSucceeds {
        type Handle = Handle;
        fn warmup(&self) -> Result<Handle, String> {
            Ok(Handle(1))
        }
        fn cutover(&self, _handle: &Handle) -> Result<(), String> {
            Ok(())
        }
        fn drain(&self, _handle: &Handle) -> Result<(), String> {
            Ok(())
        }
    }

    struct FailsDuringDrain;
    impl Reloader for FailsDuringDrain {
        type Handle = Handle;
        fn warmup(&self) -> Result<Handle, String> {
            Ok(Handle(1))
        }
        fn cutover(&self, _handle: &Handle) -> Result<(), String> {
            Ok(())
        }
        fn drain(&self, _handle: &Handle) -> Result<(), String> {
            Err("drain exploded".to_string())
        }
    }

    struct FailsDuringCutover;
    impl Reloader for FailsDuringCutover {
        type Handle = Handle;
        fn warmup(&self) -> Result<Handle, String> {
            Ok(Handle(1))
        }
        fn cutover(&self, _handle: &Handle) -> Result<(), String> {
            Err("cutover exploded".to_string())
        }
        fn drain(&self, _handle: &Handle) -> Result<(), String> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn successful_reload_advances_generation_and_counters() {
        let manager = ReloadManager::new(AlwaysSucceeds, Handle(0), GenerationIdentity::genesis());
        let result = manager.reload("cli_update", || 0).await.unwrap();
        assert_eq!(result.attempt.state, ReloadAttemptState::FinishedSuccess);
        assert_eq!(manager.active_generation().generation_seq, 1);
        assert_eq!(manager.counters().reload_success_total.load(Ordering::Relaxed), 1);
        assert_eq!(manager.current_handle().await.0, 1);
    }

    #[tokio::test]
    async fn drain_failure_after_cutover_still_succeeds() {
        let manager = ReloadManager::new(FailsDuringDrain, Handle(0), GenerationIdentity::genesis());
        let result = manager.reload("cli_update", || 0).await.unwrap();
        assert_eq!(result.attempt.state, ReloadAttemptState::FinishedSuccess);
        assert_eq!(manager.active_generation().generation_seq, 1);
        assert_eq!(manager.counters().reload_success_total.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn cutover_failure_rolls_back_and_keeps_old_generation() {
        let manager = ReloadManager::new(FailsDuringCutover, Handle(0), GenerationIdentity::genesis());
        let result = manager.reload("cli_update", || 0).await.unwrap();
        assert_eq!(result.attempt.state, ReloadAttemptState::FinishedFailure);
        assert_eq!(manager.active_generation().generation_seq, 0);
        assert_eq!(manager.counters().reload_failure_total.load(Ordering::Relaxed), 1);
        assert_eq!(manager.current_handle().await.0, 0);
    }

    #[tokio::test]
    async fn coalesced_reload_returns_the_in_flight_attempts_result() {
        let manager = Arc::new(ReloadManager::new(AlwaysSucceeds, Handle(0), GenerationIdentity::genesis()));
        let (attempt, coalesced) = manager.supervisor.begin_reload("external-signal");
        assert!(!coalesced);

        let m2 = manager.clone();
        let waiter = tokio::spawn(async move { m2.reload("sighup", || 0).await.unwrap() });
        tokio::task::yield_now().await;

        let finished = manager
            .supervisor
            .finish_reload(&attempt.attempt_id, ReloadOutcome::Success)
            .unwrap();
        manager.notify.notify_waiters();

        let result = waiter.await.unwrap();
        assert!(result.coalesced);
        assert_eq!(result.attempt.attempt_id, finished.attempt_id);
        assert_eq!(manager.counters().duplicate_signal_total.load(Ordering::Relaxed), 1);
    }
}
