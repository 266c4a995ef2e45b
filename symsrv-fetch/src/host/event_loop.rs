//! Event loop helpers.
//!
//! symsrv runs on a tokio current-thread runtime inside a
//! [`LocalSet`](tokio::task::LocalSet). Everything posted here executes on
//! that loop's thread, so shared state can live in `Rc<RefCell<_>>`.
//!
//! All posting functions panic if called outside a `LocalSet`.

use std::future::Future;
use std::time::Duration;

use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Returns the handle of the runtime driving the current thread, if any.
pub fn current() -> Option<tokio::runtime::Handle> {
    tokio::runtime::Handle::try_current().ok()
}

/// Runs `task` on the loop after the current call stack unwinds.
pub fn post_task<F>(task: F) -> JoinHandle<()>
where
    F: Future<Output = ()> + 'static,
{
    tokio::task::spawn_local(task)
}

/// Like [`post_task`], but `task` is dropped without completing once `token`
/// is cancelled.
pub fn post_cancellable<F>(token: &CancellationToken, task: F) -> JoinHandle<()>
where
    F: Future<Output = ()> + 'static,
{
    let token = token.clone();
    tokio::task::spawn_local(async move {
        tokio::select! {
            biased;
            () = token.cancelled() => {}
            () = task => {}
        }
    })
}

/// Runs `task` once `delay` has elapsed, unless the timer is cancelled first.
pub fn post_timer<F>(delay: Duration, task: F) -> TimerHandle
where
    F: Future<Output = ()> + 'static,
{
    let deadline = Instant::now() + delay;
    let handle = tokio::task::spawn_local(async move {
        tokio::time::sleep_until(deadline).await;
        task.await;
    });
    TimerHandle {
        abort: handle.abort_handle(),
        deadline,
    }
}

// ============================================================================
// Timer Handle
// ============================================================================

/// A pending one-shot timer. Dropping the handle does not cancel the timer.
#[derive(Debug)]
pub struct TimerHandle {
    abort: AbortHandle,
    deadline: Instant,
}

impl TimerHandle {
    /// Prevents the timer from firing. No effect once it has fired.
    pub fn cancel(&self) {
        self.abort.abort();
    }

    /// When the timer fires.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left until the timer fires, zero if already due.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Returns true once the timer has fired or been cancelled.
    pub fn is_finished(&self) -> bool {
        self.abort.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;
    use tokio::task::LocalSet;

    #[tokio::test]
    async fn test_post_task_runs_later() {
        let local = LocalSet::new();
        local
            .run_until(async {
                let ran = Rc::new(Cell::new(false));
                let ran_in = Rc::clone(&ran);
                let handle = post_task(async move { ran_in.set(true) });

                assert!(!ran.get(), "posted task must not run on the caller's stack");
                handle.await.unwrap();
                assert!(ran.get());
            })
            .await;
    }

    #[tokio::test]
    async fn test_post_cancellable_skips_after_cancel() {
        let local = LocalSet::new();
        local
            .run_until(async {
                let token = CancellationToken::new();
                let ran = Rc::new(Cell::new(false));
                let ran_in = Rc::clone(&ran);

                let handle = post_cancellable(&token, async move {
                    tokio::task::yield_now().await;
                    ran_in.set(true);
                });
                token.cancel();
                handle.await.unwrap();

                assert!(!ran.get());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_and_cancels() {
        let local = LocalSet::new();
        local
            .run_until(async {
                let fired = Rc::new(Cell::new(0));

                let fired_in = Rc::clone(&fired);
                let timer = post_timer(Duration::from_secs(10), async move {
                    fired_in.set(fired_in.get() + 1);
                });
                assert_eq!(timer.remaining(), Duration::from_secs(10));

                let fired_in = Rc::clone(&fired);
                let cancelled = post_timer(Duration::from_secs(5), async move {
                    fired_in.set(fired_in.get() + 100);
                });
                cancelled.cancel();

                tokio::time::sleep(Duration::from_secs(11)).await;
                assert_eq!(fired.get(), 1);
                assert!(timer.is_finished());
            })
            .await;
    }

    #[test]
    fn test_current_outside_runtime() {
        assert!(current().is_none());
    }
}
