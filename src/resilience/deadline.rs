//! Deadline guard.
//!
//! Runs downstream work as its own task and races it against a wall-clock
//! deadline. Exactly one outcome reaches the caller: the work's value, the
//! work's panic (re-raised on the caller's task), or `Elapsed`.
//!
//! # State Transitions
//! ```text
//! Running → Completed: worker writes its outcome into the slot first
//! Running → TimedOut:  deadline fires and the guard closes the slot first
//! ```
//!
//! # Design Decisions
//! - The result slot is a oneshot: whichever side resolves it first wins
//! - Cancellation is a signal, not an abort; late work runs to completion
//! - A late panic is logged by the worker and never re-raised

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures_util::FutureExt;
use thiserror::Error;
use tokio::sync::{oneshot, watch};

/// Why the guard produced no value.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeadlineError {
    #[error("deadline of {0:?} elapsed")]
    Elapsed(Duration),

    /// The worker task was torn down without resolving (runtime shutdown).
    #[error("worker task ended without a result")]
    WorkerLost,
}

/// Cooperative cancellation signal handed to guarded work.
#[derive(Debug, Clone)]
pub struct DeadlineSignal {
    rx: Option<watch::Receiver<bool>>,
}

impl DeadlineSignal {
    /// A signal that never fires, for work running outside a guard.
    pub fn never() -> Self {
        Self { rx: None }
    }

    /// True once the deadline fired or the guard was dropped.
    pub fn is_cancelled(&self) -> bool {
        match &self.rx {
            Some(rx) => *rx.borrow() || rx.has_changed().is_err(),
            None => false,
        }
    }

    /// Resolves when the deadline fires or the guard is dropped.
    pub async fn cancelled(&mut self) {
        match &mut self.rx {
            Some(rx) => {
                let _ = rx.wait_for(|expired| *expired).await;
            }
            None => std::future::pending().await,
        }
    }
}

type Outcome<T> = Result<T, Box<dyn Any + Send>>;

/// Run `work` to completion or to `deadline`, whichever happens first.
///
/// A panic inside `work` before the deadline is resumed on the caller with
/// its original payload so an outer recovery layer can handle it.
pub async fn run<T, F, Fut>(deadline: Duration, work: F) -> Result<T, DeadlineError>
where
    F: FnOnce(DeadlineSignal) -> Fut,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let (slot_tx, mut slot_rx) = oneshot::channel::<Outcome<T>>();

    let fut = work(DeadlineSignal { rx: Some(cancel_rx) });
    tokio::spawn(async move {
        let outcome = AssertUnwindSafe(fut).catch_unwind().await;
        if let Err(unclaimed) = slot_tx.send(outcome) {
            match unclaimed {
                Err(panic) => tracing::error!(
                    panic = %panic_message(panic.as_ref()),
                    "Guarded work failed after its deadline was reported, discarding"
                ),
                Ok(_) => tracing::debug!("Guarded work finished after its deadline, result discarded"),
            }
        }
    });

    let timer = tokio::time::sleep(deadline);
    tokio::pin!(timer);

    let outcome = tokio::select! {
        biased;
        outcome = &mut slot_rx => outcome,
        _ = &mut timer => {
            slot_rx.close();
            let _ = cancel_tx.send(true);
            // A value that landed before the close still wins.
            match slot_rx.try_recv() {
                Ok(outcome) => Ok(outcome),
                Err(_) => return Err(DeadlineError::Elapsed(deadline)),
            }
        }
    };

    match outcome {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(panic)) => std::panic::resume_unwind(panic),
        Err(_) => Err(DeadlineError::WorkerLost),
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tokio::time;

    #[tokio::test(start_paused = true)]
    async fn test_fast_work_returns_its_value() {
        let result = run(Duration::from_secs(1), |_| async {
            time::sleep(Duration::from_millis(10)).await;
            42
        })
        .await;
        assert_eq!(result, Ok(42));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_work_times_out() {
        let deadline = Duration::from_millis(100);
        let result = run(deadline, |_| std::future::pending::<()>()).await;
        assert_eq!(result, Err(DeadlineError::Elapsed(deadline)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_result_is_discarded() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();

        let result = run(Duration::from_millis(100), move |_| async move {
            time::sleep(Duration::from_millis(300)).await;
            flag.store(true, Ordering::SeqCst);
            7
        })
        .await;

        assert_eq!(result, Err(DeadlineError::Elapsed(Duration::from_millis(100))));
        // Work is not killed; it finishes on its own.
        time::sleep(Duration::from_millis(500)).await;
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_panic_before_deadline_reaches_caller() {
        let caught = AssertUnwindSafe(run(Duration::from_secs(1), |_| async {
            panic!("boom");
        }))
        .catch_unwind()
        .await;

        let panic = caught.unwrap_err();
        assert_eq!(panic_message(panic.as_ref()), "boom");
    }

    #[tokio::test(start_paused = true)]
    async fn test_panic_after_deadline_is_swallowed() {
        let reached = Arc::new(AtomicBool::new(false));
        let flag = reached.clone();

        let result = AssertUnwindSafe(run(Duration::from_millis(50), move |_| async move {
            time::sleep(Duration::from_millis(200)).await;
            flag.store(true, Ordering::SeqCst);
            panic!("late failure");
        }))
        .catch_unwind()
        .await;

        assert!(matches!(result, Ok(Err(DeadlineError::Elapsed(_)))));
        time::sleep(Duration::from_millis(500)).await;
        assert!(reached.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_work_observes_cancellation() {
        let stopped = Arc::new(AtomicBool::new(false));
        let flag = stopped.clone();

        let result = run(Duration::from_millis(100), move |mut signal| async move {
            assert!(!signal.is_cancelled());
            signal.cancelled().await;
            flag.store(signal.is_cancelled(), Ordering::SeqCst);
        })
        .await;

        assert!(result.is_err());
        time::sleep(Duration::from_millis(10)).await;
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_never_signal_is_not_cancelled() {
        let signal = DeadlineSignal::never();
        assert!(!signal.is_cancelled());
    }
}
