//! Cancellable background jobs that publish their progress
//!
//! A [`ProgressJob`] wraps one unit of asynchronous work. Its state lives in
//! a `tokio::sync::watch` cell with a single writer (the work itself, through
//! [`ProgressReporter`]) and any number of readers:
//!
//! - [`ProgressJob::current_state`] reads the latest value without waiting
//! - [`ProgressJob::subscribe`] yields the latest value, then every later
//!   value, and ends right after the first terminal state
//! - [`ProgressJob::join`] waits for the terminal state
//!
//! Readers may miss intermediate values that were replaced before they looked
//! (the cell keeps only the newest), but never observe a state regress: once
//! terminal, the cell is frozen.

use futures_util::Stream;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// State type carried by a [`ProgressJob`].
pub trait ProgressState: Clone + Send + Sync + 'static {
    /// Terminal states end the job; no transition happens afterwards.
    fn is_terminal(&self) -> bool;

    /// Terminal state published when the work dies without returning one
    /// (panic or runtime shutdown).
    fn abandoned(reason: &str) -> Self;
}

static NEXT_JOB_SERIAL: AtomicU64 = AtomicU64::new(1);

struct Shared<S> {
    serial: u64,
    state: watch::Sender<S>,
    cancel: CancellationToken,
    cancel_accepted: AtomicBool,
}

impl<S: ProgressState> Shared<S> {
    /// Replace the state unless it is already terminal.
    fn publish(&self, next: S) -> bool {
        self.state.send_if_modified(|current| {
            if current.is_terminal() {
                false
            } else {
                *current = next;
                true
            }
        })
    }
}

/// Write side of a job's state cell, handed to the work future.
pub struct ProgressReporter<S> {
    shared: Arc<Shared<S>>,
}

impl<S: ProgressState> ProgressReporter<S> {
    /// Publish an intermediate state. Ignored once the job is terminal.
    pub fn report(&self, state: S) {
        if !self.shared.publish(state) {
            debug!(job = self.shared.serial, "Ignoring report on a finished job");
        }
    }

    pub fn current_state(&self) -> S {
        self.shared.state.borrow().clone()
    }
}

/// Handle to a running job. Cloning shares the same job.
pub struct ProgressJob<S> {
    shared: Arc<Shared<S>>,
}

impl<S> Clone for ProgressJob<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S> std::fmt::Debug for ProgressJob<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressJob")
            .field("serial", &self.shared.serial)
            .finish()
    }
}

impl<S: ProgressState> ProgressJob<S> {
    /// Start `work` on the current tokio runtime.
    ///
    /// The future receives the reporter and the job's cancellation token and
    /// returns the terminal state. If it panics or is dropped by runtime
    /// shutdown, [`ProgressState::abandoned`] is published instead.
    pub fn spawn<F, Fut>(initial: S, work: F) -> Self
    where
        F: FnOnce(ProgressReporter<S>, CancellationToken) -> Fut,
        Fut: Future<Output = S> + Send + 'static,
    {
        let (state, _) = watch::channel(initial);
        let shared = Arc::new(Shared {
            serial: NEXT_JOB_SERIAL.fetch_add(1, Ordering::Relaxed),
            state,
            cancel: CancellationToken::new(),
            cancel_accepted: AtomicBool::new(false),
        });

        let reporter = ProgressReporter {
            shared: Arc::clone(&shared),
        };
        let task = tokio::spawn(work(reporter, shared.cancel.clone()));

        let finisher = Arc::clone(&shared);
        tokio::spawn(async move {
            let terminal = match task.await {
                Ok(state) if state.is_terminal() => state,
                Ok(_) => S::abandoned("work returned a non-terminal state"),
                Err(err) => {
                    warn!(job = finisher.serial, error = %err, "Job task did not complete");
                    S::abandoned(&err.to_string())
                }
            };
            finisher.publish(terminal);
        });

        Self { shared }
    }

    /// Latest state; never blocks.
    pub fn current_state(&self) -> S {
        self.shared.state.borrow().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.shared.state.borrow().is_terminal()
    }

    /// Stream of states: the current one first, then each update, ending
    /// after the first terminal state.
    pub fn subscribe(&self) -> impl Stream<Item = S> + Send + 'static {
        let rx = self.shared.state.subscribe();
        futures_util::stream::unfold(Some((rx, true)), |cursor| async move {
            let (mut rx, first) = cursor?;
            if !first && rx.changed().await.is_err() {
                return None;
            }
            let state = rx.borrow_and_update().clone();
            let next = if state.is_terminal() {
                None
            } else {
                Some((rx, false))
            };
            Some((state, next))
        })
    }

    /// Request cooperative cancellation.
    ///
    /// Returns `true` if the request was accepted, i.e. the job had not
    /// reached a terminal state yet. The work decides how fast it stops.
    pub fn cancel(&self) -> bool {
        let mut accepted = false;
        // Runs under the cell's write lock, so it cannot interleave with the
        // terminal state being published.
        self.shared.state.send_if_modified(|current| {
            accepted = !current.is_terminal();
            false
        });
        if accepted {
            self.shared.cancel_accepted.store(true, Ordering::SeqCst);
            self.shared.cancel.cancel();
            debug!(job = self.shared.serial, "Cancellation accepted");
        }
        accepted
    }

    /// `true` iff [`cancel`](Self::cancel) was accepted before the job
    /// finished on its own.
    pub fn is_cancelled(&self) -> bool {
        self.shared.cancel_accepted.load(Ordering::SeqCst)
    }

    /// Wait for the terminal state.
    pub async fn join(&self) -> S {
        let mut rx = self.shared.state.subscribe();
        match rx.wait_for(|state| state.is_terminal()).await {
            Ok(state) => state.clone(),
            // The sender lives in `shared`, which we hold.
            Err(_) => self.current_state(),
        }
    }

    /// Whether both handles point at the same job instance.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    pub fn serial(&self) -> u64 {
        self.shared.serial
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[derive(Debug, Clone, PartialEq)]
    enum Step {
        Waiting,
        Working(u32),
        Finished,
        Failed(String),
        Stopped,
    }

    impl Step {
        fn rank(&self) -> u8 {
            if self.is_terminal() { 1 } else { 0 }
        }
    }

    impl ProgressState for Step {
        fn is_terminal(&self) -> bool {
            matches!(self, Step::Finished | Step::Failed(_) | Step::Stopped)
        }

        fn abandoned(reason: &str) -> Self {
            Step::Failed(reason.to_string())
        }
    }

    /// Job driven step by step from the test through a channel.
    fn scripted_job() -> (ProgressJob<Step>, mpsc::UnboundedSender<Step>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<Step>();
        let job = ProgressJob::spawn(Step::Waiting, |reporter, cancel| async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return Step::Stopped,
                    next = rx.recv() => match next {
                        Some(step) if step.is_terminal() => return step,
                        Some(step) => reporter.report(step),
                        None => return Step::Failed("script ended".into()),
                    },
                }
            }
        });
        (job, tx)
    }

    #[tokio::test]
    async fn test_current_state_and_join() {
        let (job, tx) = scripted_job();
        assert_eq!(job.current_state(), Step::Waiting);

        tx.send(Step::Working(1)).unwrap();
        tx.send(Step::Finished).unwrap();

        assert_eq!(job.join().await, Step::Finished);
        assert_eq!(job.current_state(), Step::Finished);
        assert!(job.is_finished());
        assert!(!job.is_cancelled());
    }

    #[tokio::test]
    async fn test_subscribe_ends_after_single_terminal_state() {
        let (job, tx) = scripted_job();
        let collector = tokio::spawn(job.subscribe().collect::<Vec<_>>());

        for i in 1..=5 {
            tx.send(Step::Working(i)).unwrap();
            tokio::task::yield_now().await;
        }
        tx.send(Step::Failed("boom".into())).unwrap();

        let seen = collector.await.unwrap();
        assert!(seen.len() >= 2);
        assert_eq!(seen.last(), Some(&Step::Failed("boom".into())));
        assert_eq!(seen.iter().filter(|s| s.is_terminal()).count(), 1);
        assert!(seen.windows(2).all(|w| w[0].rank() <= w[1].rank()));
    }

    #[tokio::test]
    async fn test_late_subscriber_gets_only_terminal_state() {
        let (job, tx) = scripted_job();
        tx.send(Step::Working(3)).unwrap();
        tx.send(Step::Finished).unwrap();
        job.join().await;

        let seen: Vec<Step> = job.subscribe().collect().await;
        assert_eq!(seen, vec![Step::Finished]);
    }

    #[tokio::test]
    async fn test_cancel_is_cooperative() {
        let (job, _tx) = scripted_job();
        assert!(job.cancel());
        assert_eq!(job.join().await, Step::Stopped);
        assert!(job.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_after_completion_is_noop() {
        let (job, tx) = scripted_job();
        tx.send(Step::Finished).unwrap();
        job.join().await;

        assert!(!job.cancel());
        assert!(!job.is_cancelled());
        assert_eq!(job.current_state(), Step::Finished);
    }

    #[tokio::test]
    async fn test_reports_after_terminal_are_ignored() {
        let job = ProgressJob::spawn(Step::Waiting, |reporter, _cancel| async move {
            reporter.report(Step::Working(1));
            Step::Finished
        });
        assert_eq!(job.join().await, Step::Finished);

        // A second terminal value cannot overwrite the first.
        assert!(!job.shared.publish(Step::Working(2)));
        assert_eq!(job.current_state(), Step::Finished);
    }

    fn reason_to_panic() -> bool {
        true
    }

    #[tokio::test]
    async fn test_panicking_work_is_abandoned() {
        let job: ProgressJob<Step> = ProgressJob::spawn(Step::Waiting, |_reporter, _cancel| async move {
            tokio::time::sleep(Duration::from_millis(1)).await;
            if reason_to_panic() {
                panic!("worker exploded");
            }
            Step::Finished
        });

        match job.join().await {
            Step::Failed(reason) => assert!(reason.contains("panic")),
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_ptr_eq_distinguishes_jobs() {
        let (a, _ta) = scripted_job();
        let (b, _tb) = scripted_job();
        assert!(a.ptr_eq(&a.clone()));
        assert!(!a.ptr_eq(&b));
        assert_ne!(a.serial(), b.serial());
    }
}
