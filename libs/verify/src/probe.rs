use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Barrier;
use tokio::task::JoinSet;
use tokio::time::Instant;

use converge_api::{ErrorKind, FetchError};

// ═══════════════════════════════════════════════════════════════
//  Concurrency probe: N identical requests, released together
// ═══════════════════════════════════════════════════════════════

/// Outcome of [`execute_identical_requests`].
#[derive(Debug)]
pub struct ProbeReport<T, E> {
    pub successes: Vec<T>,
    pub conflicts: Vec<E>,
    pub other_errors: Vec<E>,
    /// Tasks still running when the timeout hit. They are aborted.
    pub timed_out: usize,
    pub panicked: usize,
    pub all_completed_in_time: bool,
    pub elapsed: Duration,
}

impl<T, E> ProbeReport<T, E> {
    fn empty() -> Self {
        Self {
            successes: Vec::new(),
            conflicts: Vec::new(),
            other_errors: Vec::new(),
            timed_out: 0,
            panicked: 0,
            all_completed_in_time: true,
            elapsed: Duration::ZERO,
        }
    }

    pub fn total(&self) -> usize {
        self.successes.len() + self.conflicts.len() + self.other_errors.len() + self.timed_out + self.panicked
    }

    /// Exactly one success and every other request rejected as a conflict.
    pub fn exactly_one_success(&self) -> bool {
        self.all_completed_in_time
            && self.successes.len() == 1
            && self.conflicts.len() == self.total() - 1
    }
}

/// Run `operation` `n` times concurrently and classify the outcomes.
///
/// All tasks wait on a barrier before calling `operation`, so they hit the
/// system under test as close together as the runtime allows. Tasks not
/// done within `timeout` of the start are aborted and counted in
/// `timed_out`.
pub async fn execute_identical_requests<T, E, F, Fut, C>(
    operation: F,
    n: usize,
    timeout: Duration,
    is_conflict: C,
) -> ProbeReport<T, E>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
    C: Fn(&E) -> bool,
{
    let started = Instant::now();
    let mut report = ProbeReport::empty();
    if n == 0 {
        return report;
    }

    let operation = Arc::new(operation);
    let barrier = Arc::new(Barrier::new(n));
    let mut tasks = JoinSet::new();
    for _ in 0..n {
        let operation = operation.clone();
        let barrier = barrier.clone();
        tasks.spawn(async move {
            barrier.wait().await;
            operation().await
        });
    }

    let deadline = started + timeout;
    loop {
        match tokio::time::timeout_at(deadline, tasks.join_next()).await {
            Ok(Some(Ok(Ok(value)))) => report.successes.push(value),
            Ok(Some(Ok(Err(e)))) if is_conflict(&e) => report.conflicts.push(e),
            Ok(Some(Ok(Err(e)))) => report.other_errors.push(e),
            Ok(Some(Err(e))) => {
                tracing::warn!(error = %e, "probe task failed");
                report.panicked += 1;
            }
            Ok(None) => break,
            Err(_) => {
                report.timed_out = tasks.len();
                report.all_completed_in_time = false;
                tasks.abort_all();
                break;
            }
        }
    }

    report.elapsed = started.elapsed();
    tracing::debug!(
        n,
        successes = report.successes.len(),
        conflicts = report.conflicts.len(),
        other = report.other_errors.len(),
        timed_out = report.timed_out,
        elapsed = ?report.elapsed,
        "probe finished"
    );
    report
}

/// Conflict predicate for operations returning [`FetchError`].
pub fn is_conflict(e: &FetchError) -> bool {
    e.kind() == ErrorKind::Conflict
}
