use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use converge_api::{CheckResult, ErrorKind, FetchError};

use crate::error::VerifyError;
use crate::policy::RetryPolicy;

// ═══════════════════════════════════════════════════════════════
//  Poller: fetch → accept → sleep, bounded by attempts and deadline
// ═══════════════════════════════════════════════════════════════

/// Повторяет fetch, пока accept не вернёт success или не кончится бюджет.
///
/// Per call:
/// 1. sleep `initial_delay`;
/// 2. the deadline is `now + timeout`;
/// 3. each attempt runs `fetch` (abandoned if it outlives the deadline),
///    then `accept` on a present value;
/// 4. after a failed attempt sleep `poll_interval`, clamped to the deadline.
///
/// Fetch errors whose kind was registered with [`Poller::ignoring`] are
/// treated as a failed attempt; any other error aborts the wait.
#[derive(Debug, Clone)]
pub struct Poller {
    policy: RetryPolicy,
    criteria: String,
    ignorable: Vec<ErrorKind>,
    cancel: Option<CancellationToken>,
}

enum Attempt<T> {
    Done(Result<Option<T>, FetchError>),
    DeadlineHit,
    Cancelled,
}

impl Poller {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            criteria: "condition".into(),
            ignorable: Vec::new(),
            cancel: None,
        }
    }

    /// Human-readable description used in logs and errors.
    pub fn describe(mut self, criteria: impl Into<String>) -> Self {
        self.criteria = criteria.into();
        self
    }

    /// Treat fetch errors of this kind as "not yet".
    pub fn ignoring(mut self, kind: ErrorKind) -> Self {
        if !self.ignorable.contains(&kind) {
            self.ignorable.push(kind);
        }
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn criteria(&self) -> &str {
        &self.criteria
    }

    /// Poll until `fetch` yields a value that `accept` passes.
    pub async fn poll_until<T, F, Fut, A>(&self, fetch: F, mut accept: A) -> Result<T, VerifyError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, FetchError>>,
        A: FnMut(&T) -> CheckResult,
    {
        self.poll_map(fetch, |value| {
            let check = accept(&value);
            if check.success { Ok(value) } else { Err(check.message) }
        })
        .await
    }

    /// Like [`poll_until`](Self::poll_until), but `convert` takes the fetched
    /// value by value and either produces the result or a diagnostic for the
    /// failed attempt.
    pub async fn poll_map<T, U, F, Fut, C>(&self, mut fetch: F, mut convert: C) -> Result<U, VerifyError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, FetchError>>,
        C: FnMut(T) -> Result<U, String>,
    {
        let started = Instant::now();
        if !self.pause(self.policy.initial_delay()).await {
            return Err(self.cancelled(0, started));
        }

        let deadline = Instant::now() + self.policy.timeout();
        let mut attempts = 0;
        let mut last_diagnostic = String::from("no attempt completed");

        while attempts < self.policy.max_attempts() && Instant::now() < deadline {
            attempts += 1;
            match self.attempt(&mut fetch, deadline).await {
                Attempt::Cancelled => return Err(self.cancelled(attempts, started)),
                Attempt::DeadlineHit => {
                    last_diagnostic = "fetch still running at deadline".into();
                    break;
                }
                Attempt::Done(Ok(Some(value))) => match convert(value) {
                    Ok(done) => {
                        tracing::debug!(
                            criteria = %self.criteria,
                            attempts,
                            elapsed = ?started.elapsed(),
                            "condition met"
                        );
                        return Ok(done);
                    }
                    Err(diagnostic) => last_diagnostic = diagnostic,
                },
                Attempt::Done(Ok(None)) => last_diagnostic = "not found".into(),
                Attempt::Done(Err(e)) if self.ignorable.contains(&e.kind()) => {
                    last_diagnostic = format!("{} error: {}", e.kind(), e);
                }
                Attempt::Done(Err(e)) => {
                    tracing::debug!(criteria = %self.criteria, attempts, error = ?e, "fetch failed, giving up");
                    return Err(VerifyError::Fetch {
                        criteria: self.criteria.clone(),
                        attempt: attempts,
                        source: e,
                    });
                }
            }
            tracing::debug!(criteria = %self.criteria, attempt = attempts, diagnostic = %last_diagnostic, "not yet");

            let remaining = deadline.saturating_duration_since(Instant::now());
            if !self.pause(self.policy.poll_interval().min(remaining)).await {
                return Err(self.cancelled(attempts, started));
            }
        }

        let elapsed = started.elapsed();
        tracing::warn!(criteria = %self.criteria, attempts, ?elapsed, diagnostic = %last_diagnostic, "gave up waiting");
        Err(VerifyError::Timeout {
            criteria: self.criteria.clone(),
            attempts,
            elapsed,
            last_diagnostic,
        })
    }

    /// Poll until `fetch` yields any value.
    pub async fn poll_present<T, F, Fut>(&self, fetch: F) -> Result<T, VerifyError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, FetchError>>,
    {
        self.poll_until(fetch, |_| CheckResult::present()).await
    }

    async fn attempt<T, F, Fut>(&self, fetch: &mut F, deadline: Instant) -> Attempt<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, FetchError>>,
    {
        let bounded = tokio::time::timeout_at(deadline, fetch());
        let outcome = match &self.cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => return Attempt::Cancelled,
                r = bounded => r,
            },
            None => bounded.await,
        };
        match outcome {
            Ok(result) => Attempt::Done(result),
            Err(_) => Attempt::DeadlineHit,
        }
    }

    /// false when cancelled during the sleep. A zero pause still yields,
    /// so tasks feeding the fetch get to run between attempts.
    async fn pause(&self, d: Duration) -> bool {
        let wait = async {
            if d.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(d).await;
            }
        };
        match &self.cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => false,
                _ = wait => true,
            },
            None => {
                wait.await;
                true
            }
        }
    }

    fn cancelled(&self, attempts: u32, started: Instant) -> VerifyError {
        VerifyError::Cancelled {
            criteria: self.criteria.clone(),
            attempts,
            elapsed: started.elapsed(),
        }
    }
}
