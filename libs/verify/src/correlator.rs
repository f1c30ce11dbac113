use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use converge_api::{CheckResult, FieldFilter, Record};
use record_buffer::BufferSet;

use crate::error::VerifyError;
use crate::poller::Poller;
use crate::policy::RetryPolicy;

/// Which match to return when several records satisfy the filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pick {
    /// Earliest appended.
    #[default]
    First,
    /// Most recently appended.
    Latest,
}

/// Interval for [`Correlator::expect_none`] checks.
const QUIET_CHECK_INTERVAL: Duration = Duration::from_millis(25);

// ═══════════════════════════════════════════════════════════════
//  Correlator: poll the record buffers for a filter match
// ═══════════════════════════════════════════════════════════════

/// Waits for records to show up in a [`BufferSet`] fed by the ingestors.
///
/// An unknown kind fails immediately with [`VerifyError::Config`]; it never
/// turns into a timeout.
pub struct Correlator<R> {
    buffers: Arc<BufferSet<R>>,
    cancel: Option<CancellationToken>,
}

impl<R> Clone for Correlator<R> {
    fn clone(&self) -> Self {
        Self { buffers: self.buffers.clone(), cancel: self.cancel.clone() }
    }
}

impl<R: Record> Correlator<R> {
    pub fn new(buffers: Arc<BufferSet<R>>) -> Self {
        Self { buffers, cancel: None }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn buffers(&self) -> &Arc<BufferSet<R>> {
        &self.buffers
    }

    /// Wait until at least one `kind` record matches `filter`.
    pub async fn expect_one(
        &self,
        kind: &str,
        filter: &FieldFilter,
        pick: Pick,
        policy: RetryPolicy,
    ) -> Result<Arc<R>, VerifyError> {
        let buffer = self.buffers.buffer(kind)?;
        self.poller(kind, filter, policy)
            .poll_present(|| {
                let found = match pick {
                    Pick::First => buffer.find_first(filter),
                    Pick::Latest => buffer.find_latest(filter),
                };
                std::future::ready(Ok(found))
            })
            .await
            .map_err(|e| not_found(e, kind, filter))
    }

    /// Like [`expect_one`](Self::expect_one), then fails with
    /// [`VerifyError::Ambiguous`] if more than one record matches at that
    /// moment. Duplicates are a defect in the system under test, so this is
    /// not retried.
    pub async fn expect_unique(
        &self,
        kind: &str,
        filter: &FieldFilter,
        policy: RetryPolicy,
    ) -> Result<Arc<R>, VerifyError> {
        let found = self.expect_one(kind, filter, Pick::First, policy).await?;
        let matches = self.buffers.buffer(kind)?.count(filter);
        if matches != 1 {
            return Err(VerifyError::Ambiguous {
                kind: kind.to_string(),
                filter: filter.clone(),
                matches,
                expected: 1,
            });
        }
        Ok(found)
    }

    /// Wait until exactly `n` records match. Overshooting `n` is terminal.
    pub async fn expect_count(
        &self,
        kind: &str,
        filter: &FieldFilter,
        n: usize,
        policy: RetryPolicy,
    ) -> Result<Vec<Arc<R>>, VerifyError> {
        let buffer = self.buffers.buffer(kind)?;
        let found = self
            .poller(kind, filter, policy)
            .poll_until(
                || std::future::ready(Ok(Some(buffer.find_all(filter)))),
                |all| {
                    if all.len() >= n {
                        CheckResult::pass(format!("{} matches", all.len()))
                    } else {
                        CheckResult::fail(format!("{} of {n} matches", all.len()))
                    }
                },
            )
            .await
            .map_err(|e| not_found(e, kind, filter))?;

        if found.len() > n {
            return Err(VerifyError::Ambiguous {
                kind: kind.to_string(),
                filter: filter.clone(),
                matches: found.len(),
                expected: n,
            });
        }
        Ok(found)
    }

    /// Assert that no `kind` record matches `filter` for the whole `window`,
    /// counting records already buffered.
    pub async fn expect_none(&self, kind: &str, filter: &FieldFilter, window: Duration) -> Result<(), VerifyError> {
        let buffer = self.buffers.buffer(kind)?;
        let started = Instant::now();
        let deadline = started + window;
        loop {
            if buffer.find_first(filter).is_some() {
                tracing::debug!(kind, %filter, elapsed = ?started.elapsed(), "unexpected record");
                return Err(VerifyError::Unexpected {
                    kind: kind.to_string(),
                    filter: filter.clone(),
                    elapsed: started.elapsed(),
                });
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            let step = QUIET_CHECK_INTERVAL.min(deadline - now);
            match &self.cancel {
                Some(token) => tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        return Err(VerifyError::Cancelled {
                            criteria: format!("no {kind} {filter}"),
                            attempts: 0,
                            elapsed: started.elapsed(),
                        });
                    }
                    _ = tokio::time::sleep(step) => {}
                },
                None => tokio::time::sleep(step).await,
            }
        }
    }

    fn poller(&self, kind: &str, filter: &FieldFilter, policy: RetryPolicy) -> Poller {
        let poller = Poller::new(policy).describe(format!("{kind} {filter}"));
        match &self.cancel {
            Some(token) => poller.with_cancellation(token.clone()),
            None => poller,
        }
    }
}

fn not_found(err: VerifyError, kind: &str, filter: &FieldFilter) -> VerifyError {
    match err {
        VerifyError::Timeout { attempts, elapsed, last_diagnostic, .. } => VerifyError::NotFound {
            kind: kind.to_string(),
            filter: filter.clone(),
            attempts,
            elapsed,
            last_diagnostic,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge_api::{ConfigError, JsonRecord};
    use serde_json::json;

    fn buffers() -> Arc<BufferSet<JsonRecord>> {
        Arc::new(BufferSet::new(["order", "trade"]))
    }

    fn order(id: &str, status: &str) -> JsonRecord {
        JsonRecord::new("order", json!({"orderId": id, "status": status}))
    }

    fn fast(attempts: u32) -> RetryPolicy {
        RetryPolicy::attempts(attempts, Duration::from_millis(20), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn finds_record_appended_while_waiting() {
        let set = buffers();
        let writer = set.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(60)).await;
            writer.append(order("O1", "NEW")).unwrap();
        });

        let found = Correlator::new(set)
            .expect_one("order", &FieldFilter::new().with("orderId", "O1"), Pick::First, fast(50))
            .await
            .unwrap();
        assert_eq!(found.field("status").as_deref(), Some("NEW"));
    }

    #[tokio::test]
    async fn zero_interval_still_sees_concurrent_appends() {
        let set = buffers();
        let writer = set.clone();
        tokio::spawn(async move {
            writer.append(order("O1", "NEW")).unwrap();
        });

        let busy = RetryPolicy::attempts(200_000, Duration::ZERO, Duration::from_secs(2)).unwrap();
        let found = Correlator::new(set)
            .expect_one("order", &FieldFilter::new().with("orderId", "O1"), Pick::First, busy)
            .await
            .unwrap();
        assert_eq!(found.field("status").as_deref(), Some("NEW"));
    }

    #[tokio::test]
    async fn pick_selects_first_or_latest() {
        let set = buffers();
        set.append(order("O1", "NEW")).unwrap();
        set.append(order("O1", "FILLED")).unwrap();
        let c = Correlator::new(set);
        let f = FieldFilter::new().with("orderId", "O1");

        let first = c.expect_one("order", &f, Pick::First, fast(1)).await.unwrap();
        let latest = c.expect_one("order", &f, Pick::Latest, fast(1)).await.unwrap();
        assert_eq!(first.field("status").as_deref(), Some("NEW"));
        assert_eq!(latest.field("status").as_deref(), Some("FILLED"));
    }

    #[tokio::test]
    async fn missing_record_reports_not_found_with_filter() {
        let c = Correlator::new(buffers());
        let err = c
            .expect_one("order", &FieldFilter::new().with("orderId", "O9"), Pick::First, fast(3))
            .await
            .unwrap_err();
        match err {
            VerifyError::NotFound { kind, filter, attempts, .. } => {
                assert_eq!(kind, "order");
                assert_eq!(filter.to_string(), "{orderId=O9}");
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_kind_fails_without_polling() {
        let started = std::time::Instant::now();
        let err = Correlator::new(buffers())
            .expect_one("position", &FieldFilter::new(), Pick::First, fast(50))
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::Config(ConfigError::UnknownKind(_))));
        assert!(started.elapsed() < Duration::from_millis(20));
    }

    #[tokio::test]
    async fn duplicates_make_unique_ambiguous() {
        let set = buffers();
        set.append(order("O1", "NEW")).unwrap();
        set.append(order("O1", "NEW")).unwrap();
        let err = Correlator::new(set)
            .expect_unique("order", &FieldFilter::new().with("orderId", "O1"), fast(5))
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::Ambiguous { matches: 2, expected: 1, .. }));
    }

    #[tokio::test]
    async fn count_waits_for_n_and_rejects_overshoot() {
        let set = buffers();
        set.append(order("O1", "NEW")).unwrap();
        let writer = set.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(40)).await;
            writer.append(order("O2", "NEW")).unwrap();
        });
        let c = Correlator::new(set.clone());
        let news = FieldFilter::new().with("status", "NEW");
        assert_eq!(c.expect_count("order", &news, 2, fast(50)).await.unwrap().len(), 2);

        set.append(order("O3", "NEW")).unwrap();
        let err = c.expect_count("order", &news, 2, fast(50)).await.unwrap_err();
        assert!(matches!(err, VerifyError::Ambiguous { matches: 3, expected: 2, .. }));
    }

    #[tokio::test]
    async fn expect_none_passes_quiet_window_and_catches_arrivals() {
        let set = buffers();
        let c = Correlator::new(set.clone());
        let f = FieldFilter::new().with("orderId", "O1");
        c.expect_none("order", &f, Duration::from_millis(60)).await.unwrap();

        let writer = set.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            writer.append(order("O1", "REJECTED")).unwrap();
        });
        let err = c.expect_none("order", &f, Duration::from_millis(500)).await.unwrap_err();
        assert!(matches!(err, VerifyError::Unexpected { .. }));
    }
}
