use converge_api::{CheckResult, DecodeError, KvFetch};

use crate::error::VerifyError;
use crate::poller::Poller;

/// Poll a key/value store until `key` holds a value that decodes and passes
/// `accept`.
///
/// An absent key and a value that decodes but is rejected are both retried.
/// So is a value that fails to decode: a writer may still be mid-update,
/// so the decode error only becomes the attempt's diagnostic.
pub async fn poll_kv<T, D, A>(
    poller: &Poller,
    kv: &dyn KvFetch,
    key: &str,
    decode: D,
    mut accept: A,
) -> Result<T, VerifyError>
where
    D: Fn(&str) -> Result<T, DecodeError>,
    A: FnMut(&T) -> CheckResult,
{
    poller
        .poll_map(
            || kv.get(key),
            |raw| {
                let value = decode(&raw).map_err(|e| e.to_string())?;
                let check = accept(&value);
                if check.success { Ok(value) } else { Err(check.message) }
            },
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge_api::{ErrorKind, FetchError};
    use std::collections::VecDeque;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::policy::RetryPolicy;

    /// Returns scripted reads in order, then keeps returning the last one.
    struct ScriptedKv {
        reads: Mutex<VecDeque<Result<Option<String>, FetchError>>>,
    }

    impl ScriptedKv {
        fn new(reads: Vec<Result<Option<String>, FetchError>>) -> Self {
            Self { reads: Mutex::new(reads.into()) }
        }
    }

    impl KvFetch for ScriptedKv {
        fn get<'a>(
            &'a self,
            _key: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<Option<String>, FetchError>> + Send + 'a>> {
            let mut reads = self.reads.lock().unwrap();
            let next = if reads.len() > 1 { reads.pop_front() } else { reads.front().cloned() };
            Box::pin(async move { next.unwrap_or(Ok(None)) })
        }
    }

    fn parse_qty(raw: &str) -> Result<u32, DecodeError> {
        raw.parse().map_err(|e| DecodeError::new("qty", e))
    }

    fn poller() -> Poller {
        Poller::new(RetryPolicy::attempts(10, Duration::from_millis(5), Duration::from_secs(2)).unwrap())
            .describe("position:P1")
    }

    #[tokio::test]
    async fn waits_through_absent_garbled_and_stale_values() {
        let kv = ScriptedKv::new(vec![
            Ok(None),
            Ok(Some("12x".into())),
            Ok(Some("5".into())),
            Ok(Some("10".into())),
        ]);
        let qty = poll_kv(&poller(), &kv, "position:P1", parse_qty, |q| {
            if *q == 10 { CheckResult::pass("qty 10") } else { CheckResult::fail(format!("qty {q}")) }
        })
        .await
        .unwrap();
        assert_eq!(qty, 10);
    }

    #[tokio::test]
    async fn decode_failure_is_the_last_diagnostic_on_timeout() {
        let kv = ScriptedKv::new(vec![Ok(Some("not-a-number".into()))]);
        let err = poll_kv(&poller(), &kv, "position:P1", parse_qty, |_| CheckResult::present())
            .await
            .unwrap_err();
        match err {
            VerifyError::Timeout { last_diagnostic, attempts, .. } => {
                assert_eq!(attempts, 10);
                assert!(last_diagnostic.contains("qty"), "{last_diagnostic}");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn store_errors_abort_unless_ignored() {
        let kv = ScriptedKv::new(vec![Err(FetchError::io("connection refused")), Ok(Some("1".into()))]);
        let err = poll_kv(&poller(), &kv, "k", parse_qty, |_| CheckResult::present())
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::Fetch { attempt: 1, .. }));

        let kv = ScriptedKv::new(vec![Err(FetchError::io("connection refused")), Ok(Some("1".into()))]);
        let qty = poll_kv(&poller().ignoring(ErrorKind::Io), &kv, "k", parse_qty, |_| CheckResult::present())
            .await
            .unwrap();
        assert_eq!(qty, 1);
    }
}
