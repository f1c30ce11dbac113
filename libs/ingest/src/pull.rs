use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use converge_api::{ConfigError, FetchError, PullSource, Record};
use record_buffer::BufferSet;

use crate::catalog::KindCatalog;
use crate::config::{PullConfig, StartPosition};
use crate::error::IngestError;
use crate::handle::IngestorHandle;
use crate::landing::land_logged;
use crate::stats::IngestStats;

// ═══════════════════════════════════════════════════════════════
//  Pull ingestor: source.poll() → decode → buffers.append()
// ═══════════════════════════════════════════════════════════════

/// Запустить pull consumer loop: assign → (seek_to_end) → poll loop.
///
/// Setup runs before this returns, so a bad topic list or an unreachable
/// broker fails here instead of surfacing later as a missing record. The
/// loop itself runs on the blocking pool and stops when `token` (or the
/// handle's shutdown) is cancelled.
pub async fn spawn_pull_ingestor<R: Record>(
    source: Box<dyn PullSource>,
    config: PullConfig,
    catalog: Arc<KindCatalog<R>>,
    buffers: Arc<BufferSet<R>>,
    token: CancellationToken,
) -> Result<IngestorHandle, IngestError> {
    config
        .validate()
        .map_err(|detail| ConfigError::Invalid { context: "pull config", detail })?;
    catalog.check(&buffers, &config.topics)?;

    let name = config.name.clone();
    let setup_cfg = config.clone();
    let setup = tokio::task::spawn_blocking(move || {
        let mut source = source;
        prepare(&mut *source, &setup_cfg).map(|()| source)
    });
    let source = match tokio::time::timeout(config.setup_timeout(), setup).await {
        Ok(Ok(Ok(source))) => source,
        Ok(Ok(Err(e))) => return Err(IngestError::Source { name, source: e }),
        Ok(Err(e)) => return Err(IngestError::Task { name, detail: e.to_string() }),
        Err(_) => {
            return Err(IngestError::Source {
                name,
                source: FetchError::io(format!(
                    "setup did not complete within {}ms",
                    config.setup_timeout_ms
                )),
            });
        }
    };

    let stats = Arc::new(IngestStats::default());
    let token = token.child_token();
    let shutdown_timeout = config.shutdown_timeout();

    let loop_stats = stats.clone();
    let loop_token = token.clone();
    let handle = tokio::task::spawn_blocking(move || {
        run_pull_loop(source, &config, &catalog, &buffers, &loop_stats, &loop_token);
        Ok(())
    });

    Ok(IngestorHandle::new(name, token, handle, stats, shutdown_timeout))
}

fn prepare(source: &mut dyn PullSource, config: &PullConfig) -> Result<(), FetchError> {
    source.assign(&config.topics)?;
    match config.start {
        StartPosition::End => source.seek_to_end()?,
        StartPosition::Beginning => {}
    }
    tracing::info!(
        ingestor = %config.name,
        topics = ?config.topics,
        start = ?config.start,
        "pull source ready"
    );
    Ok(())
}

/// Блокирующий poll loop. Ошибки decode и poll не останавливают loop.
fn run_pull_loop<R: Record>(
    mut source: Box<dyn PullSource>,
    config: &PullConfig,
    catalog: &KindCatalog<R>,
    buffers: &BufferSet<R>,
    stats: &IngestStats,
    token: &CancellationToken,
) {
    let name = config.name.as_str();
    let poll_timeout = config.poll_timeout();

    while !token.is_cancelled() {
        let batch = match source.poll(poll_timeout) {
            Ok(batch) => batch,
            Err(e) => {
                stats.poll_error();
                tracing::error!(ingestor = %name, error = ?e, "poll error");
                sleep_unless_cancelled(token, config.error_backoff());
                continue;
            }
        };
        if batch.is_empty() {
            continue;
        }
        stats.received(batch.len() as u64);

        let total = batch.len();
        for (i, msg) in batch.into_iter().enumerate() {
            if token.is_cancelled() {
                tracing::debug!(ingestor = %name, dropped = total - i, "shutdown requested, dropping rest of batch");
                break;
            }
            let _ = land_logged(catalog, buffers, stats, name, &msg.topic, &msg.payload);
        }
    }

    if let Err(e) = source.close(config.close_timeout()) {
        tracing::warn!(ingestor = %name, error = ?e, "close error");
    }
    tracing::info!(ingestor = %name, stats = ?stats.snapshot(), "pull loop finished");
}

/// Sleep in short slices so cancellation is noticed promptly.
fn sleep_unless_cancelled(token: &CancellationToken, total: Duration) {
    let deadline = Instant::now() + total;
    while !token.is_cancelled() {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        std::thread::sleep((deadline - now).min(Duration::from_millis(50)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use converge_api::{FieldFilter, JsonRecord, RawMessage, json_decoder};

    use crate::handle::ShutdownOutcome;

    /// Replays scripted batches; records which setup calls were made.
    #[derive(Clone, Default)]
    struct ScriptedPull {
        batches: Arc<Mutex<VecDeque<Result<Vec<RawMessage>, FetchError>>>>,
        calls: Arc<Mutex<Vec<&'static str>>>,
        fail_assign: bool,
    }

    impl ScriptedPull {
        fn push(&self, batch: Result<Vec<RawMessage>, FetchError>) {
            self.batches.lock().unwrap().push_back(batch);
        }
    }

    impl PullSource for ScriptedPull {
        fn assign(&mut self, _topics: &[String]) -> Result<(), FetchError> {
            self.calls.lock().unwrap().push("assign");
            if self.fail_assign {
                return Err(FetchError::io("broker unreachable"));
            }
            Ok(())
        }

        fn seek_to_end(&mut self) -> Result<(), FetchError> {
            self.calls.lock().unwrap().push("seek_to_end");
            Ok(())
        }

        fn poll(&mut self, timeout: Duration) -> Result<Vec<RawMessage>, FetchError> {
            let next = self.batches.lock().unwrap().pop_front();
            match next {
                Some(batch) => batch,
                None => {
                    std::thread::sleep(timeout.min(Duration::from_millis(10)));
                    Ok(Vec::new())
                }
            }
        }

        fn close(&mut self, _timeout: Duration) -> Result<(), FetchError> {
            self.calls.lock().unwrap().push("close");
            Ok(())
        }
    }

    fn catalog() -> Arc<KindCatalog<JsonRecord>> {
        Arc::new(
            KindCatalog::builder()
                .register("limit-event", "limits", json_decoder("limit-event"))
                .build()
                .unwrap(),
        )
    }

    fn config(start: StartPosition) -> PullConfig {
        let mut cfg = PullConfig::new("limits", vec!["prod.limits".into()]);
        cfg.start = start;
        cfg.poll_ms = 10;
        cfg.error_backoff_ms = 10;
        cfg
    }

    async fn wait_for_appended(handle: &IngestorHandle, n: u64) {
        for _ in 0..200 {
            if handle.stats().appended >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("only {} records appended, expected {n}", handle.stats().appended);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn start_option_controls_seek() {
        let catalog = catalog();
        let buffers = Arc::new(catalog.buffers());

        let tail = ScriptedPull::default();
        let h = spawn_pull_ingestor(Box::new(tail.clone()), config(StartPosition::End), catalog.clone(), buffers.clone(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(h.shutdown().await.unwrap(), ShutdownOutcome::Clean);
        assert_eq!(*tail.calls.lock().unwrap(), vec!["assign", "seek_to_end", "close"]);

        let replay = ScriptedPull::default();
        let h = spawn_pull_ingestor(Box::new(replay.clone()), config(StartPosition::Beginning), catalog, buffers, CancellationToken::new())
            .await
            .unwrap();
        h.shutdown().await.unwrap();
        assert_eq!(*replay.calls.lock().unwrap(), vec!["assign", "close"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn poll_errors_do_not_stop_the_loop() {
        let catalog = catalog();
        let buffers = Arc::new(catalog.buffers());
        let source = ScriptedPull::default();
        source.push(Err(FetchError::io("rebalance in progress")));
        source.push(Ok(vec![RawMessage::new("prod.limits", br#"{"limitId":"L1"}"#.to_vec())]));

        let h = spawn_pull_ingestor(Box::new(source), config(StartPosition::End), catalog, buffers.clone(), CancellationToken::new())
            .await
            .unwrap();
        wait_for_appended(&h, 1).await;
        assert_eq!(h.stats().poll_errors, 1);
        assert_eq!(buffers.count("limit-event", &FieldFilter::new().with("limitId", "L1")).unwrap(), 1);
        h.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn unroutable_topic_fails_before_start() {
        let catalog = catalog();
        let buffers = Arc::new(catalog.buffers());
        let cfg = PullConfig::new("bad", vec!["prod.sessions".into()]);
        let err = spawn_pull_ingestor(Box::new(ScriptedPull::default()), cfg, catalog, buffers, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Config(ConfigError::UnroutableTopic(_))));
    }

    #[tokio::test]
    async fn setup_failure_is_reported_eagerly() {
        let catalog = catalog();
        let buffers = Arc::new(catalog.buffers());
        let source = ScriptedPull { fail_assign: true, ..Default::default() };
        let err = spawn_pull_ingestor(Box::new(source), config(StartPosition::End), catalog, buffers, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Source { .. }));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stuck_poll_is_abandoned_after_shutdown_timeout() {
        struct Stuck;
        impl PullSource for Stuck {
            fn assign(&mut self, _: &[String]) -> Result<(), FetchError> { Ok(()) }
            fn seek_to_end(&mut self) -> Result<(), FetchError> { Ok(()) }
            fn poll(&mut self, _: Duration) -> Result<Vec<RawMessage>, FetchError> {
                // ignores its timeout, like a hung broker connection
                std::thread::sleep(Duration::from_millis(600));
                Ok(Vec::new())
            }
            fn close(&mut self, _: Duration) -> Result<(), FetchError> { Ok(()) }
        }

        let catalog = catalog();
        let buffers = Arc::new(catalog.buffers());
        let mut cfg = config(StartPosition::End);
        cfg.shutdown_timeout_ms = 100;
        let h = spawn_pull_ingestor(Box::new(Stuck), cfg, catalog, buffers, CancellationToken::new())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let started = Instant::now();
        assert_eq!(h.shutdown().await.unwrap(), ShutdownOutcome::Abandoned);
        assert!(started.elapsed() < Duration::from_millis(400));
    }
}
