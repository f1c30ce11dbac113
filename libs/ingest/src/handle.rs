use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::IngestError;
use crate::stats::{IngestStats, StatsSnapshot};

/// How an ingestor stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Loop observed cancellation, closed its connection and exited in time.
    Clean,
    /// Loop did not exit within the shutdown timeout and was left behind.
    Abandoned,
}

/// Handle to a running pull or push loop.
pub struct IngestorHandle {
    name: String,
    token: CancellationToken,
    handle: JoinHandle<Result<(), IngestError>>,
    stats: Arc<IngestStats>,
    shutdown_timeout: Duration,
}

impl std::fmt::Debug for IngestorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestorHandle")
            .field("name", &self.name)
            .field("finished", &self.handle.is_finished())
            .finish()
    }
}

impl IngestorHandle {
    pub(crate) fn new(
        name: String,
        token: CancellationToken,
        handle: JoinHandle<Result<(), IngestError>>,
        stats: Arc<IngestStats>,
        shutdown_timeout: Duration,
    ) -> Self {
        Self { name, token, handle, stats, shutdown_timeout }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// The loop has exited (on its own or after cancellation).
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Signal the loop and wait at most the configured shutdown timeout.
    ///
    /// A loop stuck in an unresponsive broker call is abandoned: the task is
    /// aborted (or, for a blocking pull thread, detached) and the call
    /// returns `Abandoned`. A fatal error the loop ended with before the
    /// signal is returned as `Err`.
    pub async fn shutdown(mut self) -> Result<ShutdownOutcome, IngestError> {
        self.token.cancel();
        match tokio::time::timeout(self.shutdown_timeout, &mut self.handle).await {
            Ok(Ok(Ok(()))) => {
                tracing::info!(ingestor = %self.name, "stopped");
                Ok(ShutdownOutcome::Clean)
            }
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(e)) => Err(IngestError::Task { name: self.name, detail: e.to_string() }),
            Err(_) => {
                tracing::warn!(
                    ingestor = %self.name,
                    timeout_ms = self.shutdown_timeout.as_millis() as u64,
                    "shutdown deadline exceeded, abandoning connection"
                );
                self.handle.abort();
                Ok(ShutdownOutcome::Abandoned)
            }
        }
    }

    /// Wait until the loop ends by itself: a fatal error such as an
    /// exhausted reconnect budget, or cancellation of the parent token.
    pub async fn join(self) -> Result<(), IngestError> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(IngestError::Task { name: self.name, detail: e.to_string() }),
        }
    }
}
