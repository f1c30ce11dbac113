use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use converge_api::{ConfigError, Delivery, ErrorKind, PushSource, PushSubscription, Record};
use record_buffer::BufferSet;

use crate::catalog::KindCatalog;
use crate::config::PushConfig;
use crate::error::{IngestError, LandingError};
use crate::handle::IngestorHandle;
use crate::landing::land_logged;
use crate::stats::IngestStats;

// ═══════════════════════════════════════════════════════════════
//  Push ingestor: subscription → decode → append → ack
// ═══════════════════════════════════════════════════════════════

/// Consecutive connection failures since the last delivered message.
struct ReconnectBudget {
    max: u32,
    failures: u32,
    last_error: String,
}

impl ReconnectBudget {
    fn new(max: u32) -> Self {
        Self { max, failures: 0, last_error: String::new() }
    }

    /// Record a failure. `false` once the budget is spent.
    fn fail(&mut self, error: impl Into<String>) -> bool {
        self.failures += 1;
        self.last_error = error.into();
        self.failures <= self.max
    }

    fn reset(&mut self) {
        self.failures = 0;
    }

    fn exhausted(&self, subject: &str) -> IngestError {
        IngestError::ConnectionExhausted {
            subject: subject.to_string(),
            attempts: self.failures,
            last_error: self.last_error.clone(),
        }
    }
}

/// Запустить push подписку.
///
/// The first subscription is opened before this returns, spending the same
/// reconnect budget the running loop uses; a broker that never accepts the
/// subscription fails startup with `ConnectionExhausted`. At runtime an
/// exhausted budget ends the loop with the same error, which the handle's
/// `join` / `shutdown` return.
pub async fn spawn_push_ingestor<R: Record>(
    source: Arc<dyn PushSource>,
    config: PushConfig,
    catalog: Arc<KindCatalog<R>>,
    buffers: Arc<BufferSet<R>>,
    token: CancellationToken,
) -> Result<IngestorHandle, IngestError> {
    config
        .validate()
        .map_err(|detail| ConfigError::Invalid { context: "push config", detail })?;
    if catalog.is_empty() {
        return Err(ConfigError::Invalid {
            context: "push config",
            detail: format!("push [{}]: no kinds registered", config.name),
        }
        .into());
    }
    catalog.check(&buffers, &[])?;

    let token = token.child_token();
    let stats = Arc::new(IngestStats::default());
    let mut budget = ReconnectBudget::new(config.max_reconnects);

    let first = match connect(&*source, &config, &mut budget, &stats, &token).await {
        Some(sub) => sub?,
        None => {
            return Err(IngestError::Task {
                name: config.name.clone(),
                detail: "cancelled during startup".into(),
            });
        }
    };

    let name = config.name.clone();
    let shutdown_timeout = config.shutdown_timeout();
    let loop_stats = stats.clone();
    let loop_token = token.clone();
    let handle = tokio::spawn(async move {
        let result = run_push_loop(first, &*source, &config, &catalog, &buffers, &loop_stats, &loop_token, budget).await;
        if let Err(e) = &result {
            tracing::error!(ingestor = %config.name, error = %e, "push ingestion stopped");
        }
        result
    });

    Ok(IngestorHandle::new(name, token, handle, stats, shutdown_timeout))
}

/// Subscribe, retrying within the budget.
/// `None` = cancelled while connecting.
async fn connect(
    source: &dyn PushSource,
    config: &PushConfig,
    budget: &mut ReconnectBudget,
    stats: &IngestStats,
    token: &CancellationToken,
) -> Option<Result<Box<dyn PushSubscription>, IngestError>> {
    loop {
        let attempt = tokio::select! {
            biased;
            _ = token.cancelled() => return None,
            r = source.subscribe(&config.subject_pattern, config.ack_wait()) => r,
        };
        match attempt {
            Ok(sub) => {
                tracing::info!(ingestor = %config.name, subject = %config.subject_pattern, "subscribed");
                return Some(Ok(sub));
            }
            Err(e) => {
                tracing::warn!(
                    ingestor = %config.name,
                    subject = %config.subject_pattern,
                    attempt = budget.failures + 1,
                    error = ?e,
                    "subscribe failed"
                );
                if !budget.fail(e.to_string()) {
                    return Some(Err(budget.exhausted(&config.subject_pattern)));
                }
                stats.reconnect();
                if !sleep_unless_cancelled(token, config.reconnect_delay()).await {
                    return None;
                }
            }
        }
    }
}

enum StreamEnd {
    Cancelled,
    Lost(String),
    Exhausted,
}

#[allow(clippy::too_many_arguments)]
async fn run_push_loop<R: Record>(
    mut sub: Box<dyn PushSubscription>,
    source: &dyn PushSource,
    config: &PushConfig,
    catalog: &KindCatalog<R>,
    buffers: &BufferSet<R>,
    stats: &IngestStats,
    token: &CancellationToken,
    mut budget: ReconnectBudget,
) -> Result<(), IngestError> {
    loop {
        match consume(&mut *sub, config, catalog, buffers, stats, token, &mut budget).await {
            StreamEnd::Cancelled => {
                close_within(&mut *sub, config).await;
                tracing::info!(ingestor = %config.name, stats = ?stats.snapshot(), "push loop finished");
                return Ok(());
            }
            StreamEnd::Exhausted => {
                close_within(&mut *sub, config).await;
                return Err(budget.exhausted(&config.subject_pattern));
            }
            StreamEnd::Lost(reason) => {
                tracing::warn!(ingestor = %config.name, %reason, "subscription lost, reconnecting");
                close_within(&mut *sub, config).await;
                if !budget.fail(reason) {
                    return Err(budget.exhausted(&config.subject_pattern));
                }
                stats.reconnect();
                if !sleep_unless_cancelled(token, config.reconnect_delay()).await {
                    return Ok(());
                }
                sub = match connect(source, config, &mut budget, stats, token).await {
                    Some(r) => r?,
                    None => return Ok(()),
                };
            }
        }
    }
}

async fn consume<R: Record>(
    sub: &mut dyn PushSubscription,
    config: &PushConfig,
    catalog: &KindCatalog<R>,
    buffers: &BufferSet<R>,
    stats: &IngestStats,
    token: &CancellationToken,
    budget: &mut ReconnectBudget,
) -> StreamEnd {
    loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => return StreamEnd::Cancelled,
            next = sub.next() => next,
        };
        match next {
            Some(Ok(delivery)) => {
                budget.reset();
                handle_delivery(sub, delivery, config, catalog, buffers, stats).await;
            }
            Some(Err(e)) if e.kind() == ErrorKind::Io => return StreamEnd::Lost(e.to_string()),
            Some(Err(e)) => {
                tracing::warn!(
                    ingestor = %config.name,
                    attempt = budget.failures + 1,
                    error = ?e,
                    "subscription error"
                );
                // repeated errors without a delivery spend the same budget as reconnects
                if !budget.fail(e.to_string()) {
                    return StreamEnd::Exhausted;
                }
                if !sleep_unless_cancelled(token, config.reconnect_delay()).await {
                    return StreamEnd::Cancelled;
                }
            }
            None => return StreamEnd::Lost("subscription ended".into()),
        }
    }
}

/// Ack only after the record is buffered. Undecodable messages are left
/// unacknowledged and come back after ack-wait; messages no kind claims
/// are acknowledged, since redelivery cannot help them.
async fn handle_delivery<R: Record>(
    sub: &mut dyn PushSubscription,
    delivery: Delivery,
    config: &PushConfig,
    catalog: &KindCatalog<R>,
    buffers: &BufferSet<R>,
    stats: &IngestStats,
) {
    stats.received(1);
    let ack = match land_logged(catalog, buffers, stats, &config.name, &delivery.subject, &delivery.payload) {
        Ok(_) | Err(LandingError::Unroutable(_)) => true,
        Err(LandingError::Decode(_)) | Err(LandingError::Rejected(_)) => false,
    };
    if !ack {
        return;
    }
    if let Err(e) = sub.ack(delivery.delivery_id).await {
        tracing::warn!(
            ingestor = %config.name,
            subject = %delivery.subject,
            delivery_id = delivery.delivery_id,
            error = ?e,
            "ack failed, broker will redeliver"
        );
    }
}

/// Close the subscription, giving up on an unresponsive broker.
async fn close_within(sub: &mut dyn PushSubscription, config: &PushConfig) {
    let timeout = config.close_timeout();
    match tokio::time::timeout(timeout, sub.close(timeout)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(ingestor = %config.name, error = ?e, "close error"),
        Err(_) => tracing::warn!(ingestor = %config.name, "close timed out, abandoning connection"),
    }
}

/// `false` if cancelled before the delay elapsed.
async fn sleep_unless_cancelled(token: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
