use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::error::FetchError;

// ════════════════════════════════════════════════════════════════
//  Pull side (log-style broker)
// ════════════════════════════════════════════════════════════════

/// Raw message as returned by a pull source, before decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Topic the message was read from. Matched against registered suffixes.
    pub topic: String,
    pub payload: Vec<u8>,
    /// Broker offset, if the source exposes one (diagnostics only).
    pub offset: Option<u64>,
}

impl RawMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self { topic: topic.into(), payload: payload.into(), offset: None }
    }
}

/// Blocking consumer of a log-style broker (Kafka-like).
///
/// The ingestor drives it from a blocking thread: `assign` once, optionally
/// `seek_to_end`, then `poll` in a loop until shutdown, then `close`.
pub trait PullSource: Send {
    /// Bind the consumer to a set of topics.
    fn assign(&mut self, topics: &[String]) -> Result<(), FetchError>;

    /// Skip everything already in the log; only records produced after this
    /// call will be returned.
    fn seek_to_end(&mut self) -> Result<(), FetchError>;

    /// Wait at most `timeout` for new messages. Empty vec = nothing new.
    fn poll(&mut self, timeout: Duration) -> Result<Vec<RawMessage>, FetchError>;

    /// Release the connection, giving up after `timeout`.
    fn close(&mut self, timeout: Duration) -> Result<(), FetchError>;
}

// ════════════════════════════════════════════════════════════════
//  Push side (pub/sub broker)
// ════════════════════════════════════════════════════════════════

/// One delivered message awaiting acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub subject: String,
    pub payload: Vec<u8>,
    /// Opaque id passed back to `PushSubscription::ack`.
    pub delivery_id: u64,
    pub redelivered: bool,
}

/// Active at-least-once subscription with manual acknowledgment.
pub trait PushSubscription: Send {
    /// Next delivery.
    ///
    /// - `Some(Ok(_))`: a message
    /// - `Some(Err(_))`: the connection reported an error
    /// - `None`: the subscription ended (connection lost or closed)
    #[allow(clippy::type_complexity)]
    fn next(&mut self) -> Pin<Box<dyn Future<Output = Option<Result<Delivery, FetchError>>> + Send + '_>>;

    /// Acknowledge a delivery. Unacknowledged deliveries are redelivered
    /// by the broker after the ack-wait period.
    fn ack(&mut self, delivery_id: u64) -> Pin<Box<dyn Future<Output = Result<(), FetchError>> + Send + '_>>;

    /// Unsubscribe and drain, giving up after `timeout`.
    fn close(&mut self, timeout: Duration) -> Pin<Box<dyn Future<Output = Result<(), FetchError>> + Send + '_>>;
}

/// Pub/sub broker client (NATS JetStream-like).
pub trait PushSource: Send + Sync {
    /// Open a subscription on a subject pattern (e.g. `"wallet.events.>"`).
    #[allow(clippy::type_complexity)]
    fn subscribe<'a>(
        &'a self,
        subject_pattern: &'a str,
        ack_wait: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn PushSubscription>, FetchError>> + Send + 'a>>;
}

// ════════════════════════════════════════════════════════════════
//  Key-value point reads
// ════════════════════════════════════════════════════════════════

/// Point read against a key-value store (Redis-like). No transactional
/// semantics assumed.
pub trait KvFetch: Send + Sync {
    #[allow(clippy::type_complexity)]
    fn get<'a>(&'a self, key: &'a str)
        -> Pin<Box<dyn Future<Output = Result<Option<String>, FetchError>> + Send + 'a>>;
}
