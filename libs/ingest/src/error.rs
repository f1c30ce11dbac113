use converge_api::{ConfigError, DecodeError, FetchError};

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("source ({name}): {source}")]
    Source { name: String, source: FetchError },

    #[error("subscription '{subject}': reconnect budget exhausted after {attempts} attempts, last error: {last_error}")]
    ConnectionExhausted { subject: String, attempts: u32, last_error: String },

    #[error("ingestor task ({name}): {detail}")]
    Task { name: String, detail: String },
}

/// Why a single raw message did not land in a buffer. Never fatal to the loop.
#[derive(Debug, thiserror::Error)]
pub enum LandingError {
    #[error("no kind registered for topic '{0}'")]
    Unroutable(String),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("buffer rejected record: {0}")]
    Rejected(#[from] ConfigError),
}
