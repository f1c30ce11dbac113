/// Category of a fetch/source error. Lets the poller and the ingestors
/// decide between retrying, skipping and failing fast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Invalid configuration (permanent, fail at startup).
    Config,
    /// I/O or network error (transient, may retry/reconnect).
    Io,
    /// Data format/parse error (bad input, skip record).
    Format,
    /// Backend rejected the request because of a uniqueness/version conflict.
    Conflict,
    /// Logical error (invalid state, generic).
    Logic,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Config => f.write_str("config"),
            ErrorKind::Io => f.write_str("io"),
            ErrorKind::Format => f.write_str("format"),
            ErrorKind::Conflict => f.write_str("conflict"),
            ErrorKind::Logic => f.write_str("logic"),
        }
    }
}

/// Error returned by every backend capability (fetch functions, pull and
/// push sources, KV reads).
///
/// Carries an `ErrorKind` for categorization and a human-readable message.
/// `From` impls assign the appropriate kind automatically so `?` works
/// inside fetch closures.
#[derive(Clone, PartialEq, Eq)]
pub struct FetchError {
    kind: ErrorKind,
    message: String,
}

impl FetchError {
    /// Generic logic error (default kind).
    pub fn new(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Logic, message: msg.into() }
    }

    pub fn with_kind(kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self { kind, message: msg.into() }
    }

    /// Configuration error (permanent).
    pub fn config(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Config, message: msg.into() }
    }

    /// I/O error (transient, may retry/reconnect).
    pub fn io(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Io, message: msg.into() }
    }

    /// Format/parse error (bad input).
    pub fn format_err(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Format, message: msg.into() }
    }

    /// Uniqueness or optimistic-lock conflict reported by the backend.
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Conflict, message: msg.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Prepend context to the message, keeping the kind.
    pub fn with_context(self, ctx: impl std::fmt::Display) -> Self {
        Self { kind: self.kind, message: format!("{ctx}: {}", self.message) }
    }
}

impl std::fmt::Debug for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for FetchError {}

impl From<String> for FetchError {
    fn from(s: String) -> Self { Self { kind: ErrorKind::Logic, message: s } }
}

impl From<&str> for FetchError {
    fn from(s: &str) -> Self { Self { kind: ErrorKind::Logic, message: s.to_string() } }
}

impl From<std::io::Error> for FetchError {
    fn from(e: std::io::Error) -> Self { Self { kind: ErrorKind::Io, message: e.to_string() } }
}

impl From<serde_json::Error> for FetchError {
    fn from(e: serde_json::Error) -> Self { Self { kind: ErrorKind::Format, message: e.to_string() } }
}

impl From<DecodeError> for FetchError {
    fn from(e: DecodeError) -> Self { Self { kind: ErrorKind::Format, message: e.to_string() } }
}

/// A single raw message could not be turned into a record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("decode ({kind}): {detail}")]
pub struct DecodeError {
    pub kind: String,
    pub detail: String,
}

impl DecodeError {
    pub fn new(kind: impl Into<String>, detail: impl std::fmt::Display) -> Self {
        Self { kind: kind.into(), detail: detail.to_string() }
    }
}

/// Invalid policy or kind registration. Always fatal, never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid retry policy: {0}")]
    InvalidPolicy(String),

    #[error("kind '{0}' is not registered")]
    UnknownKind(String),

    #[error("record of kind '{actual}' appended to '{expected}' buffer")]
    KindMismatch { expected: String, actual: String },

    #[error("kind '{0}' registered twice")]
    DuplicateKind(String),

    #[error("suffix '{suffix}' is claimed by both '{first}' and '{second}'")]
    DuplicateSuffix { suffix: String, first: String, second: String },

    #[error("no kind registered for topic '{0}'")]
    UnroutableTopic(String),

    #[error("no decoder bound for kind '{0}'")]
    MissingDecoder(String),

    #[error("policy '{0}' not defined")]
    UnknownPolicy(String),

    #[error("{context}: {detail}")]
    Invalid { context: &'static str, detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_impls_assign_kind() {
        let io: FetchError = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset").into();
        assert_eq!(io.kind(), ErrorKind::Io);

        let json: FetchError = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
        assert_eq!(json.kind(), ErrorKind::Format);

        let plain: FetchError = "boom".into();
        assert_eq!(plain.kind(), ErrorKind::Logic);
    }

    #[test]
    fn context_keeps_kind() {
        let e = FetchError::conflict("duplicate key").with_context("wallet 42");
        assert_eq!(e.kind(), ErrorKind::Conflict);
        assert_eq!(e.message(), "wallet 42: duplicate key");
        assert_eq!(format!("{e:?}"), "[conflict] wallet 42: duplicate key");
    }
}
