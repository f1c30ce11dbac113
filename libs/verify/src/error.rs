use std::time::Duration;

use converge_api::{ConfigError, FetchError, FieldFilter};

/// Failure of a poll, correlation or probe call.
///
/// Every variant carries what was being waited for plus attempts/elapsed
/// where applicable, so the message alone is enough for a test report.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("timed out waiting for {criteria} after {attempts} attempts in {elapsed:?}; last: {last_diagnostic}")]
    Timeout {
        criteria: String,
        attempts: u32,
        elapsed: Duration,
        last_diagnostic: String,
    },

    #[error("fetch for {criteria} failed on attempt {attempt}: {source:?}")]
    Fetch {
        criteria: String,
        attempt: u32,
        source: FetchError,
    },

    #[error("cancelled while waiting for {criteria} after {attempts} attempts in {elapsed:?}")]
    Cancelled {
        criteria: String,
        attempts: u32,
        elapsed: Duration,
    },

    #[error("no '{kind}' record matching {filter} after {attempts} attempts in {elapsed:?}; last: {last_diagnostic}")]
    NotFound {
        kind: String,
        filter: FieldFilter,
        attempts: u32,
        elapsed: Duration,
        last_diagnostic: String,
    },

    #[error("{matches} '{kind}' records match {filter}, expected exactly {expected}")]
    Ambiguous {
        kind: String,
        filter: FieldFilter,
        matches: usize,
        expected: usize,
    },

    #[error("'{kind}' record matching {filter} appeared after {elapsed:?}, expected none")]
    Unexpected {
        kind: String,
        filter: FieldFilter,
        elapsed: Duration,
    },
}

impl VerifyError {
    /// Attempts made, for variants that track them.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            VerifyError::Timeout { attempts, .. }
            | VerifyError::Cancelled { attempts, .. }
            | VerifyError::NotFound { attempts, .. } => Some(*attempts),
            VerifyError::Fetch { attempt, .. } => Some(*attempt),
            _ => None,
        }
    }
}
