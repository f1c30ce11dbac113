pub mod config;
pub mod error;
mod correlator;
mod kv;
mod poller;
mod policy;
mod probe;

pub use config::{DEFAULT_POLICY, HarnessConfig, RetryPolicyConfig};
pub use correlator::{Correlator, Pick};
pub use error::VerifyError;
pub use kv::poll_kv;
pub use poller::Poller;
pub use policy::RetryPolicy;
pub use probe::{ProbeReport, execute_identical_requests, is_conflict};

/// Install a fmt subscriber filtered by `RUST_LOG` (default `info`).
///
/// Safe to call from every test: only the first call installs anything.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_test_writer()
        .try_init();
}
