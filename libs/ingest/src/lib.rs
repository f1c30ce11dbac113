pub mod config;
pub mod error;
mod catalog;
mod handle;
mod landing;
mod pull;
mod push;
mod stats;

pub use catalog::{KindCatalog, KindCatalogBuilder, KindEntry};
pub use config::{KindConfig, PullConfig, PushConfig, StartPosition};
pub use error::{IngestError, LandingError};
pub use handle::{IngestorHandle, ShutdownOutcome};
pub use pull::spawn_pull_ingestor;
pub use push::spawn_push_ingestor;
pub use stats::{IngestStats, StatsSnapshot};
