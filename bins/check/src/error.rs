#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("config: {0}")]
    Config(#[from] converge_api::ConfigError),

    #[error("no {0} configured")]
    NoComponents(&'static str),
}
