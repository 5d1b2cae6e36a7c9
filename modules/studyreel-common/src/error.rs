use thiserror::Error;

/// Search-provider failure modes. Quota exhaustion is fatal to the run and
/// never retried; transient failures get a bounded retry before the caller
/// skips and tallies them.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider quota exceeded")]
    QuotaExceeded,

    #[error("transient provider error: {0}")]
    Transient(String),

    #[error("unparseable provider response: {0}")]
    Parse(String),
}

#[derive(Debug, Error)]
pub enum CuratorError {
    #[error("another curation run is already in progress")]
    AlreadyRunning,

    #[error("auto-curation is disabled")]
    CurationDisabled,

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("store error: {0}")]
    Store(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
