use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    /// The embedding backend could not be brought up. The tracker cannot
    /// run without it, so callers should treat this as fatal.
    #[error("embedding backend unavailable: {0}")]
    EmbeddingBackend(String),

    #[error("embedding batch returned {got} features for {expected} crops")]
    EmbeddingBatch { expected: usize, got: usize },

    #[error("invalid tracker config: {0}")]
    Config(#[from] serde_json::Error),

    #[error("innovation covariance is singular")]
    SingularMatrix,

    #[error("no live track with id {0}")]
    UnknownTrack(u64),
}
