use thiserror::Error;

pub type Result<T> = std::result::Result<T, MemoryError>;

#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Routing error: {0}")]
    RouterError(#[from] coherence_router::RouterError),

    #[error("Invalid recall pattern: {0}")]
    PatternError(#[from] glob::PatternError),
}
