use thiserror::Error;

pub type Result<T> = std::result::Result<T, RouterError>;

/// Hard failures of the router.
///
/// Routing itself never fails: unclassifiable packets land in the intake
/// area instead. These errors cover loading schema documents and the
/// directory creation done by a non-dry-run `transmit`.
#[derive(Error, Debug)]
pub enum RouterError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Unknown built-in schema: {0}")]
    UnknownBuiltin(String),
}

impl RouterError {
    pub fn invalid_schema(msg: impl Into<String>) -> Self {
        Self::InvalidSchema(msg.into())
    }
}
