use thiserror::Error;

/// Errors shared across the control-plane crates.
///
/// Store errors are fatal (§7): the coordinator logs and exits on them.
/// Everything else is caught at its layer and converted to a string result
/// for the model or operator; this enum exists for the layers that still
/// need a typed error (config load, store I/O, Model transport).
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage unavailable: {0}")]
    Storage(String),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("model transport error: {0}")]
    Model(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
