use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("write denied: {0}")]
    SandboxViolation(String),

    #[error("core integrity failure: {0}")]
    Integrity(String),

    #[error("schema violation: {0}")]
    Schema(String),

    #[error("invalid JSON on line {line} of {file}: {source}")]
    Parse {
        file: String,
        line: usize,
        source: serde_json::Error,
    },

    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
