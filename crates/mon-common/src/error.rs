use thiserror::Error;

/// Top-level error taxonomy shared across crates. Individual crates add their
/// own narrower error enums (`StoreError`, `ExecutorError`, ...) and convert
/// into this one only at the binary boundary.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("store error: {0}")]
    Store(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown check kind: {0}")]
    UnknownCheckKind(String),

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, MonitorError>;
