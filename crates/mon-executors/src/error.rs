use thiserror::Error;

/// Errors that prevent an executor from even producing a structured
/// `error`-status result (malformed `Check.data`, registry miss). Anything
/// an executor can classify as a probe failure is instead encoded directly
/// into a [`mon_common::CheckResult`] with `status = error`.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("unknown check kind: {0}")]
    UnknownKind(String),

    #[error("invalid check configuration: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, ExecutorError>;
