/// Shared error type used across all Maestro crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("unknown specialist: {0}")]
    Recruit(String),

    #[error("checkpoint: {0}")]
    Checkpoint(String),

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for transport-level failures that abort the run (the checkpoint
    /// is retained so the run can be resumed).
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Http(_) | Error::Timeout(_) | Error::Provider { .. }
        )
    }
}

/// Error raised by tool executors, classified into the closed set of kinds
/// the execution engine reports to the model and the run log.
///
/// Tool errors never abort a run: the engine converts them into error-dict
/// results that are sent back to the LLM, and the loop continues.
#[derive(thiserror::Error, Debug)]
pub enum ToolError {
    /// Path escape or disallowed command. Also emits a `security_event`.
    #[error("permission denied: {0}")]
    Permission(String),

    /// Wrong argument type or shape from the LLM.
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    /// Filesystem or subprocess failure.
    #[error("io error: {0}")]
    Io(String),

    /// Anything else.
    #[error("{0}")]
    Unexpected(String),
}

impl ToolError {
    /// The error kind string recorded in `tool_error` run-log events.
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::Permission(_) => "permission",
            ToolError::InvalidArgs(_) => "invalid_args",
            ToolError::Io(_) => "io_error",
            ToolError::Unexpected(_) => "unexpected",
        }
    }

    /// The `error` field of the result dict sent back to the LLM.
    pub fn error_label(&self) -> &'static str {
        match self {
            ToolError::Permission(_) => "permission_denied",
            ToolError::InvalidArgs(_) => "invalid_arguments",
            ToolError::Io(_) => "io_error",
            ToolError::Unexpected(_) => "unexpected_error",
        }
    }
}

impl From<std::io::Error> for ToolError {
    fn from(e: std::io::Error) -> Self {
        ToolError::Io(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_error_kinds() {
        assert_eq!(ToolError::Permission("x".into()).kind(), "permission");
        assert_eq!(ToolError::InvalidArgs("x".into()).kind(), "invalid_args");
        assert_eq!(ToolError::Io("x".into()).kind(), "io_error");
        assert_eq!(ToolError::Unexpected("x".into()).kind(), "unexpected");
    }

    #[test]
    fn transport_errors_are_flagged() {
        assert!(Error::Http("refused".into()).is_transport());
        assert!(Error::Timeout("read".into()).is_transport());
        assert!(!Error::Recruit("nope".into()).is_transport());
    }
}
