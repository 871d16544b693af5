use crate::severity::Severity;
use thiserror::Error;

/// Errors produced while generating, posting and judging an operation chain.
///
/// Every terminal path of a chain run ends in one of these variants. The
/// binary maps them onto a process exit status with [`ChainError::exit_code`];
/// nothing inside the library terminates the process.
#[derive(Error, Debug)]
pub enum ChainError {
    /// No loaded schema binding declares the operation.
    #[error("Operation '{operation}' is not available in the loaded SOMA/AMP schemas")]
    SchemaNotFound { operation: String },

    /// The bound document rejected a value, or a source file could not be read.
    #[error("Failed to generate '{operation}': {message}")]
    Generation { operation: String, message: String },

    /// Network or TLS failure talking to the appliance.
    ///
    /// The executor converts this into a synthetic `HttpErrorResponse`
    /// document so it flows through classification like any other response.
    #[error("Transport failure: {message}")]
    Transport {
        /// HTTP status code, when the appliance answered with a non-success status.
        status: Option<u16>,
        message: String,
    },

    /// Low-level HTTP client failure (connection refused, TLS handshake, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The response could not be parsed into a severity and message.
    #[error("Failed to parse response for '{operation}': {message}")]
    Classification { operation: String, message: String },

    /// A structurally valid response reported a failure.
    #[error("{operation} returned {severity}: {message}")]
    ResponseSeverity {
        operation: String,
        severity: Severity,
        message: String,
    },

    /// A poll predicate was not met within its time budget.
    #[error("Failed to receive {condition} response within {wait_seconds} seconds")]
    PollTimeout {
        operation: String,
        condition: String,
        wait_seconds: u64,
    },

    /// `waitForXPath` did not compile as a structural query.
    #[error("Failed to validate XPath expression '{expression}': {message}")]
    PollPredicateInvalid { expression: String, message: String },

    /// A fatal response was rolled back to the checkpoint successfully.
    #[error("{operation} failed; rolled back to checkpoint {checkpoint}: {message}")]
    RolledBack {
        operation: String,
        checkpoint: String,
        message: String,
    },

    /// A fatal response could not be rolled back. The checkpoint is left in
    /// place on the appliance for manual recovery.
    #[error("{operation} failed and rollback to checkpoint {checkpoint} was unsuccessful: {message}")]
    RollbackFailure {
        operation: String,
        checkpoint: String,
        message: String,
    },

    /// The run was cancelled via the session cancellation token.
    #[error("Chain execution was cancelled")]
    Cancelled,

    /// Invalid configuration detected before or during execution.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Malformed XML handed to the tree parser.
    #[error("XML error: {0}")]
    Xml(String),

    /// Local file I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChainError {
    /// Process exit status for this error: `2` when the chain was rolled back
    /// successfully, `1` for every other unrecoverable failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            ChainError::RolledBack { .. } => 2,
            _ => 1,
        }
    }

    /// Shorthand for a [`ChainError::Generation`].
    pub fn generation(operation: impl Into<String>, message: impl Into<String>) -> Self {
        ChainError::Generation {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for ChainError {
    fn from(err: anyhow::Error) -> Self {
        ChainError::InvalidConfig(err.to_string())
    }
}

impl From<serde_yaml::Error> for ChainError {
    fn from(err: serde_yaml::Error) -> Self {
        ChainError::InvalidConfig(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ChainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rolled_back_exits_two() {
        let err = ChainError::RolledBack {
            operation: "do-import".into(),
            checkpoint: "CP20240101120000".into(),
            message: "import failed".into(),
        };
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_other_errors_exit_one() {
        let errors = vec![
            ChainError::SchemaNotFound {
                operation: "no-such-op".into(),
            },
            ChainError::RollbackFailure {
                operation: "do-import".into(),
                checkpoint: "CP1".into(),
                message: "boom".into(),
            },
            ChainError::Cancelled,
            ChainError::PollTimeout {
                operation: "get-status".into(),
                condition: "the required 'up'".into(),
                wait_seconds: 5,
            },
        ];
        for err in errors {
            assert_eq!(err.exit_code(), 1, "{err}");
        }
    }

    #[test]
    fn test_display_names_operation() {
        let err = ChainError::generation("set-file", "cannot read /tmp/x");
        assert_eq!(err.to_string(), "Failed to generate 'set-file': cannot read /tmp/x");
    }
}
