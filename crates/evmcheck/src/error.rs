//! Error types for the upgrade checker.
//!
//! Only [`SetupError`] aborts a run. Everything that can go wrong inside a
//! single probe is folded into a [`ProbeFailure`](crate::types::ProbeFailure)
//! and reported as a failed check.

/// Structured RPC error types for programmatic handling.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Connection to {url} failed: {cause}")]
    ConnectionFailed { url: String, cause: String },

    #[error("{method} timed out after {elapsed_ms}ms")]
    Timeout { method: String, elapsed_ms: u64 },

    #[error("{method} HTTP {status}: {body}")]
    HttpError {
        method: String,
        status: u16,
        body: String,
    },

    #[error("{method} JSON-RPC error {code}: {message}")]
    JsonRpcError {
        method: String,
        code: i64,
        message: String,
    },

    #[error("{method} response parse error in {field}: {cause}")]
    ParseError {
        method: String,
        field: String,
        cause: String,
    },

    #[error("deadline exceeded during {operation}")]
    DeadlineExceeded { operation: String },
}

impl ClientError {
    pub(crate) fn parse(method: &str, field: &str, cause: impl Into<String>) -> Self {
        ClientError::ParseError {
            method: method.into(),
            field: field.into(),
            cause: cause.into(),
        }
    }

    /// The node-reported message, without the method/code decoration.
    ///
    /// Used for classification so that the method name never influences
    /// the outcome.
    pub fn node_message(&self) -> String {
        match self {
            ClientError::JsonRpcError { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Failures while assembling probe bytecode.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BytecodeError {
    #[error("runtime too long: {0} bytes (max 255)")]
    RuntimeTooLong(usize),

    #[error("CREATE2 child init code is empty")]
    EmptyChildInit,

    #[error("CREATE2 child init code too long: {0} bytes (max 255)")]
    ChildInitTooLong(usize),

    #[error("CREATE2 child init offset {0} does not fit in one byte")]
    ChildOffsetTooLarge(usize),
}

#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    #[error("invalid secret key: {0}")]
    InvalidKey(#[from] secp256k1::Error),

    #[error("failed to convert recovery id {0}")]
    RecoveryId(i32),
}

/// Errors that make the whole run impossible.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("Failed to get latest block: {0}")]
    LatestHeader(ClientError),

    #[error("Failed to build probes: {0}")]
    Bytecode(#[from] BytecodeError),
}
