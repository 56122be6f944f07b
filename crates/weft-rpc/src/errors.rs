//! RPC error codes and error type.

// ── Error code constants ────────────────────────────────────────────

/// Frame is not a JSON object or has no string `method`.
pub const MALFORMED_REQUEST: &str = "MALFORMED_REQUEST";
/// `id` is present but not a non-negative integer.
pub const INVALID_IDENTIFIER: &str = "INVALID_IDENTIFIER";
/// Params are missing or do not match the method's expected shape.
pub const INVALID_PARAMS: &str = "INVALID_PARAMS";
/// Method not found in the registry.
pub const METHOD_NOT_FOUND: &str = "METHOD_NOT_FOUND";
/// The method ran and returned an application error.
pub const HANDLER_ERROR: &str = "HANDLER_ERROR";
/// A result or publish payload could not be encoded.
pub const SERIALIZATION_ERROR: &str = "SERIALIZATION_ERROR";
/// The method exceeded the configured time limit.
pub const TIMEOUT: &str = "TIMEOUT";

/// Errors reported back to a peer in an error response.
///
/// Transport failures are not listed: they end the connection and are never
/// sent to the peer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
    /// Unparseable frame or missing method.
    #[error("malformed request: {message}")]
    MalformedRequest {
        /// Description of what is wrong.
        message: String,
    },

    /// Non-numeric or out-of-range identifier.
    #[error("invalid identifier: {message}")]
    InvalidIdentifier {
        /// Description of what is wrong.
        message: String,
    },

    /// Required parameter missing or wrong type.
    #[error("invalid params: {message}")]
    InvalidParams {
        /// Description of what is wrong.
        message: String,
    },

    /// No handler registered under the requested name.
    #[error("method '{method}' not found")]
    MethodNotFound {
        /// The name the peer asked for.
        method: String,
    },

    /// Application error returned by a handler.
    #[error("{message}")]
    Handler {
        /// Human-readable message.
        message: String,
    },

    /// A value could not be encoded as JSON.
    #[error("serialization failed: {message}")]
    Serialization {
        /// Underlying encoder message.
        message: String,
    },

    /// Handler ran past the configured limit.
    #[error("handler for '{method}' timed out after {timeout_ms} ms")]
    Timeout {
        /// Method that timed out.
        method: String,
        /// Configured limit.
        timeout_ms: u64,
    },
}

impl RpcError {
    /// Machine-readable error code for this variant.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedRequest { .. } => MALFORMED_REQUEST,
            Self::InvalidIdentifier { .. } => INVALID_IDENTIFIER,
            Self::InvalidParams { .. } => INVALID_PARAMS,
            Self::MethodNotFound { .. } => METHOD_NOT_FOUND,
            Self::Handler { .. } => HANDLER_ERROR,
            Self::Serialization { .. } => SERIALIZATION_ERROR,
            Self::Timeout { .. } => TIMEOUT,
        }
    }

    /// Application error with the given message.
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler {
            message: message.into(),
        }
    }

    /// Invalid-params error with the given message.
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams {
            message: message.into(),
        }
    }

    /// Wrap an encoder failure.
    pub fn serialization(err: &serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}
