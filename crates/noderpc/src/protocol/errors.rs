//! Error types for request parsing and command dispatch.
//!
//! [`DispatchError`] is the internal taxonomy raised by the engine. Every
//! variant maps onto a numeric RPC code and a message via
//! [`DispatchError::to_rpc_error`], so no raw internal fault crosses the wire
//! untranslated. [`RpcError`] is the wire shape shared with command handlers.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::validate::TypeMismatch;

/// Invalid JSON was received.
pub const RPC_PARSE_ERROR: i32 = -32700;
/// The JSON sent is not a valid request object.
pub const RPC_INVALID_REQUEST: i32 = -32600;
/// The method does not exist.
pub const RPC_METHOD_NOT_FOUND: i32 = -32601;
/// Invalid method parameters.
pub const RPC_INVALID_PARAMS: i32 = -32602;
/// Internal error.
pub const RPC_INTERNAL_ERROR: i32 = -32603;
/// The async job queue refused a submission.
pub const RPC_QUEUE_FULL: i32 = -32001;
/// The server is shutting down.
pub const RPC_SHUTTING_DOWN: i32 = -32002;

/// Generic application error.
pub const RPC_MISC_ERROR: i32 = -1;
/// Command disallowed while the node runs in safe mode.
pub const RPC_FORBIDDEN_BY_SAFE_MODE: i32 = -2;
/// Unexpected type passed as parameter.
pub const RPC_TYPE_ERROR: i32 = -3;
/// Invalid address or key.
pub const RPC_INVALID_ADDRESS_OR_KEY: i32 = -5;
/// Ran out of memory during operation.
pub const RPC_OUT_OF_MEMORY: i32 = -7;
/// Invalid, missing or duplicate parameter.
pub const RPC_INVALID_PARAMETER: i32 = -8;
/// Database error.
pub const RPC_DATABASE_ERROR: i32 = -20;
/// Error parsing or validating structure in raw format.
pub const RPC_DESERIALIZATION_ERROR: i32 = -22;
/// General error during transaction or block submission.
pub const RPC_VERIFY_ERROR: i32 = -25;
/// Client still warming up.
pub const RPC_IN_WARMUP: i32 = -28;

/// Structured error returned to clients and raised by command handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{message} (code {code})")]
pub struct RpcError {
    /// Numeric RPC error code.
    pub code: i32,
    /// Human-readable description.
    pub message: String,
}

impl RpcError {
    /// Creates an error with an explicit code.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Creates an invalid parameter error (`-8`).
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::new(RPC_INVALID_PARAMETER, message)
    }

    /// Creates a type error (`-3`).
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(RPC_TYPE_ERROR, message)
    }

    /// Creates a generic application error (`-1`).
    pub fn misc(message: impl Into<String>) -> Self {
        Self::new(RPC_MISC_ERROR, message)
    }

    /// Creates an internal error (`-32603`).
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(RPC_INTERNAL_ERROR, message)
    }
}

/// Errors surfaced while parsing and dispatching requests.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The request envelope does not have the expected shape.
    #[error("{message}")]
    Parse { message: String },

    /// The request body is not valid JSON.
    #[error("Parse error: {message}")]
    MalformedJson {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// A request line exceeds the transport's size limit.
    #[error("request too large: {size} bytes exceeds the {max_size} byte limit")]
    RequestTooLarge { size: usize, max_size: usize },

    /// A parameter failed type validation.
    #[error(transparent)]
    TypeMismatch(#[from] TypeMismatch),

    /// No command is registered under the requested name.
    #[error("Method not found: {method}")]
    MethodNotFound { method: String },

    /// The command is disabled while the node runs in safe mode.
    #[error("Safe mode: {method} is disabled while the node is in safe mode")]
    SafeMode { method: String },

    /// The node has not finished warming up.
    #[error("RPC server warming up: {status}")]
    Warmup { status: String },

    /// No timer driver is registered.
    #[error("no timer driver registered")]
    NoTimerDriver,

    /// The async job backlog is full.
    #[error("async job queue is full ({backlog} jobs queued)")]
    QueueFull { backlog: usize },

    /// The job id is not known to the queue.
    #[error("unknown job id: {id}")]
    UnknownJob { id: String },

    /// The server is shutting down and refuses new work.
    #[error("RPC server is shutting down")]
    ShuttingDown,

    /// A command handler or pre-command hook returned a structured error.
    #[error("{0}")]
    Command(RpcError),

    /// Internal error (e.g., lock poisoned).
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl DispatchError {
    /// Returns the numeric RPC code for this error.
    pub fn code(&self) -> i32 {
        match self {
            Self::Parse { .. } | Self::RequestTooLarge { .. } => RPC_INVALID_REQUEST,
            Self::MalformedJson { .. } => RPC_PARSE_ERROR,
            Self::TypeMismatch(_) => RPC_TYPE_ERROR,
            Self::MethodNotFound { .. } => RPC_METHOD_NOT_FOUND,
            Self::SafeMode { .. } => RPC_FORBIDDEN_BY_SAFE_MODE,
            Self::Warmup { .. } => RPC_IN_WARMUP,
            Self::QueueFull { .. } => RPC_QUEUE_FULL,
            Self::UnknownJob { .. } => RPC_INVALID_PARAMETER,
            Self::ShuttingDown => RPC_SHUTTING_DOWN,
            Self::Command(error) => error.code,
            Self::NoTimerDriver | Self::Internal { .. } => RPC_INTERNAL_ERROR,
        }
    }

    /// Translates the error into its wire representation.
    pub fn to_rpc_error(&self) -> RpcError {
        match self {
            Self::Command(error) => error.clone(),
            Self::MethodNotFound { .. } => RpcError::new(self.code(), "Method not found"),
            Self::Warmup { status } if status.is_empty() => {
                RpcError::new(self.code(), "RPC server warming up")
            }
            Self::Warmup { status } => RpcError::new(self.code(), status.clone()),
            _ => RpcError::new(self.code(), self.to_string()),
        }
    }

    /// Creates an envelope parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Creates a malformed JSON error from a serde error.
    pub fn from_json_error(source: serde_json::Error) -> Self {
        Self::MalformedJson {
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Creates a request size limit error.
    pub fn request_too_large(size: usize, max_size: usize) -> Self {
        Self::RequestTooLarge { size, max_size }
    }

    /// Creates a method not found error.
    pub fn method_not_found(method: impl Into<String>) -> Self {
        Self::MethodNotFound {
            method: method.into(),
        }
    }

    /// Creates a safe mode error.
    pub fn safe_mode(method: impl Into<String>) -> Self {
        Self::SafeMode {
            method: method.into(),
        }
    }

    /// Creates a warmup error carrying the current status message.
    pub fn warmup(status: impl Into<String>) -> Self {
        Self::Warmup {
            status: status.into(),
        }
    }

    /// Creates an unknown job error.
    pub fn unknown_job(id: impl Into<String>) -> Self {
        Self::UnknownJob { id: id.into() }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<RpcError> for DispatchError {
    fn from(error: RpcError) -> Self {
        Self::Command(error)
    }
}
