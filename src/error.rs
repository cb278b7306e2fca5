use std::io;

use crate::debugger::status::Status;
use crate::platform::SourceKind;

/// Errors raised by the debugger control core
///
/// Only the execution controller turns these into status transitions; every
/// other component hands them back to its caller.
#[derive(Debug, thiserror::Error)]
pub enum DebugError {
    // --------------------------------- session errors --------------------------------------------
    /// Any operation attempted before the endpoint handshake, or after the process ended
    #[error("debugger not started")]
    NotStarted,
    /// The debugger binary could not be spawned
    #[error("failed to spawn debugger `{binary}`: {source}")]
    SpawnFailed {
        binary: String,
        #[source]
        source: io::Error,
    },
    /// The debugger output closed before it announced its API endpoint
    #[error("debugger output closed before the API endpoint was announced")]
    HandshakeMissing,
    /// The continue stream closed without a final stop
    #[error("continue stream closed unexpectedly")]
    StreamClosed,

    // --------------------------------- backend errors --------------------------------------------
    /// The backend answered a request with an error
    #[error("{method}: {message}")]
    Rpc { method: String, message: String },
    /// A value returned by the backend could not be decoded
    #[error("malformed value: {0}")]
    Decode(String),
    /// The backend refused to create a breakpoint
    #[error("breakpoint {path}:{line} rejected: {message}")]
    BreakCreateFailed {
        path: String,
        line: u32,
        message: String,
    },
    /// The backend rejected an expression
    #[error("invalid expression `{expr}`: {message}")]
    InvalidExpr { expr: String, message: String },
    /// The backend does not offer the requested capability
    #[error("capability `{0}` is not supported by this backend")]
    Unsupported(&'static str),

    // --------------------------------- controller errors -----------------------------------------
    /// A command was issued in a state that does not allow it
    #[error("cannot {op} while {status}")]
    InvalidState { op: &'static str, status: Status },
    /// No desired breakpoint exists at the given location
    #[error("no breakpoint at {0}:{1}")]
    NoBreakpoint(String, u32),
    /// Frame index outside of the current stack
    #[error("frame {0} out of range")]
    FrameOutOfRange(usize),
    /// No backend registered for a source kind
    #[error("no debugger backend registered for {0}")]
    NoBackend(SourceKind),

    // --------------------------------- generic errors --------------------------------------------
    #[error("config: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl DebugError {
    /// Build an RPC error for a method
    pub fn rpc(method: &str, message: impl Into<String>) -> Self {
        Self::Rpc {
            method: method.to_string(),
            message: message.into(),
        }
    }

    /// Check whether the error means the session is gone or never existed
    pub fn is_not_started(&self) -> bool {
        matches!(self, Self::NotStarted | Self::HandshakeMissing)
    }
}

impl From<toml::de::Error> for DebugError {
    fn from(e: toml::de::Error) -> Self {
        Self::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DebugError>;
