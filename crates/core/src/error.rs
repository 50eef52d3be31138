//! Centralized error types for the bitlens workspace.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Failure category. Drives retry decisions and how the caller degrades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ErrorKind {
    ExecutableNotFound,
    InvalidConfig,
    InvalidInput,
    Timeout,
    /// The node itself reported a failure (unknown hash, height out of range, ...).
    NodeError,
    /// Output could not be understood.
    ProtocolError,
    /// The node lacks the data (pruned block, no txindex). Expected, not exceptional.
    DataUnavailable,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::ExecutableNotFound => "executable not found",
            ErrorKind::InvalidConfig => "invalid config",
            ErrorKind::InvalidInput => "invalid input",
            ErrorKind::Timeout => "timeout",
            ErrorKind::NodeError => "node error",
            ErrorKind::ProtocolError => "protocol error",
            ErrorKind::DataUnavailable => "data unavailable",
            ErrorKind::Internal => "internal error",
        };
        f.write_str(s)
    }
}

/// A failed query or derived computation.
///
/// `message` keeps the node's diagnostic text verbatim so the dispatch layer
/// can relay it. `method`/`args` identify the call when one was involved.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct QueryError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub args: Vec<String>,
    /// Numeric RPC error code reported by the node, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
}

impl QueryError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            method: None,
            args: Vec::new(),
            code: None,
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, message)
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidConfig, message)
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ProtocolError, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DataUnavailable, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Attaches the call that produced this error.
    pub fn with_call(mut self, method: &str, args: Vec<String>) -> Self {
        self.method = Some(method.to_string());
        self.args = args;
        self
    }

    pub fn with_code(mut self, code: Option<i64>) -> Self {
        self.code = code;
        self
    }

    /// Whether retrying the same call may succeed.
    ///
    /// Timeouts, refused connections and a node still warming up are
    /// transient. Everything the node answered deliberately is not.
    pub fn is_transient(&self) -> bool {
        match self.kind {
            ErrorKind::Timeout => true,
            ErrorKind::NodeError => {
                self.code == Some(RPC_IN_WARMUP)
                    || TRANSIENT_MARKERS.iter().any(|m| self.message.contains(m))
            }
            _ => false,
        }
    }
}

/// Bitcoin Core `RPC_IN_WARMUP`.
pub const RPC_IN_WARMUP: i64 = -28;

const TRANSIENT_MARKERS: &[&str] = &[
    "Could not connect to the server",
    "Connection refused",
    "Loading block index",
    "Verifying blocks",
    "Rewinding blocks",
];

pub type BitlensResult<T> = Result<T, QueryError>;
