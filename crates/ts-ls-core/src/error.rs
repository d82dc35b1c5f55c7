//! The error taxonomy for the workspace orchestration core.
//!
//! Every fallible operation in `ts-ls-core` returns `Result<T, CoreError>`. The
//! dispatcher is the only place that turns a `CoreError` into a JSON-RPC error
//! object; everywhere else it is propagated with `?` or recovered locally
//! (logged and skipped) per the propagation policy in the specification.

use thiserror::Error;

/// Kinds of failure the core can produce.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A string was not a well-formed, or not a `file:`, URI.
    #[error("invalid uri: {0}")]
    InvalidUri(String),

    /// The requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// An I/O operation (disk or RPC transport) failed.
    #[error("io failed: {0}")]
    IoFailed(String),

    /// A JSON payload could not be parsed.
    #[error("parse failed: {0}")]
    ParseFailed(String),

    /// The analysis host reported a non-recoverable error.
    #[error("analyzer failed: {0}")]
    AnalyzerFailed(String),

    /// The operation was cancelled before completion.
    #[error("cancelled")]
    Cancelled,

    /// The dispatched method name is not recognised.
    #[error("method not found: {0}")]
    MethodNotFound(String),

    /// The request was malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// `initialize` was called more than once.
    #[error("already initialized")]
    AlreadyInitialized,

    /// A request arrived before `initialize` completed.
    #[error("not initialized")]
    NotInitialized,

    /// A request was cancelled by an explicit `$/cancelRequest`.
    #[error("request cancelled")]
    RequestCancelled,

    /// No `ProjectConfig` is available for the requested kind.
    #[error("no config: {0}")]
    NoConfig(String),

    /// A handler emitted a JSON-Patch operation that did not apply to its
    /// own result so far (e.g. `append` before any `replace_root`).
    #[error("invalid patch operation: {0}")]
    PatchFailed(String),
}

impl CoreError {
    /// The JSON-RPC 2.0 error code this error kind maps to.
    ///
    /// Codes below `-32000` are the reserved JSON-RPC range; the LSP-specific
    /// codes below follow the ranges the Language Server Protocol reserves
    /// for server errors.
    pub fn rpc_code(&self) -> i64 {
        match self {
            CoreError::MethodNotFound(_) => -32601,
            CoreError::InvalidRequest(_) => -32600,
            CoreError::ParseFailed(_) => -32700,
            CoreError::RequestCancelled => -32800,
            CoreError::Cancelled => -32800,
            CoreError::NotInitialized => -32002,
            CoreError::AlreadyInitialized => -32803,
            CoreError::InvalidUri(_) => -32001,
            CoreError::NotFound(_) => -32003,
            CoreError::IoFailed(_) => -32004,
            CoreError::AnalyzerFailed(_) => -32005,
            CoreError::NoConfig(_) => -32006,
            CoreError::PatchFailed(_) => -32007,
        }
    }
}

/// Convenience alias used throughout the core.
pub type CoreResult<T> = Result<T, CoreError>;
