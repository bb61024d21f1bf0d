//! The closed error taxonomy shared across every ChainReview crate.
//!
//! Every variant maps to exactly one primary-stream JSON-RPC error code
//! (see [`Error::wire_code`]); `Io`/`Json`/`Internal` all collapse to the
//! catch-all `-32099` since none of them names a specific, actionable
//! failure mode a caller would branch on.

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("cancelled")]
    Cancelled,

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("path escapes repository root: {0}")]
    PathEscape(String),

    #[error("allowlist violation: {0}")]
    AllowlistViolation(String),

    #[error("no such run: {0}")]
    NoSuchRun(String),

    #[error("no such finding: {0}")]
    NoSuchFinding(String),

    #[error("invalid tool arguments: {0}")]
    ToolArgs(String),

    #[error("tool failed: {0}")]
    ToolFailure(String),

    #[error("llm provider error: {0}")]
    LlmProvider(String),

    #[error("authentication missing: {0}")]
    AuthMissing(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// JSON-RPC error code for the primary stream.
    pub fn wire_code(&self) -> i32 {
        match self {
            Error::Timeout(_) => -32001,
            Error::Cancelled => -32002,
            Error::PathEscape(_) => -32003,
            Error::AllowlistViolation(_) => -32004,
            Error::NoSuchRun(_) => -32005,
            _ => -32099,
        }
    }

    pub fn human_message(&self) -> String {
        self.to_string()
    }
}
