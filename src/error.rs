//! Central error handling for the conversion pipeline.
//!
//! One enum, one variant per failure category. The public `Converter` keeps
//! the last error message around for callers that only want a string.

use thiserror::Error;

/// Result type alias used across the crate.
pub type Result<T> = std::result::Result<T, TilerError>;

/// Errors raised by the conversion pipeline.
#[derive(Error, Debug)]
pub enum TilerError {
    /// File or directory IO failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Scene-graph or metadata decoding failure.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Coordinate reference system failure.
    #[error("CRS error: {0}")]
    Crs(String),

    /// Mesh or texture codec failure. Callers treat these as recoverable
    /// and fall back to the uncompressed path.
    #[error("Codec error: {0}")]
    Codec(String),

    /// Input uses a construct the pipeline does not support.
    #[error("Unsupported: {0}")]
    Policy(String),

    /// Input exceeds a hard resource budget.
    #[error("Budget exceeded: {0}")]
    Budget(String),
}

impl TilerError {
    pub fn parse<T: ToString>(msg: T) -> Self {
        TilerError::Parse(msg.to_string())
    }

    pub fn crs<T: ToString>(msg: T) -> Self {
        TilerError::Crs(msg.to_string())
    }

    pub fn codec<T: ToString>(msg: T) -> Self {
        TilerError::Codec(msg.to_string())
    }

    pub fn policy<T: ToString>(msg: T) -> Self {
        TilerError::Policy(msg.to_string())
    }

    pub fn budget<T: ToString>(msg: T) -> Self {
        TilerError::Budget(msg.to_string())
    }
}
