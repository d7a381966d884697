#![forbid(unsafe_code)]
#![deny(warnings)]
#![warn(clippy::pedantic)]

use thiserror::Error;

/// Failures the engine converts into terminal session states.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Growth could not acquire a single region.
    #[error("allocation exhausted: no memory could be acquired (ceiling {ceiling_bytes} bytes)")]
    AllocationExhausted { ceiling_bytes: u64 },

    /// A region could not be read back or did not hold what was written.
    #[error("pass access failure: {0}")]
    PassAccessFailure(String),

    /// Rejected before any allocation happens.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("invalid growth policy: {0}")]
    InvalidPolicy(String),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
