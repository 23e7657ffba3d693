//! Error taxonomy for resource fetches.

use bytes::Bytes;
use thiserror::Error;

use crate::transport::TransportError;

/// Why a fetch did not produce usable bytes.
///
/// Delivered through completion callbacks, never thrown synchronously and
/// never cached.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Server answered with a failure-class status code
    #[error("server responded with status {status}")]
    Server { status: u16 },

    /// Transport-level failure (connection reset, timeout, ...)
    #[error("transport failure: {0}")]
    Client(String),

    /// Transfer succeeded but produced nothing usable
    #[error("no usable data received")]
    NoData,

    /// Operation was cancelled before it finished
    #[error("fetch cancelled")]
    Cancelled,
}

impl FetchError {
    /// Returns true for failures that a later retry may fix.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Server { status } => *status >= 500,
            FetchError::Client(_) => true,
            FetchError::NoData | FetchError::Cancelled => false,
        }
    }
}

impl From<TransportError> for FetchError {
    fn from(e: TransportError) -> Self {
        FetchError::Client(e.to_string())
    }
}

/// Outcome of a single transfer.
pub type FetchResult = Result<Bytes, FetchError>;
