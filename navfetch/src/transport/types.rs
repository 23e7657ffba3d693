//! Transport types and traits

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Default User-Agent string sent with every request.
pub const DEFAULT_USER_AGENT: &str = concat!("navfetch/", env!("CARGO_PKG_VERSION"));

/// Transport-level identifier of a remote resource (typically its URL).
///
/// Cheap to clone; used to deduplicate in-flight fetches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(Arc<str>);

impl ResourceId {
    /// Create a resource identifier from a URL string.
    pub fn new(url: impl AsRef<str>) -> Self {
        Self(Arc::from(url.as_ref()))
    }

    /// Returns the identifier as a URL string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(url: &str) -> Self {
        Self::new(url)
    }
}

impl From<String> for ResourceId {
    fn from(url: String) -> Self {
        Self::new(url)
    }
}

/// Process-unique number identifying one transfer attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransferId(u64);

static NEXT_TRANSFER_ID: AtomicU64 = AtomicU64::new(1);

impl TransferId {
    /// Allocate the next transfer id.
    pub fn next() -> Self {
        Self(NEXT_TRANSFER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value, for logging.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifies the transfer an event belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransferKey {
    pub resource: ResourceId,
    pub transfer: TransferId,
}

/// Status line and headers of interest from a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHead {
    /// HTTP status code
    pub status: u16,
    /// Content-Length, when the server sent one
    pub content_length: Option<u64>,
}

impl ResponseHead {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            content_length: None,
        }
    }

    /// Returns true for 2xx status codes.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// What the transport should do after delivering a response head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseDisposition {
    /// Continue and stream the body.
    Allow,
    /// Abort the transfer. No further events are delivered.
    Cancel,
}

/// A GET request to issue.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub key: TransferKey,
    /// Request headers, including the User-Agent from [`RequestPolicy`]
    pub headers: Vec<(String, String)>,
}

impl TransportRequest {
    /// URL to fetch.
    pub fn url(&self) -> &str {
        self.key.resource.as_str()
    }
}

/// User-Agent and default headers applied to every outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPolicy {
    pub user_agent: String,
    pub default_headers: Vec<(String, String)>,
}

impl RequestPolicy {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            default_headers: Vec::new(),
        }
    }

    /// Add a header sent with every request.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    /// Headers for a single request: User-Agent first, then the defaults.
    pub fn headers(&self) -> Vec<(String, String)> {
        let mut headers = Vec::with_capacity(self.default_headers.len() + 1);
        headers.push(("User-Agent".to_string(), self.user_agent.clone()));
        headers.extend(self.default_headers.iter().cloned());
        headers
    }
}

impl Default for RequestPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_USER_AGENT)
    }
}

/// Errors reported by a transport through `did_complete`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Connection could not be established or was reset
    #[error("connection failed: {0}")]
    Connect(String),

    /// Request or body read exceeded the configured timeout
    #[error("request timed out")]
    Timeout,

    /// Request could not be sent
    #[error("request failed: {0}")]
    Request(String),

    /// Body stream failed mid-transfer
    #[error("failed to read response body: {0}")]
    Body(String),

    /// Client could not be constructed
    #[error("failed to build transport: {0}")]
    Build(String),
}

/// Receives transport events for in-flight transfers.
///
/// Implementations must be callable from any thread.
pub trait TransportEvents: Send + Sync {
    /// A response head arrived. Returning [`ResponseDisposition::Cancel`]
    /// aborts the transfer.
    fn did_receive_response(&self, key: &TransferKey, head: ResponseHead) -> ResponseDisposition;

    /// A chunk of the body arrived.
    fn did_receive_data(&self, key: &TransferKey, chunk: Bytes);

    /// The transfer ended, successfully when `error` is `None`.
    fn did_complete(&self, key: &TransferKey, error: Option<TransportError>);
}

/// Issues GET requests and reports progress through [`TransportEvents`].
///
/// After a `Cancel` disposition, or once the returned handle is cancelled,
/// the transport must not deliver further events for that transfer.
pub trait Transport: Send + Sync {
    fn begin(&self, request: TransportRequest, events: Arc<dyn TransportEvents>) -> TransferHandle;
}

/// Handle used to abort an issued transfer.
#[derive(Debug, Clone, Default)]
pub struct TransferHandle {
    token: CancellationToken,
}

impl TransferHandle {
    pub fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Abort the transfer.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}
