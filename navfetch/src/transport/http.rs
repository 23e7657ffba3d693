//! reqwest-backed transport

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::types::{
    ResponseDisposition, ResponseHead, TransferHandle, Transport, TransportError, TransportEvents,
    TransportRequest,
};

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Async HTTP transport using reqwest.
///
/// Each transfer runs as a task on the runtime the transport was created in.
/// The body is streamed chunk by chunk into [`TransportEvents::did_receive_data`].
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    runtime: Handle,
}

impl ReqwestTransport {
    /// Creates a transport with the default 30s timeout.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new() -> Result<Self, TransportError> {
        Self::with_timeout(DEFAULT_TIMEOUT_SECS)
    }

    /// Creates a transport with a custom timeout.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn with_timeout(timeout_secs: u64) -> Result<Self, TransportError> {
        let runtime = Handle::try_current()
            .map_err(|e| TransportError::Build(format!("no tokio runtime: {}", e)))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .pool_max_idle_per_host(16)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| TransportError::Build(e.to_string()))?;

        Ok(Self { client, runtime })
    }

    async fn run(
        client: reqwest::Client,
        request: TransportRequest,
        events: Arc<dyn TransportEvents>,
    ) {
        let key = request.key.clone();
        trace!(url = request.url(), transfer = %key.transfer, "HTTP GET request starting");

        let mut builder = client.get(request.url());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let mut response = match builder.send().await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(
                    url = request.url(),
                    error = %e,
                    is_connect = e.is_connect(),
                    is_timeout = e.is_timeout(),
                    "HTTP request failed"
                );
                events.did_complete(&key, Some(classify(&e)));
                return;
            }
        };

        let head = ResponseHead {
            status: response.status().as_u16(),
            content_length: response.content_length(),
        };
        debug!(url = request.url(), status = head.status, "HTTP response received");

        if events.did_receive_response(&key, head) == ResponseDisposition::Cancel {
            trace!(url = request.url(), "Transfer cancelled after response head");
            return;
        }

        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => events.did_receive_data(&key, chunk),
                Ok(None) => {
                    events.did_complete(&key, None);
                    return;
                }
                Err(e) => {
                    warn!(url = request.url(), error = %e, "Failed to read response body");
                    let error = if e.is_timeout() {
                        TransportError::Timeout
                    } else {
                        TransportError::Body(e.to_string())
                    };
                    events.did_complete(&key, Some(error));
                    return;
                }
            }
        }
    }
}

fn classify(e: &reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else if e.is_connect() {
        TransportError::Connect(e.to_string())
    } else {
        TransportError::Request(e.to_string())
    }
}

impl Transport for ReqwestTransport {
    fn begin(&self, request: TransportRequest, events: Arc<dyn TransportEvents>) -> TransferHandle {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let client = self.client.clone();

        self.runtime.spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {
                    trace!("Transfer task stopped by cancellation");
                }
                _ = Self::run(client, request, events) => {}
            }
        });

        TransferHandle::new(token)
    }
}
