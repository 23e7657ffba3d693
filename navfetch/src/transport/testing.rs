//! Test transports shared by unit tests across the crate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use super::types::{
    ResponseDisposition, ResponseHead, TransferHandle, TransferKey, Transport, TransportError,
    TransportEvents, TransportRequest,
};

/// A transfer captured by [`ManualTransport`], driven by the test.
#[derive(Clone)]
pub struct PendingTransfer {
    pub request: TransportRequest,
    pub events: Arc<dyn TransportEvents>,
    pub handle: TransferHandle,
}

impl PendingTransfer {
    pub fn key(&self) -> &TransferKey {
        &self.request.key
    }

    pub fn respond(&self, status: u16) -> ResponseDisposition {
        self.events
            .did_receive_response(self.key(), ResponseHead::new(status))
    }

    pub fn data(&self, chunk: &[u8]) {
        self.events
            .did_receive_data(self.key(), Bytes::copy_from_slice(chunk));
    }

    pub fn complete(&self, error: Option<TransportError>) {
        self.events.did_complete(self.key(), error);
    }

    /// 200 response with the whole body in one chunk.
    pub fn succeed(&self, body: &[u8]) {
        if self.respond(200) == ResponseDisposition::Allow {
            self.data(body);
            self.complete(None);
        }
    }
}

/// Transport that records requests and never talks to the network.
#[derive(Default)]
pub struct ManualTransport {
    transfers: Mutex<Vec<PendingTransfer>>,
}

impl ManualTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn request_count(&self) -> usize {
        self.transfers.lock().len()
    }

    pub fn transfer(&self, index: usize) -> Option<PendingTransfer> {
        self.transfers.lock().get(index).cloned()
    }

    /// Most recent transfer issued for a URL.
    pub fn latest_for(&self, url: &str) -> Option<PendingTransfer> {
        self.transfers
            .lock()
            .iter()
            .rev()
            .find(|t| t.request.url() == url)
            .cloned()
    }

    /// Wait until at least `count` transfers have been issued.
    pub async fn wait_for_requests(&self, count: usize) {
        for _ in 0..500 {
            if self.request_count() >= count {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
        panic!(
            "expected {} transfers, saw {}",
            count,
            self.request_count()
        );
    }
}

impl Transport for ManualTransport {
    fn begin(&self, request: TransportRequest, events: Arc<dyn TransportEvents>) -> TransferHandle {
        let handle = TransferHandle::default();
        self.transfers.lock().push(PendingTransfer {
            request,
            events,
            handle: handle.clone(),
        });
        handle
    }
}

/// Scripted reply for [`StaticTransport`].
#[derive(Clone)]
pub enum Reply {
    Body(Vec<u8>),
    Status(u16),
    Fail(TransportError),
}

/// Transport that answers immediately from a URL → reply table.
#[derive(Default)]
pub struct StaticTransport {
    replies: Mutex<HashMap<String, Reply>>,
    requests: AtomicUsize,
}

impl StaticTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, url: &str, reply: Reply) {
        self.replies.lock().insert(url.to_string(), reply);
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl Transport for StaticTransport {
    fn begin(&self, request: TransportRequest, events: Arc<dyn TransportEvents>) -> TransferHandle {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .replies
            .lock()
            .get(request.url())
            .cloned()
            .unwrap_or(Reply::Status(404));
        let key = request.key.clone();

        tokio::spawn(async move {
            match reply {
                Reply::Body(body) => {
                    if events.did_receive_response(&key, ResponseHead::new(200))
                        == ResponseDisposition::Allow
                    {
                        events.did_receive_data(&key, Bytes::from(body));
                        events.did_complete(&key, None);
                    }
                }
                Reply::Status(status) => {
                    if events.did_receive_response(&key, ResponseHead::new(status))
                        == ResponseDisposition::Allow
                    {
                        events.did_complete(&key, None);
                    }
                }
                Reply::Fail(error) => events.did_complete(&key, Some(error)),
            }
        });

        TransferHandle::default()
    }
}
