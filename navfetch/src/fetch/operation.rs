//! A single in-flight retrieval of one resource.
//!
//! # Lifecycle
//!
//! ```text
//!            start()                 did_complete / server error / cancel()
//!   Ready ─────────────► Executing ─────────────────────────────────────► Finished
//!     │                                                                      ▲
//!     └──────────────────────────── cancel() ───────────────────────────────┘
//! ```
//!
//! All mutable state (lifecycle, body buffer, completion list, transfer
//! handle) sits behind one mutex. The outcome is computed exactly once while
//! that lock is held; completions run afterwards, outside the lock, in
//! registration order.

use std::sync::{Arc, Weak};

use bytes::{Bytes, BytesMut};
use parking_lot::{Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, trace, warn};

use super::error::{FetchError, FetchResult};
use super::state::OperationState;
use crate::transport::{
    RequestPolicy, ResourceId, ResponseDisposition, ResponseHead, TransferHandle, TransferId,
    TransferKey, Transport, TransportError, TransportEvents, TransportRequest,
};

/// Upper bound for buffer preallocation from Content-Length.
const MAX_PREALLOCATION: u64 = 8 * 1024 * 1024;

/// Callback receiving the outcome of a fetch.
pub type FetchCompletion = Box<dyn FnOnce(FetchResult) + Send + 'static>;

/// Invoked once when an operation reaches `Finished`, before its completions.
pub(crate) type FinishHook = Box<dyn Fn(&FetchOperation) + Send + Sync>;

struct OperationInner {
    state: OperationState,
    buffer: Option<BytesMut>,
    status: Option<u16>,
    outcome: Option<FetchResult>,
    completions: Vec<FetchCompletion>,
    transfer: Option<TransferHandle>,
}

/// One retrieval of one resource, shared by every caller waiting on it.
pub struct FetchOperation {
    key: TransferKey,
    headers: Vec<(String, String)>,
    transport: Arc<dyn Transport>,
    /// Where transport events are sent; `None` routes them to the operation itself.
    router: Option<Weak<dyn TransportEvents>>,
    on_finish: Option<FinishHook>,
    inner: Mutex<OperationInner>,
    state_tx: watch::Sender<OperationState>,
}

impl FetchOperation {
    /// Creates a standalone operation that receives its own transport events.
    pub fn new(
        resource: ResourceId,
        transport: Arc<dyn Transport>,
        policy: &RequestPolicy,
    ) -> Arc<Self> {
        Arc::new(Self::build(resource, transport, policy, None, None))
    }

    /// Creates an operation whose events are routed through a coordinator.
    pub(crate) fn routed(
        resource: ResourceId,
        transport: Arc<dyn Transport>,
        policy: &RequestPolicy,
        router: Weak<dyn TransportEvents>,
        on_finish: FinishHook,
    ) -> Arc<Self> {
        Arc::new(Self::build(
            resource,
            transport,
            policy,
            Some(router),
            Some(on_finish),
        ))
    }

    fn build(
        resource: ResourceId,
        transport: Arc<dyn Transport>,
        policy: &RequestPolicy,
        router: Option<Weak<dyn TransportEvents>>,
        on_finish: Option<FinishHook>,
    ) -> Self {
        let (state_tx, _rx) = watch::channel(OperationState::Ready);
        Self {
            key: TransferKey {
                resource,
                transfer: TransferId::next(),
            },
            headers: policy.headers(),
            transport,
            router,
            on_finish,
            inner: Mutex::new(OperationInner {
                state: OperationState::Ready,
                buffer: None,
                status: None,
                outcome: None,
                completions: Vec::new(),
                transfer: None,
            }),
            state_tx,
        }
    }

    /// Transport identifier this operation fetches.
    pub fn resource(&self) -> &ResourceId {
        &self.key.resource
    }

    pub fn transfer_id(&self) -> TransferId {
        self.key.transfer
    }

    pub fn key(&self) -> &TransferKey {
        &self.key
    }

    /// Current lifecycle state.
    pub fn state(&self) -> OperationState {
        self.inner.lock().state
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_finished()
    }

    /// Status code of the response head, once received.
    pub fn status(&self) -> Option<u16> {
        self.inner.lock().status
    }

    /// Stored outcome, once finished.
    pub fn outcome(&self) -> Option<FetchResult> {
        self.inner.lock().outcome.clone()
    }

    /// Number of completions waiting for the outcome.
    pub fn waiter_count(&self) -> usize {
        self.inner.lock().completions.len()
    }

    /// Begin the transfer.
    ///
    /// No-op unless the operation is `Ready`.
    pub fn start(self: &Arc<Self>) {
        {
            let mut inner = self.inner.lock();
            if inner.state != OperationState::Ready {
                trace!(
                    url = %self.key.resource,
                    state = %inner.state,
                    "Ignoring start of operation that is not ready"
                );
                return;
            }
            inner.state = OperationState::Executing;
        }
        self.state_tx.send_replace(OperationState::Executing);

        let events: Arc<dyn TransportEvents> =
            match self.router.as_ref().and_then(Weak::upgrade) {
                Some(router) => router,
                None => Arc::clone(self) as Arc<dyn TransportEvents>,
            };

        let request = TransportRequest {
            key: self.key.clone(),
            headers: self.headers.clone(),
        };

        debug!(url = %self.key.resource, transfer = %self.key.transfer, "Starting transfer");
        let handle = self.transport.begin(request, events);

        let mut inner = self.inner.lock();
        if inner.state.is_finished() {
            // Finished while the transport was starting (e.g. cancelled)
            drop(inner);
            handle.cancel();
        } else {
            inner.transfer = Some(handle);
        }
    }

    /// Abort the transfer and release every waiter with [`FetchError::Cancelled`].
    pub fn cancel(&self) {
        let inner = self.inner.lock();
        if inner.state.is_finished() {
            return;
        }
        debug!(url = %self.key.resource, transfer = %self.key.transfer, "Cancelling operation");
        self.finish_with(inner, Err(FetchError::Cancelled));
    }

    /// Register interest in the outcome.
    ///
    /// If the operation already finished, the completion runs immediately on
    /// the calling thread with the stored outcome.
    pub fn add_completion(&self, completion: FetchCompletion) {
        let mut inner = self.inner.lock();
        match inner.outcome.clone() {
            Some(outcome) => {
                drop(inner);
                completion(outcome);
            }
            None => inner.completions.push(completion),
        }
    }

    /// Resolve once the operation reaches `Finished`.
    pub async fn wait_finished(&self) {
        let mut rx = self.state_tx.subscribe();
        // The sender lives as long as `self`, so this cannot observe a closed channel.
        let _ = rx.wait_for(|state| state.is_finished()).await;
    }

    /// Transition to `Finished` with `outcome`, consuming the held lock.
    fn finish_with(&self, mut inner: MutexGuard<'_, OperationInner>, outcome: FetchResult) {
        if inner.state.is_finished() {
            return;
        }
        inner.state = OperationState::Finished;
        inner.buffer = None;
        inner.outcome = Some(outcome.clone());
        let completions = std::mem::take(&mut inner.completions);
        let transfer = inner.transfer.take();
        drop(inner);

        if let Some(transfer) = transfer {
            transfer.cancel();
        }
        self.state_tx.send_replace(OperationState::Finished);

        if let Some(hook) = &self.on_finish {
            hook(self);
        }

        match &outcome {
            Ok(bytes) => debug!(
                url = %self.key.resource,
                bytes = bytes.len(),
                waiters = completions.len(),
                "Operation finished"
            ),
            Err(e) => debug!(
                url = %self.key.resource,
                error = %e,
                waiters = completions.len(),
                "Operation failed"
            ),
        }

        for completion in completions {
            completion(outcome.clone());
        }
    }

    fn owns(&self, key: &TransferKey) -> bool {
        key.transfer == self.key.transfer
    }
}

impl TransportEvents for FetchOperation {
    fn did_receive_response(&self, key: &TransferKey, head: ResponseHead) -> ResponseDisposition {
        if !self.owns(key) {
            return ResponseDisposition::Cancel;
        }

        let mut inner = self.inner.lock();
        if inner.state != OperationState::Executing {
            return ResponseDisposition::Cancel;
        }
        inner.status = Some(head.status);

        if !head.is_success() {
            warn!(url = %self.key.resource, status = head.status, "HTTP error status");
            self.finish_with(inner, Err(FetchError::Server { status: head.status }));
            return ResponseDisposition::Cancel;
        }

        let capacity = head
            .content_length
            .map(|len| len.min(MAX_PREALLOCATION) as usize)
            .unwrap_or(0);
        inner.buffer = Some(BytesMut::with_capacity(capacity));
        ResponseDisposition::Allow
    }

    fn did_receive_data(&self, key: &TransferKey, chunk: Bytes) {
        if !self.owns(key) {
            return;
        }

        let mut inner = self.inner.lock();
        if inner.state != OperationState::Executing {
            return;
        }
        if let Some(buffer) = inner.buffer.as_mut() {
            buffer.extend_from_slice(&chunk);
        }
    }

    fn did_complete(&self, key: &TransferKey, error: Option<TransportError>) {
        if !self.owns(key) {
            return;
        }

        let mut inner = self.inner.lock();
        if inner.state != OperationState::Executing {
            return;
        }

        let outcome = match error {
            Some(e) => Err(FetchError::from(e)),
            None => match inner.buffer.take() {
                Some(buffer) if !buffer.is_empty() => Ok(buffer.freeze()),
                _ => Err(FetchError::NoData),
            },
        };
        self.finish_with(inner, outcome);
    }
}
