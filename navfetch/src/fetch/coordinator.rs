//! Deduplicating owner of in-flight fetch operations.
//!
//! ```text
//! fetch(url, A) ─┐
//!                │                         ┌──────────────┐
//! fetch(url, B) ─┼──► FetchCoordinator ───►│ FetchOperation│──► Transport
//!                │     (url → operation)   └──────┬───────┘        │
//! fetch(url, C) ─┘            ▲                   │                │
//!                             └── events routed ──┴────────────────┘
//!                                 by (url, transfer id)
//! ```
//!
//! At most one unfinished operation exists per resource. A finished
//! operation leaves the map before its completions run, so a completion that
//! fetches the same URL again starts a fresh transfer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::runtime::Handle;
use tracing::{debug, info, trace, warn};

use super::limiter::FetchLimiter;
use super::operation::{FetchCompletion, FetchOperation};
use crate::transport::{
    RequestPolicy, ResourceId, ResponseDisposition, ResponseHead, TransferKey, Transport,
    TransportError, TransportEvents,
};

/// Settings for a [`FetchCoordinator`].
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// User-Agent and default headers for every request
    pub policy: RequestPolicy,
    /// Upper bound on concurrent transfers
    pub max_concurrent: usize,
}

impl CoordinatorConfig {
    pub fn new(policy: RequestPolicy, max_concurrent: usize) -> Self {
        Self {
            policy,
            max_concurrent,
        }
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            policy: RequestPolicy::default(),
            max_concurrent: FetchLimiter::with_defaults().max_concurrent(),
        }
    }
}

/// Snapshot of coordinator counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FetchStats {
    /// Calls to `fetch`
    pub total_requests: u64,
    /// Calls attached to an operation already in flight
    pub coalesced_requests: u64,
    /// Calls that created an operation
    pub new_requests: u64,
    /// Operations that finished with bytes
    pub succeeded: u64,
    /// Operations that finished with an error, including cancellation
    pub failed: u64,
}

impl FetchStats {
    /// Share of requests served by an existing operation (0.0 to 1.0).
    pub fn coalescing_ratio(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.coalesced_requests as f64 / self.total_requests as f64
        }
    }
}

/// Owns the resource → operation map and the worker pool.
pub struct FetchCoordinator {
    transport: Arc<dyn Transport>,
    policy: RequestPolicy,
    operations: DashMap<ResourceId, Arc<FetchOperation>>,
    limiter: Arc<FetchLimiter>,
    runtime: Handle,
    self_ref: Weak<FetchCoordinator>,
    total_requests: AtomicU64,
    coalesced_requests: AtomicU64,
    new_requests: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

impl FetchCoordinator {
    /// Creates a coordinator whose workers run on `runtime`.
    pub fn new(
        transport: Arc<dyn Transport>,
        config: CoordinatorConfig,
        runtime: Handle,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            transport,
            policy: config.policy,
            operations: DashMap::new(),
            limiter: Arc::new(FetchLimiter::new(config.max_concurrent)),
            runtime,
            self_ref: self_ref.clone(),
            total_requests: AtomicU64::new(0),
            coalesced_requests: AtomicU64::new(0),
            new_requests: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        })
    }

    /// Request `resource`, delivering the outcome to `completion`.
    ///
    /// Attaches to the in-flight operation for `resource` when there is one;
    /// otherwise creates an operation and queues it on the worker pool.
    pub fn fetch(&self, resource: ResourceId, completion: FetchCompletion) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        let (operation, is_new) = match self.operations.entry(resource.clone()) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_finished() {
                    // Finished but its hook has not removed it yet
                    let operation = self.make_operation(resource.clone());
                    entry.insert(Arc::clone(&operation));
                    (operation, true)
                } else {
                    (Arc::clone(entry.get()), false)
                }
            }
            Entry::Vacant(entry) => {
                let operation = self.make_operation(resource.clone());
                entry.insert(Arc::clone(&operation));
                (operation, true)
            }
        };

        if is_new {
            self.new_requests.fetch_add(1, Ordering::Relaxed);
            debug!(
                url = %resource,
                transfer = %operation.transfer_id(),
                in_flight = self.operations.len(),
                "New fetch operation"
            );
        } else {
            self.coalesced_requests.fetch_add(1, Ordering::Relaxed);
            debug!(
                url = %resource,
                transfer = %operation.transfer_id(),
                waiters = operation.waiter_count() + 1,
                "Coalescing fetch onto in-flight operation"
            );
        }

        operation.add_completion(completion);

        if is_new {
            self.enqueue(operation);
        }
    }

    /// Like [`fetch`](Self::fetch) but awaits the outcome.
    pub async fn fetch_async(&self, resource: ResourceId) -> Result<Bytes, super::FetchError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.fetch(
            resource,
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        );
        rx.await.unwrap_or(Err(super::FetchError::Cancelled))
    }

    /// The unfinished operation for `resource`, if any.
    pub fn active_operation(&self, resource: &ResourceId) -> Option<Arc<FetchOperation>> {
        self.operations
            .get(resource)
            .map(|entry| Arc::clone(entry.value()))
            .filter(|operation| !operation.is_finished())
    }

    /// Cancel the in-flight operation for `resource`.
    ///
    /// Returns false when nothing was in flight.
    pub fn cancel(&self, resource: &ResourceId) -> bool {
        match self.active_operation(resource) {
            Some(operation) => {
                operation.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every in-flight operation.
    pub fn cancel_all(&self) {
        // Collect first: finishing removes entries from the map
        let operations: Vec<_> = self
            .operations
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        if !operations.is_empty() {
            info!(count = operations.len(), "Cancelling all fetch operations");
        }
        for operation in operations {
            operation.cancel();
        }
    }

    /// Number of operations currently in the map.
    pub fn in_flight_count(&self) -> usize {
        self.operations.len()
    }

    pub fn limiter(&self) -> &FetchLimiter {
        &self.limiter
    }

    pub fn stats(&self) -> FetchStats {
        FetchStats {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            coalesced_requests: self.coalesced_requests.load(Ordering::Relaxed),
            new_requests: self.new_requests.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.stats();
        info!(
            total_requests = stats.total_requests,
            coalesced = stats.coalesced_requests,
            new_requests = stats.new_requests,
            succeeded = stats.succeeded,
            failed = stats.failed,
            in_flight = self.in_flight_count(),
            peak_concurrent = self.limiter.peak_in_flight(),
            coalescing_ratio = format!("{:.1}%", stats.coalescing_ratio() * 100.0),
            "Fetch coordinator statistics"
        );
    }

    fn make_operation(&self, resource: ResourceId) -> Arc<FetchOperation> {
        let router: Weak<dyn TransportEvents> = self.self_ref.clone();
        let coordinator = self.self_ref.clone();
        FetchOperation::routed(
            resource,
            Arc::clone(&self.transport),
            &self.policy,
            router,
            Box::new(move |operation| {
                if let Some(coordinator) = coordinator.upgrade() {
                    coordinator.on_operation_finished(operation);
                }
            }),
        )
    }

    fn enqueue(&self, operation: Arc<FetchOperation>) {
        let limiter = Arc::clone(&self.limiter);
        self.runtime.spawn(async move {
            let _permit = match limiter.acquire().await {
                Ok(permit) => permit,
                Err(_) => {
                    warn!(url = %operation.resource(), "Worker pool closed, cancelling fetch");
                    operation.cancel();
                    return;
                }
            };
            operation.start();
            operation.wait_finished().await;
        });
    }

    fn on_operation_finished(&self, operation: &FetchOperation) {
        let transfer = operation.transfer_id();
        self.operations
            .remove_if(operation.resource(), |_, current| {
                current.transfer_id() == transfer
            });

        match operation.outcome() {
            Some(Ok(_)) => self.succeeded.fetch_add(1, Ordering::Relaxed),
            _ => self.failed.fetch_add(1, Ordering::Relaxed),
        };
    }

    /// The operation owning `key`, if it is still the current one.
    fn route(&self, key: &TransferKey) -> Option<Arc<FetchOperation>> {
        let operation = self
            .operations
            .get(&key.resource)
            .map(|entry| Arc::clone(entry.value()))
            .filter(|operation| operation.transfer_id() == key.transfer);

        if operation.is_none() {
            trace!(
                url = %key.resource,
                transfer = %key.transfer,
                "Dropping event for inactive transfer"
            );
        }
        operation
    }
}

impl TransportEvents for FetchCoordinator {
    fn did_receive_response(&self, key: &TransferKey, head: ResponseHead) -> ResponseDisposition {
        match self.route(key) {
            Some(operation) => operation.did_receive_response(key, head),
            None => ResponseDisposition::Cancel,
        }
    }

    fn did_receive_data(&self, key: &TransferKey, chunk: Bytes) {
        if let Some(operation) = self.route(key) {
            operation.did_receive_data(key, chunk);
        }
    }

    fn did_complete(&self, key: &TransferKey, error: Option<TransportError>) {
        if let Some(operation) = self.route(key) {
            operation.did_complete(key, error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{FetchError, FetchResult, OperationState};
    use crate::transport::testing::{ManualTransport, Reply, StaticTransport};
    use tokio::sync::oneshot;

    const URL: &str = "https://example.com/img.png";

    fn coordinator(transport: Arc<dyn Transport>, max_concurrent: usize) -> Arc<FetchCoordinator> {
        FetchCoordinator::new(
            transport,
            CoordinatorConfig::new(RequestPolicy::default(), max_concurrent),
            Handle::current(),
        )
    }

    fn completion() -> (FetchCompletion, oneshot::Receiver<FetchResult>) {
        let (tx, rx) = oneshot::channel();
        (
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
            rx,
        )
    }

    #[tokio::test]
    async fn test_concurrent_fetches_share_one_request() {
        let transport = ManualTransport::new();
        let coordinator = coordinator(transport.clone(), 4);

        let mut receivers = Vec::new();
        for _ in 0..5 {
            let (done, rx) = completion();
            coordinator.fetch(ResourceId::new(URL), done);
            receivers.push(rx);
        }

        transport.wait_for_requests(1).await;
        assert_eq!(transport.request_count(), 1);
        transport.transfer(0).unwrap().succeed(b"image-bytes");

        for rx in receivers {
            assert_eq!(rx.await.unwrap(), Ok(Bytes::from_static(b"image-bytes")));
        }
        assert_eq!(transport.request_count(), 1);

        let stats = coordinator.stats();
        assert_eq!(stats.total_requests, 5);
        assert_eq!(stats.new_requests, 1);
        assert_eq!(stats.coalesced_requests, 4);
        assert_eq!(stats.succeeded, 1);
    }

    #[tokio::test]
    async fn test_finished_operation_is_removed() {
        let transport = ManualTransport::new();
        let coordinator = coordinator(transport.clone(), 4);
        let resource = ResourceId::new(URL);

        let (done, rx) = completion();
        coordinator.fetch(resource.clone(), done);
        assert!(coordinator.active_operation(&resource).is_some());

        transport.wait_for_requests(1).await;
        transport.transfer(0).unwrap().succeed(b"a");
        rx.await.unwrap().unwrap();

        assert!(coordinator.active_operation(&resource).is_none());
        assert_eq!(coordinator.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_refetch_after_completion_issues_new_request() {
        let transport = StaticTransport::new();
        transport.reply(URL, Reply::Body(b"first".to_vec()));
        let coordinator = coordinator(transport.clone(), 4);

        let first = coordinator.fetch_async(ResourceId::new(URL)).await;
        let second = coordinator.fetch_async(ResourceId::new(URL)).await;

        assert_eq!(first, Ok(Bytes::from_static(b"first")));
        assert_eq!(second, Ok(Bytes::from_static(b"first")));
        assert_eq!(transport.request_count(), 2);
    }

    #[tokio::test]
    async fn test_server_error_is_not_remembered() {
        let transport = StaticTransport::new();
        transport.reply(URL, Reply::Status(500));
        let coordinator = coordinator(transport.clone(), 4);

        let result = coordinator.fetch_async(ResourceId::new(URL)).await;
        assert_eq!(result, Err(FetchError::Server { status: 500 }));

        transport.reply(URL, Reply::Body(b"recovered".to_vec()));
        let result = coordinator.fetch_async(ResourceId::new(URL)).await;
        assert_eq!(result, Ok(Bytes::from_static(b"recovered")));
        assert_eq!(transport.request_count(), 2);
        assert_eq!(coordinator.stats().failed, 1);
    }

    #[tokio::test]
    async fn test_cancel_releases_waiters_and_allows_fresh_fetch() {
        let transport = ManualTransport::new();
        let coordinator = coordinator(transport.clone(), 4);
        let resource = ResourceId::new(URL);

        let (done_a, rx_a) = completion();
        let (done_b, rx_b) = completion();
        coordinator.fetch(resource.clone(), done_a);
        coordinator.fetch(resource.clone(), done_b);
        transport.wait_for_requests(1).await;
        let stale = transport.transfer(0).unwrap();

        assert!(coordinator.cancel(&resource));
        assert_eq!(rx_a.await.unwrap(), Err(FetchError::Cancelled));
        assert_eq!(rx_b.await.unwrap(), Err(FetchError::Cancelled));
        assert!(stale.handle.is_cancelled());
        assert!(!coordinator.cancel(&resource));

        let (done_c, rx_c) = completion();
        coordinator.fetch(resource.clone(), done_c);
        transport.wait_for_requests(2).await;

        // Late events from the cancelled transfer must not reach the new one
        assert_eq!(stale.respond(200), ResponseDisposition::Cancel);
        stale.data(b"stale");
        stale.complete(None);
        let fresh = coordinator.active_operation(&resource).unwrap();
        assert_eq!(fresh.state(), OperationState::Executing);

        transport.transfer(1).unwrap().succeed(b"fresh");
        assert_eq!(rx_c.await.unwrap(), Ok(Bytes::from_static(b"fresh")));
    }

    #[tokio::test]
    async fn test_completion_can_refetch_same_url() {
        let transport = StaticTransport::new();
        transport.reply(URL, Reply::Body(b"x".to_vec()));
        let coordinator = coordinator(transport.clone(), 4);

        let (tx, rx) = oneshot::channel();
        let inner = Arc::clone(&coordinator);
        coordinator.fetch(
            ResourceId::new(URL),
            Box::new(move |_| {
                let (done, inner_rx) = completion();
                inner.fetch(ResourceId::new(URL), done);
                let _ = tx.send(inner_rx);
            }),
        );

        let inner_rx = rx.await.unwrap();
        assert_eq!(inner_rx.await.unwrap(), Ok(Bytes::from_static(b"x")));
        assert_eq!(transport.request_count(), 2);
    }

    #[tokio::test]
    async fn test_worker_pool_bounds_concurrent_transfers() {
        let transport = ManualTransport::new();
        let coordinator = coordinator(transport.clone(), 1);

        let (done_a, rx_a) = completion();
        let (done_b, rx_b) = completion();
        coordinator.fetch(ResourceId::new("https://a/1"), done_a);
        coordinator.fetch(ResourceId::new("https://a/2"), done_b);

        transport.wait_for_requests(1).await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(transport.request_count(), 1);
        assert_eq!(coordinator.in_flight_count(), 2);

        transport.transfer(0).unwrap().succeed(b"1");
        rx_a.await.unwrap().unwrap();

        transport.wait_for_requests(2).await;
        transport.transfer(1).unwrap().succeed(b"2");
        rx_b.await.unwrap().unwrap();

        assert_eq!(coordinator.limiter().peak_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_cancel_all() {
        let transport = ManualTransport::new();
        let coordinator = coordinator(transport.clone(), 4);

        let (done_a, rx_a) = completion();
        let (done_b, rx_b) = completion();
        coordinator.fetch(ResourceId::new("https://a/1"), done_a);
        coordinator.fetch(ResourceId::new("https://a/2"), done_b);

        coordinator.cancel_all();

        assert_eq!(rx_a.await.unwrap(), Err(FetchError::Cancelled));
        assert_eq!(rx_b.await.unwrap(), Err(FetchError::Cancelled));
        assert_eq!(coordinator.in_flight_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_many_urls_from_many_tasks() {
        let transport = StaticTransport::new();
        for i in 0..100 {
            transport.reply(&format!("https://tiles/{i}.png"), Reply::Body(vec![i as u8 + 1]));
        }
        let coordinator = coordinator(transport.clone(), 8);

        let mut handles = Vec::new();
        for i in 0..100 {
            let coordinator = Arc::clone(&coordinator);
            handles.push(tokio::spawn(async move {
                let url = format!("https://tiles/{i}.png");
                let result = coordinator.fetch_async(ResourceId::new(url)).await;
                (i, result)
            }));
        }

        for handle in handles {
            let (i, result) = handle.await.unwrap();
            assert_eq!(result, Ok(Bytes::from(vec![i as u8 + 1])));
        }
        assert_eq!(coordinator.in_flight_count(), 0);
        assert_eq!(coordinator.stats().succeeded + coordinator.stats().coalesced_requests, 100);
    }

    #[test]
    fn test_stats_ratio() {
        let stats = FetchStats {
            total_requests: 4,
            coalesced_requests: 3,
            new_requests: 1,
            succeeded: 1,
            failed: 0,
        };
        assert!((stats.coalescing_ratio() - 0.75).abs() < 0.001);
        assert_eq!(FetchStats::default().coalescing_ratio(), 0.0);
    }
}
