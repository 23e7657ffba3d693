//! Integration tests for in-flight request deduplication.
//!
//! These tests drive the coordinator through a scripted transport and verify:
//! - Concurrent requests for one URL share a single transfer
//! - Failures reach every waiter and are never cached
//! - Cancellation reports `Cancelled` and ignores the late response
//! - The worker pool bounds concurrent transfers

mod common;

use std::sync::Arc;

use bytes::Bytes;
use common::{eventually, Route, ScriptedTransport};
use futures::future::join_all;
use navfetch::fetch::{CoordinatorConfig, FetchCoordinator, FetchError};
use navfetch::transport::{RequestPolicy, ResourceId};
use tokio::runtime::Handle;

// =============================================================================
// Test Helpers
// =============================================================================

const ICON: &str = "https://tiles.test/icons/fuel.png";

fn coordinator(transport: &Arc<ScriptedTransport>, max_concurrent: usize) -> Arc<FetchCoordinator> {
    FetchCoordinator::new(
        Arc::clone(transport) as _,
        CoordinatorConfig::new(RequestPolicy::default(), max_concurrent),
        Handle::current(),
    )
}

// =============================================================================
// Integration Tests
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_share_one_transfer() {
    let transport = ScriptedTransport::new();
    transport.route(ICON, Route::Body(b"fuel-icon".to_vec()));
    transport.hold();
    let coordinator = coordinator(&transport, 8);

    let waiters: Vec<_> = (0..10)
        .map(|_| {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.fetch_async(ResourceId::new(ICON)).await })
        })
        .collect();

    eventually("all requests to register", || {
        coordinator.stats().total_requests == 10
    })
    .await;
    assert_eq!(coordinator.in_flight_count(), 1);
    transport.release();

    for result in join_all(waiters).await {
        assert_eq!(result.unwrap(), Ok(Bytes::from_static(b"fuel-icon")));
    }

    assert_eq!(transport.requests_for(ICON), 1);
    let stats = coordinator.stats();
    assert_eq!(stats.new_requests, 1);
    assert_eq!(stats.coalesced_requests, 9);
    assert_eq!(coordinator.in_flight_count(), 0);
}

#[tokio::test]
async fn failures_reach_every_waiter_and_are_not_cached() {
    let transport = ScriptedTransport::new();
    transport.route(ICON, Route::Status(503));
    transport.hold();
    let coordinator = coordinator(&transport, 4);

    let first = coordinator.fetch_async(ResourceId::new(ICON));
    let second = coordinator.fetch_async(ResourceId::new(ICON));
    transport.release();
    let (first, second) = tokio::join!(first, second);

    assert_eq!(first, Err(FetchError::Server { status: 503 }));
    assert_eq!(second, Err(FetchError::Server { status: 503 }));
    assert_eq!(transport.requests_for(ICON), 1);

    // The next call goes back to the network
    transport.route(ICON, Route::Body(b"recovered".to_vec()));
    let third = coordinator.fetch_async(ResourceId::new(ICON)).await;
    assert_eq!(third, Ok(Bytes::from_static(b"recovered")));
    assert_eq!(transport.requests_for(ICON), 2);
}

#[tokio::test]
async fn missing_resources_and_empty_bodies_are_distinguished() {
    let transport = ScriptedTransport::new();
    transport.route("https://tiles.test/empty", Route::Body(Vec::new()));
    let coordinator = coordinator(&transport, 4);

    let missing = coordinator
        .fetch_async(ResourceId::new("https://tiles.test/missing"))
        .await;
    assert_eq!(missing, Err(FetchError::Server { status: 404 }));

    let empty = coordinator
        .fetch_async(ResourceId::new("https://tiles.test/empty"))
        .await;
    assert_eq!(empty, Err(FetchError::NoData));
}

#[tokio::test]
async fn cancel_reports_cancelled_and_ignores_late_response() {
    let transport = ScriptedTransport::new();
    transport.route(ICON, Route::Body(b"late".to_vec()));
    transport.hold();
    let coordinator = coordinator(&transport, 4);

    let pending = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.fetch_async(ResourceId::new(ICON)).await })
    };
    eventually("transfer to begin", || transport.total_requests() == 1).await;

    assert!(coordinator.cancel(&ResourceId::new(ICON)));
    assert_eq!(pending.await.unwrap(), Err(FetchError::Cancelled));
    assert_eq!(coordinator.in_flight_count(), 0);

    transport.release();
    let fresh = coordinator.fetch_async(ResourceId::new(ICON)).await;
    assert_eq!(fresh, Ok(Bytes::from_static(b"late")));
    assert_eq!(transport.requests_for(ICON), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn worker_pool_bounds_concurrent_transfers() {
    let transport = ScriptedTransport::new();
    let urls: Vec<String> = (0..6)
        .map(|i| format!("https://tiles.test/shield-{}.png", i))
        .collect();
    for url in &urls {
        transport.route(url, Route::Body(url.as_bytes().to_vec()));
    }
    transport.hold();
    let coordinator = coordinator(&transport, 2);

    let waiters: Vec<_> = urls
        .iter()
        .map(|url| {
            let coordinator = Arc::clone(&coordinator);
            let url = url.clone();
            tokio::spawn(async move { coordinator.fetch_async(ResourceId::new(url)).await })
        })
        .collect();

    eventually("two transfers to start", || transport.total_requests() == 2).await;
    // Give queued operations a chance to (wrongly) start
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(transport.total_requests(), 2);
    assert_eq!(coordinator.limiter().in_flight(), 2);
    assert_eq!(coordinator.in_flight_count(), 6);

    transport.release();
    for (result, url) in join_all(waiters).await.into_iter().zip(&urls) {
        assert_eq!(result.unwrap(), Ok(Bytes::from(url.clone().into_bytes())));
    }

    assert_eq!(transport.total_requests(), 6);
    assert!(coordinator.limiter().peak_in_flight() <= 2);
    assert_eq!(coordinator.limiter().in_flight(), 0);
}

#[tokio::test]
async fn cancel_all_drains_the_table() {
    let transport = ScriptedTransport::new();
    transport.hold();
    let coordinator = coordinator(&transport, 4);

    let waiters: Vec<_> = (0..3)
        .map(|i| {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move {
                coordinator
                    .fetch_async(ResourceId::new(format!("https://tiles.test/{}", i)))
                    .await
            })
        })
        .collect();
    eventually("operations to register", || coordinator.in_flight_count() == 3).await;

    coordinator.cancel_all();

    for result in join_all(waiters).await {
        assert_eq!(result.unwrap(), Err(FetchError::Cancelled));
    }
    assert_eq!(coordinator.in_flight_count(), 0);
}
