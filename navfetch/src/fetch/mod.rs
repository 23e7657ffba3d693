//! Deduplicated asynchronous fetching.
//!
//! A [`FetchCoordinator`] owns one [`FetchOperation`] per resource in flight.
//! Every caller asking for the same resource while it is in flight attaches a
//! completion to that operation, so the transport sees one request and all
//! callers receive the same [`FetchResult`].

mod coordinator;
mod error;
mod limiter;
mod operation;
mod state;

pub use coordinator::{CoordinatorConfig, FetchCoordinator, FetchStats};
pub use error::{FetchError, FetchResult};
pub use limiter::{FetchLimiter, FetchPermit, DEFAULT_CEILING, DEFAULT_SCALING_FACTOR};
pub use operation::{FetchCompletion, FetchOperation};
pub use state::OperationState;
