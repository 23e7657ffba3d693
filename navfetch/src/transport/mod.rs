//! Transport boundary for resource fetches.
//!
//! The fetch core never talks to an HTTP client directly. It issues a
//! [`TransportRequest`] through a [`Transport`] and receives three kinds of
//! events back through [`TransportEvents`]:
//!
//! ```text
//! FetchOperation ──begin()──► Transport ──► network
//!        ▲                        │
//!        │   did_receive_response │
//!        └── did_receive_data ◄───┘
//!            did_complete
//! ```
//!
//! Events may arrive on any runtime thread. Every event carries the
//! [`TransferKey`] of the transfer that produced it so the coordinator can
//! drop events that belong to an operation it no longer tracks.

mod http;
mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use http::ReqwestTransport;
pub use types::{
    RequestPolicy, ResourceId, ResponseDisposition, ResponseHead, TransferHandle, TransferId,
    TransferKey, Transport, TransportError, TransportEvents, TransportRequest,
    DEFAULT_USER_AGENT,
};
