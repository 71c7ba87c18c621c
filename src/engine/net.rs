//! Outbound HTTP for the consent widget.
//!
//! The widget core never performs I/O itself. It builds [`Request`]s through the
//! [`RequestClient`], queues them as [`PendingRequest`]s and is later handed a
//! [`Response`] by whoever owns a [`Transport`].

mod client;
mod request;
mod response;
mod transport;

pub use client::RequestClient;
pub use request::{PendingRequest, Request, RequestId, RequestKind};
pub use response::Response;
pub use transport::{ReqwestTransport, Transport};
