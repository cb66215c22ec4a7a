//! Event sources
//!
//! An event source is one streaming endpoint: a path, optional credentials and
//! the set of sessions currently subscribed to it.
//!
//! - [`EventSourceConfig`]: what the endpoint serves and how
//! - [`EventSourceResponse`]: the preamble that opens a stream
//! - [`EventSource`]: the hub that admits sessions and broadcasts to them

pub mod config;
pub mod hub;
pub mod response;

pub use config::{Credentials, EventSourceConfig};
pub use hub::{ConnectHandler, EventSource};
pub use response::EventSourceResponse;
