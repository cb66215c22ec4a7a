//! Minimal HTTP boundary
//!
//! Only what is needed to accept a streaming request and answer the few
//! non-streaming cases (not found, authentication challenge).

pub mod headers;
pub mod request;
pub mod response;

pub use headers::DefaultHeaders;
pub use request::{read_request_head, HttpRequest, Method, Request};
pub use response::{AckOutcome, BasicResponse, Response, ResponseState};
