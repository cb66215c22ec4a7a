//! Error types
//!
//! Errors surfaced by the server boundary. The streaming core itself never
//! returns errors: overflow, timeouts and disconnects are contained per session.

use thiserror::Error;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug, Error)]
pub enum Error {
    /// Socket level failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The request head could not be read or parsed
    #[error("request error: {0}")]
    Request(#[from] RequestError),

    /// An operation did not complete in time
    #[error("operation timed out")]
    Timeout,

    /// The server event loop is no longer running
    #[error("server event loop closed")]
    ServerClosed,
}

/// Failures while reading a request head
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// Head exceeded the configured limit before `\r\n\r\n` was seen
    #[error("request head exceeds {0} bytes")]
    HeadTooLarge(usize),

    /// Peer closed the connection before the head was complete
    #[error("connection closed before request head was complete")]
    Incomplete,

    /// Request line is not `METHOD PATH HTTP/1.x`
    #[error("malformed request line: {0}")]
    BadRequestLine(String),

    /// Method token is not one we recognise
    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),

    /// Header line without a colon
    #[error("malformed header line: {0}")]
    BadHeader(String),

    /// Head is not valid UTF-8
    #[error("request head is not valid UTF-8")]
    InvalidEncoding,
}
