//! Response contract
//!
//! Every response the dispatcher drives goes through the same small state
//! machine:
//!
//! ```text
//!   Setup ──respond()──► WaitAck ──ack()…──► End
//! ```
//!
//! `respond` writes whatever it can, `ack` is fed every acknowledgment for the
//! connection until the response reports it is done. A response may also ask
//! for the connection to be handed over to a long-lived session instead of
//! being closed.

use std::fmt::Write as _;
use std::time::Duration;

use bytes::{Buf, Bytes};

use super::request::Request;
use crate::transport::Transport;

/// Where a response is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseState {
    /// Nothing written yet
    Setup,
    /// Written, waiting for the transport to acknowledge
    WaitAck,
    /// Finished
    End,
}

/// What the dispatcher should do after feeding an acknowledgment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// Keep waiting
    Pending,
    /// Everything was delivered; close the connection
    Complete,
    /// Hand the connection over to a streaming session
    Handoff,
}

/// A response that can be driven by the dispatcher
pub trait Response<T: Transport>: Send {
    /// Current state
    fn state(&self) -> ResponseState;

    /// Start writing the response
    fn respond(&mut self, request: &dyn Request, transport: &mut T);

    /// Feed an acknowledgment of `len` bytes
    fn ack(&mut self, transport: &mut T, len: usize, time: Duration) -> AckOutcome;
}

/// Reason phrase for the status codes this crate produces
pub fn status_text(code: u16) -> &'static str {
    match code {
        200 => "OK",
        204 => "No Content",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "",
    }
}

/// Build a response head, including the terminating blank line
pub fn assemble_head<'a>(
    version: u8,
    status: u16,
    content_type: Option<&str>,
    content_length: Option<usize>,
    headers: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> String {
    let mut head = String::with_capacity(256);

    // Writing into a String cannot fail
    let _ = write!(head, "HTTP/1.{} {} {}\r\n", version, status, status_text(status));
    if let Some(content_type) = content_type {
        let _ = write!(head, "Content-Type: {}\r\n", content_type);
    }
    if let Some(len) = content_length {
        let _ = write!(head, "Content-Length: {}\r\n", len);
    }
    for (name, value) in headers {
        let _ = write!(head, "{}: {}\r\n", name, value);
    }
    head.push_str("\r\n");

    head
}

/// Fixed response with a small body, closing the connection when delivered
#[derive(Debug, Clone)]
pub struct BasicResponse {
    status: u16,
    content_type: String,
    headers: Vec<(String, String)>,
    body: Bytes,
    state: ResponseState,
    /// Head and body not yet accepted by the transport
    unsent: Bytes,
    total: usize,
    acked: usize,
}

impl BasicResponse {
    /// Create a response with a plain body
    pub fn new(status: u16, content_type: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            content_type: content_type.into(),
            headers: Vec::new(),
            body: body.into(),
            state: ResponseState::Setup,
            unsent: Bytes::new(),
            total: 0,
            acked: 0,
        }
    }

    /// `404 Not Found`
    pub fn not_found() -> Self {
        Self::new(404, "text/plain", "Not Found")
    }

    /// `401 Unauthorized` asking for Basic credentials
    pub fn challenge(realm: &str) -> Self {
        Self::new(401, "text/plain", "Unauthorized")
            .header("WWW-Authenticate", format!("Basic realm=\"{}\"", realm))
    }

    /// Add a response header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Status code
    pub fn status(&self) -> u16 {
        self.status
    }

    fn write_unsent<T: Transport>(&mut self, transport: &mut T) {
        if self.unsent.is_empty() {
            return;
        }
        let written = transport.write(&self.unsent);
        self.unsent.advance(written);
    }
}

impl<T: Transport> Response<T> for BasicResponse {
    fn state(&self) -> ResponseState {
        self.state
    }

    fn respond(&mut self, request: &dyn Request, transport: &mut T) {
        let headers = self
            .headers
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .chain(std::iter::once(("Connection", "close")));
        let head = assemble_head(
            request.version(),
            self.status,
            Some(self.content_type.as_str()),
            Some(self.body.len()),
            headers,
        );

        let mut out = Vec::with_capacity(head.len() + self.body.len());
        out.extend_from_slice(head.as_bytes());
        out.extend_from_slice(&self.body);

        self.total = out.len();
        self.unsent = Bytes::from(out);
        self.state = ResponseState::WaitAck;
        self.write_unsent(transport);
    }

    fn ack(&mut self, transport: &mut T, len: usize, _time: Duration) -> AckOutcome {
        if self.state != ResponseState::WaitAck {
            return AckOutcome::Pending;
        }

        self.acked += len;
        self.write_unsent(transport);

        if self.acked >= self.total {
            self.state = ResponseState::End;
            AckOutcome::Complete
        } else {
            AckOutcome::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpRequest;
    use crate::transport::MemoryTransport;

    fn request(version: &str) -> HttpRequest {
        HttpRequest::parse(format!("GET /missing {}\r\n\r\n", version).as_bytes()).unwrap()
    }

    #[test]
    fn test_assemble_head() {
        let head = assemble_head(
            1,
            200,
            Some("text/event-stream"),
            None,
            [("Cache-Control", "no-cache")],
        );
        assert_eq!(
            head,
            "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nCache-Control: no-cache\r\n\r\n"
        );
    }

    #[test]
    fn test_not_found_lifecycle() {
        let wire = MemoryTransport::new(1024);
        let mut transport = wire.clone();
        let mut response = BasicResponse::not_found();

        Response::<MemoryTransport>::respond(&mut response, &request("HTTP/1.0"), &mut transport);
        assert_eq!(Response::<MemoryTransport>::state(&response), ResponseState::WaitAck);

        let written = String::from_utf8(wire.written()).unwrap();
        assert!(written.starts_with("HTTP/1.0 404 Not Found\r\n"));
        assert!(written.contains("Content-Length: 9\r\n"));
        assert!(written.contains("Connection: close\r\n"));
        assert!(written.ends_with("\r\n\r\nNot Found"));

        let total = wire.acknowledge_all();
        assert_eq!(
            response.ack(&mut transport, total, Duration::ZERO),
            AckOutcome::Complete
        );
        assert_eq!(Response::<MemoryTransport>::state(&response), ResponseState::End);
    }

    #[test]
    fn test_small_window_writes_in_pieces() {
        let wire = MemoryTransport::new(16);
        let mut transport = wire.clone();
        let mut response = BasicResponse::challenge("events");

        response.respond(&request("HTTP/1.1"), &mut transport);
        assert_eq!(wire.written().len(), 16);

        let mut outcome = AckOutcome::Pending;
        while outcome == AckOutcome::Pending {
            let acked = wire.acknowledge_all();
            assert!(acked > 0);
            outcome = response.ack(&mut transport, acked, Duration::ZERO);
        }

        let written = String::from_utf8(wire.written()).unwrap();
        assert!(written.starts_with("HTTP/1.1 401 Unauthorized\r\n"));
        assert!(written.contains("WWW-Authenticate: Basic realm=\"events\"\r\n"));
        assert!(written.ends_with("Unauthorized"));
        assert_eq!(outcome, AckOutcome::Complete);
    }
}
