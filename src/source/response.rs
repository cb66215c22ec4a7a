//! Stream response
//!
//! The response that opens an event stream. It only ever writes the header
//! preamble; once the transport has acknowledged that preamble it asks the
//! dispatcher to hand the connection to a [`ClientSession`](crate::session::ClientSession).
//! The acknowledgment of the head is the barrier between the HTTP response
//! lifecycle and the open-ended session lifecycle.

use std::time::Duration;

use bytes::{Buf, Bytes};

use crate::http::response::assemble_head;
use crate::http::{AckOutcome, DefaultHeaders, Request, Response, ResponseState};
use crate::protocol::constants::EVENT_STREAM_CONTENT_TYPE;
use crate::transport::Transport;

/// Fixed headers of every stream preamble
const STREAM_HEADERS: [(&str, &str); 2] = [
    ("Cache-Control", "no-cache"),
    ("Connection", "keep-alive"),
];

/// `200 OK` + `text/event-stream` preamble, no content length
#[derive(Debug, Clone)]
pub struct EventSourceResponse {
    state: ResponseState,
    headers: DefaultHeaders,
    /// Preamble bytes not yet accepted by the transport
    unsent: Bytes,
    head_len: usize,
    acked: usize,
}

impl EventSourceResponse {
    /// Create a response carrying `headers` in addition to the fixed ones
    pub fn new(headers: DefaultHeaders) -> Self {
        Self {
            state: ResponseState::Setup,
            headers,
            unsent: Bytes::new(),
            head_len: 0,
            acked: 0,
        }
    }

    fn write_unsent<T: Transport>(&mut self, transport: &mut T) {
        if !self.unsent.is_empty() {
            let written = transport.write(&self.unsent);
            self.unsent.advance(written);
        }
    }
}

impl<T: Transport> Response<T> for EventSourceResponse {
    fn state(&self) -> ResponseState {
        self.state
    }

    fn respond(&mut self, request: &dyn Request, transport: &mut T) {
        let mut headers: Vec<(&str, &str)> = STREAM_HEADERS.to_vec();
        headers.extend(self.headers.iter());

        let head = assemble_head(
            request.version(),
            200,
            Some(EVENT_STREAM_CONTENT_TYPE),
            None,
            headers,
        );

        self.head_len = head.len();
        self.unsent = Bytes::from(head);
        self.state = ResponseState::WaitAck;
        self.write_unsent(transport);
    }

    fn ack(&mut self, transport: &mut T, len: usize, _time: Duration) -> AckOutcome {
        if self.state != ResponseState::WaitAck || len == 0 {
            return AckOutcome::Pending;
        }

        self.acked += len;
        self.write_unsent(transport);

        // Any byte acknowledged after this point belongs to the session
        if self.acked >= self.head_len {
            self.state = ResponseState::End;
            AckOutcome::Handoff
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

    fn request() -> HttpRequest {
        HttpRequest::parse(b"GET /events HTTP/1.1\r\n\r\n").unwrap()
    }

    #[test]
    fn test_preamble() {
        let wire = MemoryTransport::new(1024);
        let mut transport = wire.clone();
        let mut response =
            EventSourceResponse::new(DefaultHeaders::new().with("Access-Control-Allow-Origin", "*"));

        response.respond(&request(), &mut transport);

        let written = String::from_utf8(wire.written()).unwrap();
        assert_eq!(
            written,
            "HTTP/1.1 200 OK\r\n\
             Content-Type: text/event-stream\r\n\
             Cache-Control: no-cache\r\n\
             Connection: keep-alive\r\n\
             Access-Control-Allow-Origin: *\r\n\
             \r\n"
        );
        assert!(!written.contains("Content-Length"));
        assert_eq!(Response::<MemoryTransport>::state(&response), ResponseState::WaitAck);
    }

    #[test]
    fn test_handoff_on_ack() {
        let wire = MemoryTransport::new(1024);
        let mut transport = wire.clone();
        let mut response = EventSourceResponse::new(DefaultHeaders::new());
        response.respond(&request(), &mut transport);

        assert_eq!(
            response.ack(&mut transport, 0, Duration::ZERO),
            AckOutcome::Pending
        );

        let acked = wire.acknowledge_all();
        assert_eq!(
            response.ack(&mut transport, acked, Duration::ZERO),
            AckOutcome::Handoff
        );
        assert_eq!(Response::<MemoryTransport>::state(&response), ResponseState::End);

        // Never hands off twice
        assert_eq!(
            response.ack(&mut transport, 10, Duration::ZERO),
            AckOutcome::Pending
        );
    }

    #[test]
    fn test_partial_preamble_waits_for_rest() {
        let wire = MemoryTransport::new(20);
        let mut transport = wire.clone();
        let mut response = EventSourceResponse::new(DefaultHeaders::new());
        response.respond(&request(), &mut transport);
        assert_eq!(wire.written().len(), 20);

        let mut outcome = AckOutcome::Pending;
        while outcome == AckOutcome::Pending {
            let acked = wire.acknowledge_all();
            outcome = response.ack(&mut transport, acked, Duration::ZERO);
        }

        assert_eq!(outcome, AckOutcome::Handoff);
        assert!(String::from_utf8(wire.written())
            .unwrap()
            .ends_with("Connection: keep-alive\r\n\r\n"));
    }
}
