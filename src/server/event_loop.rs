//! Connection dispatcher
//!
//! The event loop owns every source, every session and every response still
//! being delivered. It processes one event at a time:
//!
//! ```text
//!   Request ──route──► Response::respond ──Ack…──► Complete  → close
//!                                               └► Handoff   → EventSource::admit
//!   Transport event ──► pending response, or the owning source by SessionId
//!   Command ──► source operation
//! ```
//!
//! It is generic over the transport so it can be driven without sockets.

use std::collections::HashMap;

use super::handle::{Command, SourceIndex};
use crate::http::{AckOutcome, BasicResponse, HttpRequest, Request, Response};
use crate::source::EventSource;
use crate::transport::{ConnectionEvent, SessionId, Transport, TransportEvent};

/// A connection whose response has not finished yet
struct PendingResponse<T: Transport> {
    request: HttpRequest,
    transport: T,
    response: Box<dyn Response<T>>,
    /// Source that accepted the request, if any
    route: Option<SourceIndex>,
}

/// Single-owner dispatcher for sources and connections
pub struct EventLoop<T: Transport> {
    sources: Vec<EventSource<T>>,
    pending: HashMap<SessionId, PendingResponse<T>>,
    /// Which source owns each admitted session
    owners: HashMap<SessionId, SourceIndex>,
}

impl<T: Transport> EventLoop<T> {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            pending: HashMap::new(),
            owners: HashMap::new(),
        }
    }

    /// Register a source, returning its index
    pub fn add_source(&mut self, source: EventSource<T>) -> SourceIndex {
        self.sources.push(source);
        self.sources.len() - 1
    }

    pub fn source(&self, index: SourceIndex) -> Option<&EventSource<T>> {
        self.sources.get(index)
    }

    pub fn source_mut(&mut self, index: SourceIndex) -> Option<&mut EventSource<T>> {
        self.sources.get_mut(index)
    }

    /// Connections still waiting on their response
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Dispatch one connection event
    pub fn handle_connection_event(&mut self, event: ConnectionEvent<T>) {
        match event {
            ConnectionEvent::Request {
                id,
                request,
                transport,
            } => self.handle_request(id, request, transport),
            ConnectionEvent::Transport { id, event } => self.handle_transport_event(id, event),
        }
    }

    fn handle_request(&mut self, id: SessionId, mut request: HttpRequest, mut transport: T) {
        let route = self
            .sources
            .iter()
            .position(|source| source.can_handle(&mut request));

        let mut response: Box<dyn Response<T>> = match route {
            Some(index) => self.sources[index].handle_request(&request),
            None => {
                tracing::debug!(
                    session_id = id,
                    url = request.url(),
                    "No event source for request"
                );
                Box::new(BasicResponse::not_found())
            }
        };

        response.respond(&request, &mut transport);
        self.pending.insert(
            id,
            PendingResponse {
                request,
                transport,
                response,
                route,
            },
        );
    }

    fn handle_transport_event(&mut self, id: SessionId, event: TransportEvent) {
        if let Some(&index) = self.owners.get(&id) {
            if let Some(source) = self.sources.get_mut(index) {
                source.on_transport_event(id, event);
            }
            if event == TransportEvent::Disconnect {
                self.owners.remove(&id);
            }
            return;
        }

        match event {
            TransportEvent::Ack { len, time } => self.on_pending_ack(id, len, time),
            TransportEvent::Poll => {}
            TransportEvent::Timeout { .. } => {
                if let Some(pending) = self.pending.get_mut(&id) {
                    tracing::debug!(session_id = id, "Response timed out");
                    pending.transport.close(true);
                }
            }
            TransportEvent::Disconnect => {
                if self.pending.remove(&id).is_some() {
                    tracing::debug!(session_id = id, "Connection closed before response completed");
                }
            }
        }
    }

    fn on_pending_ack(&mut self, id: SessionId, len: usize, time: std::time::Duration) {
        let Some(pending) = self.pending.get_mut(&id) else {
            return;
        };

        match pending.response.ack(&mut pending.transport, len, time) {
            AckOutcome::Pending => {}
            AckOutcome::Complete => {
                if let Some(mut pending) = self.pending.remove(&id) {
                    pending.transport.close(false);
                }
            }
            AckOutcome::Handoff => {
                let Some(pending) = self.pending.remove(&id) else {
                    return;
                };
                let PendingResponse {
                    request,
                    mut transport,
                    route,
                    ..
                } = pending;

                match route.and_then(|index| self.sources.get_mut(index).map(|s| (index, s))) {
                    Some((index, source)) => {
                        source.admit(id, &request, transport);
                        self.owners.insert(id, index);
                    }
                    None => transport.close(true),
                }
            }
        }
    }

    /// Idle poll for every admitted session
    pub fn poll(&mut self) {
        for source in &mut self.sources {
            source.poll();
        }
    }

    /// Apply a command from an [`EventSourceHandle`](super::EventSourceHandle)
    pub fn handle_command(&mut self, command: Command) {
        match command {
            Command::Send { source, frame } => {
                if let Some(source) = self.sources.get_mut(source) {
                    source.send_frame(frame);
                }
            }
            Command::Count { source, reply } => {
                let count = self.sources.get(source).map_or(0, EventSource::count);
                let _ = reply.send(count);
            }
            Command::AvgPacketsWaiting { source, reply } => {
                let avg = self
                    .sources
                    .get(source)
                    .map_or(0, EventSource::avg_packets_waiting);
                let _ = reply.send(avg);
            }
            Command::Stats { source, reply } => {
                let stats = self
                    .sources
                    .get(source)
                    .map(EventSource::stats)
                    .unwrap_or_default();
                let _ = reply.send(stats);
            }
            Command::Close { source } => {
                if let Some(source) = self.sources.get_mut(source) {
                    source.close();
                }
            }
        }
    }

    /// Close every session and every unfinished response
    pub fn close_all(&mut self) {
        for source in &mut self.sources {
            source.close();
        }
        for pending in self.pending.values_mut() {
            pending.transport.close(false);
        }
    }
}

impl<T: Transport> Default for EventLoop<T> {
    fn default() -> Self {
        Self::new()
    }
}
