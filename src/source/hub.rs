//! Broadcast hub
//!
//! An [`EventSource`] owns every live session of one streaming endpoint. It
//! decides whether it handles a request, admits sessions once their stream
//! preamble is acknowledged, fans events out and drops sessions when their
//! transport goes away.
//!
//! Transport notifications reach sessions through the hub, addressed by
//! [`SessionId`]; sessions never point back at the hub.

use std::collections::HashMap;

use bytes::Bytes;

use super::config::EventSourceConfig;
use super::response::EventSourceResponse;
use crate::http::{BasicResponse, Method, Request, Response};
use crate::protocol::constants::LAST_EVENT_ID_HEADER;
use crate::protocol::encode_event;
use crate::session::ClientSession;
use crate::stats::SourceStats;
use crate::transport::{SessionId, Transport, TransportEvent};

/// Callback run once for every newly admitted session
pub type ConnectHandler<T> = Box<dyn FnMut(&mut ClientSession<T>) + Send>;

/// All sessions of one streaming endpoint
pub struct EventSource<T: Transport> {
    config: EventSourceConfig,
    clients: HashMap<SessionId, ClientSession<T>>,
    on_connect: Option<ConnectHandler<T>>,
    stats: SourceStats,
}

impl<T: Transport> EventSource<T> {
    /// Create an empty source
    pub fn new(config: EventSourceConfig) -> Self {
        Self {
            config,
            clients: HashMap::new(),
            on_connect: None,
            stats: SourceStats::new(),
        }
    }

    /// Run `handler` for every new session, typically to push a greeting
    pub fn on_connect<F>(&mut self, handler: F)
    where
        F: FnMut(&mut ClientSession<T>) + Send + 'static,
    {
        self.on_connect = Some(Box::new(handler));
    }

    /// Endpoint path
    pub fn path(&self) -> &str {
        &self.config.path
    }

    pub fn config(&self) -> &EventSourceConfig {
        &self.config
    }

    /// Whether this source serves `request`
    ///
    /// Declares interest in `Last-Event-ID` so the header survives until the
    /// session is built.
    pub fn can_handle(&self, request: &mut dyn Request) -> bool {
        if request.method() != Method::Get || request.url() != self.config.path {
            return false;
        }

        request.add_interesting_header(LAST_EVENT_ID_HEADER);
        true
    }

    /// Produce the response for a request this source accepted
    pub fn handle_request(&self, request: &dyn Request) -> Box<dyn Response<T>> {
        if let Some(credentials) = &self.config.credentials {
            if !request.authenticate(&credentials.username, &credentials.password) {
                tracing::debug!(path = %self.config.path, "Authentication required");
                return Box::new(BasicResponse::challenge(&self.config.realm));
            }
        }

        Box::new(EventSourceResponse::new(self.config.default_headers.clone()))
    }

    /// Build a session for an acknowledged stream and register it
    pub fn admit(&mut self, id: SessionId, request: &dyn Request, transport: T) {
        let session = ClientSession::new(id, request, transport)
            .with_max_queued(self.config.max_queued_messages);
        self.add_client(session);
    }

    /// Register a session and run the connect handler
    ///
    /// A session already registered under the same id is closed and replaced.
    pub fn add_client(&mut self, session: ClientSession<T>) {
        let id = session.id();

        tracing::info!(
            path = %self.config.path,
            session_id = id,
            last_id = session.last_id(),
            "Client connected"
        );

        self.stats.sessions_admitted += 1;
        if let Some(mut replaced) = self.clients.insert(id, session) {
            tracing::warn!(
                path = %self.config.path,
                session_id = id,
                "Replacing session with duplicate id"
            );
            replaced.close();
            self.stats.sessions_disconnected += 1;
        }

        if let (Some(handler), Some(session)) = (self.on_connect.as_mut(), self.clients.get_mut(&id)) {
            handler(session);
        }
    }

    /// Forget a session; no-op if it is not registered
    pub fn handle_disconnect(&mut self, id: SessionId) -> bool {
        if self.clients.remove(&id).is_none() {
            return false;
        }

        self.stats.sessions_disconnected += 1;
        tracing::info!(
            path = %self.config.path,
            session_id = id,
            remaining = self.clients.len(),
            "Client disconnected"
        );
        true
    }

    /// Deliver a transport notification to the addressed session
    ///
    /// Returns false when no such session is registered.
    pub fn on_transport_event(&mut self, id: SessionId, event: TransportEvent) -> bool {
        let Some(session) = self.clients.get_mut(&id) else {
            return false;
        };

        session.handle_event(event);
        if event == TransportEvent::Disconnect {
            self.handle_disconnect(id);
        }
        true
    }

    /// Idle poll for every session
    pub fn poll(&mut self) {
        for session in self.clients.values_mut() {
            session.on_poll();
        }
    }

    /// Encode one event and queue it for every connected session
    pub fn send(&mut self, message: &str, event: Option<&str>, id: u32, retry: u32) {
        self.send_frame(encode_event(message, event, id, retry));
    }

    /// Queue an already encoded frame for every connected session
    ///
    /// The frame allocation is shared; each session tracks its own progress.
    pub fn send_frame(&mut self, frame: Bytes) {
        self.stats.events_sent += 1;

        for session in self.clients.values_mut() {
            if session.connected() {
                session.write(frame.clone());
            }
        }
    }

    /// Number of connected sessions
    pub fn count(&self) -> usize {
        self.clients
            .values()
            .filter(|session| session.connected())
            .count()
    }

    /// Rounded mean queue depth over connected sessions, 0 with none connected
    pub fn avg_packets_waiting(&self) -> usize {
        let (total, connected) = self
            .clients
            .values()
            .filter(|session| session.connected())
            .fold((0usize, 0usize), |(total, n), session| {
                (total + session.packets_waiting(), n + 1)
            });

        if connected == 0 {
            debug_assert_eq!(total, 0);
            return 0;
        }
        (total + connected / 2) / connected
    }

    /// Close every connected session
    ///
    /// Sessions are removed as their disconnects arrive, not here.
    pub fn close(&mut self) {
        for session in self.clients.values_mut() {
            if session.connected() {
                session.close();
            }
        }
    }

    /// Look up a session
    pub fn client(&self, id: SessionId) -> Option<&ClientSession<T>> {
        self.clients.get(&id)
    }

    /// Look up a session mutably, e.g. to send it a private event
    pub fn client_mut(&mut self, id: SessionId) -> Option<&mut ClientSession<T>> {
        self.clients.get_mut(&id)
    }

    /// Ids of every registered session
    pub fn client_ids(&self) -> impl Iterator<Item = SessionId> + '_ {
        self.clients.keys().copied()
    }

    /// Snapshot of the source counters
    pub fn stats(&self) -> SourceStats {
        SourceStats {
            connected: self.count(),
            avg_packets_waiting: self.avg_packets_waiting(),
            ..self.stats.clone()
        }
    }
}

impl<T: Transport> std::fmt::Debug for EventSource<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSource")
            .field("path", &self.config.path)
            .field("clients", &self.clients.len())
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;

    use super::*;
    use crate::http::{AckOutcome, HttpRequest, ResponseState};
    use crate::transport::MemoryTransport;

    fn request(head: &str) -> HttpRequest {
        HttpRequest::parse(head.as_bytes()).unwrap()
    }

    fn stream_request() -> HttpRequest {
        request("GET /events HTTP/1.1\r\nLast-Event-ID: 9\r\n\r\n")
    }

    /// Admit a session directly, returning a handle on its transport
    fn connect(source: &mut EventSource<MemoryTransport>, id: SessionId, window: usize) -> MemoryTransport {
        let wire = MemoryTransport::new(window);
        source.admit(id, &stream_request(), wire.clone());
        wire
    }

    #[test]
    fn test_can_handle() {
        let source: EventSource<MemoryTransport> = EventSource::new(EventSourceConfig::new("/events"));

        let mut get = stream_request();
        assert!(source.can_handle(&mut get));
        assert_eq!(get.header(LAST_EVENT_ID_HEADER), Some("9"));

        let mut post = request("POST /events HTTP/1.1\r\n\r\n");
        assert!(!source.can_handle(&mut post));

        let mut other = request("GET /events/more HTTP/1.1\r\n\r\n");
        assert!(!source.can_handle(&mut other));

        // Query strings do not affect matching
        let mut query = request("GET /events?x=1 HTTP/1.1\r\n\r\n");
        assert!(source.can_handle(&mut query));
    }

    #[test]
    fn test_handle_request_challenges() {
        let source: EventSource<MemoryTransport> = EventSource::new(
            EventSourceConfig::new("/events")
                .authentication("admin", "secret")
                .realm("events"),
        );
        let wire = MemoryTransport::new(1024);
        let mut transport = wire.clone();

        let anonymous = stream_request();
        let mut response = source.handle_request(&anonymous);
        response.respond(&anonymous, &mut transport);

        let written = String::from_utf8(wire.take_written()).unwrap();
        assert!(written.starts_with("HTTP/1.1 401 Unauthorized\r\n"));
        assert!(written.contains("WWW-Authenticate: Basic realm=\"events\""));

        let total = wire.acknowledge_all();
        assert_eq!(
            response.ack(&mut transport, total, Duration::ZERO),
            AckOutcome::Complete
        );

        let authorized = request(&format!(
            "GET /events HTTP/1.1\r\nAuthorization: Basic {}\r\n\r\n",
            STANDARD.encode("admin:secret")
        ));
        let mut response = source.handle_request(&authorized);
        response.respond(&authorized, &mut transport);
        assert_eq!(response.state(), ResponseState::WaitAck);
        assert!(String::from_utf8(wire.written())
            .unwrap()
            .contains("text/event-stream"));
    }

    #[test]
    fn test_connect_handler_runs_once_per_session() {
        let mut source = EventSource::new(EventSourceConfig::new("/events"));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        source.on_connect(move |client: &mut ClientSession<MemoryTransport>| {
            counter.fetch_add(1, Ordering::SeqCst);
            let greeting = format!("last seen {}", client.last_id());
            client.send(&greeting, Some("hello"), 0, 5000);
        });

        let wire = connect(&mut source, 1, 1024);
        connect(&mut source, 2, 1024);

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            wire.written(),
            b"retry: 5000\r\nevent: hello\r\ndata: last seen 0\r\n\r\n"
        );
        assert_eq!(source.stats().sessions_admitted, 2);
    }

    #[test]
    fn test_duplicate_id_replaces_session() {
        let mut source = EventSource::new(EventSourceConfig::new("/events"));
        source.on_connect(|client: &mut ClientSession<MemoryTransport>| {
            client.send("hi", None, 0, 0);
        });

        let old = connect(&mut source, 4, 1024);
        old.take_written();
        let new = connect(&mut source, 4, 1024);

        // The old connection is shut down, the greeting goes to the new one
        assert_eq!(old.closed(), Some(false));
        assert!(old.written().is_empty());
        assert_eq!(new.written(), b"data: hi\r\n\r\n");
        assert_eq!(new.closed(), None);

        assert_eq!(source.count(), 1);
        assert_eq!(source.stats().sessions_admitted, 2);
        assert_eq!(source.stats().sessions_disconnected, 1);

        source.send("later", None, 0, 0);
        assert!(old.written().is_empty());
        assert_eq!(new.written(), b"data: hi\r\n\r\ndata: later\r\n\r\n");
    }

    #[test]
    fn test_broadcast_with_stalled_client() {
        let mut source = EventSource::new(EventSourceConfig::new("/events"));
        let fast = connect(&mut source, 1, 1024);
        let stalled = connect(&mut source, 2, 0);

        source.send("tick", Some("clock"), 1, 0);

        // Delivered to the healthy client in the same turn
        assert_eq!(fast.written(), b"id: 1\r\nevent: clock\r\ndata: tick\r\n\r\n");

        // Still queued for the other one
        assert!(stalled.written().is_empty());
        assert_eq!(source.client(2).unwrap().packets_waiting(), 1);

        // Room appears and the next poll drains it
        stalled.set_window(1024);
        source.on_transport_event(2, TransportEvent::Poll);
        assert_eq!(stalled.written(), fast.written());
    }

    #[test]
    fn test_ack_routed_to_session() {
        let mut source = EventSource::new(EventSourceConfig::new("/events"));
        let wire = connect(&mut source, 1, 1024);

        source.send("a", None, 0, 0);
        source.send("b", None, 0, 0);
        assert_eq!(source.client(1).unwrap().packets_waiting(), 2);

        let acked = wire.acknowledge_all();
        assert!(source.on_transport_event(1, TransportEvent::Ack { len: acked, time: Duration::ZERO }));
        assert_eq!(source.client(1).unwrap().packets_waiting(), 0);

        assert!(!source.on_transport_event(99, TransportEvent::Poll));
    }

    #[test]
    fn test_disconnect_removes_session() {
        let mut source = EventSource::new(EventSourceConfig::new("/events"));
        let gone = connect(&mut source, 1, 0);
        connect(&mut source, 2, 1024);

        for n in 0..4 {
            source.send(&format!("event {}", n), None, 0, 0);
        }
        assert_eq!(source.count(), 2);

        gone.disconnect();
        assert_eq!(source.count(), 1);
        source.on_transport_event(1, TransportEvent::Disconnect);

        assert!(source.client(1).is_none());
        assert_eq!(gone.send_count(), 0);
        assert_eq!(source.stats().sessions_disconnected, 1);

        // Second disconnect is a no-op
        assert!(!source.handle_disconnect(1));
    }

    #[test]
    fn test_send_skips_disconnected_sessions() {
        let mut source = EventSource::new(EventSourceConfig::new("/events"));
        let gone = connect(&mut source, 1, 1024);
        gone.disconnect();

        source.send("nobody home", None, 0, 0);
        assert!(gone.written().is_empty());
        assert_eq!(source.client(1).unwrap().packets_waiting(), 0);
    }

    #[test]
    fn test_avg_packets_waiting() {
        let mut source: EventSource<MemoryTransport> = EventSource::new(EventSourceConfig::new("/events"));
        assert_eq!(source.avg_packets_waiting(), 0);

        connect(&mut source, 1, 0);
        connect(&mut source, 2, 0);
        source.send("one", None, 0, 0);
        assert_eq!(source.avg_packets_waiting(), 1);

        // 1 + 2 queued over two sessions rounds up to 2
        source.client_mut(2).unwrap().send("two", None, 0, 0);
        assert_eq!(source.avg_packets_waiting(), 2);
    }

    #[test]
    fn test_close_waits_for_disconnect() {
        let mut source = EventSource::new(EventSourceConfig::new("/events"));
        let first = connect(&mut source, 1, 1024);
        let second = connect(&mut source, 2, 1024);

        source.close();
        assert_eq!(first.closed(), Some(false));
        assert_eq!(second.closed(), Some(false));
        assert_eq!(source.count(), 0);

        // Still registered until the transports report back
        assert_eq!(source.client_ids().count(), 2);
        source.on_transport_event(1, TransportEvent::Disconnect);
        source.on_transport_event(2, TransportEvent::Disconnect);
        assert_eq!(source.client_ids().count(), 0);
    }

    #[test]
    fn test_queue_cap_from_config() {
        let mut source = EventSource::new(EventSourceConfig::new("/events").max_queued_messages(3));
        connect(&mut source, 1, 0);

        for n in 0..5 {
            source.send(&n.to_string(), None, 0, 0);
        }
        let session = source.client(1).unwrap();
        assert_eq!(session.packets_waiting(), 3);
        assert_eq!(session.stats().messages_dropped, 2);
    }
}
