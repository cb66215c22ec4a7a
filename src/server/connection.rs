//! Per-connection read side
//!
//! Reads and parses the request head, hands the connection's outbound half to
//! the event loop, then keeps draining the socket so a peer hang-up is noticed
//! even while nothing is being written.

use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};

use super::config::ServerConfig;
use crate::error::{Error, Result};
use crate::http::{read_request_head, HttpRequest, Request};
use crate::transport::tcp::{EventSender, TransportMonitor};
use crate::transport::{ConnectionEvent, SessionId, TcpTransport, TransportEvent};

/// One accepted socket, before and after its request was dispatched
pub struct Connection<R> {
    id: SessionId,
    peer_addr: SocketAddr,
    reader: R,
    config: ServerConfig,
    events: EventSender,
}

impl<R: AsyncRead + Unpin> Connection<R> {
    pub fn new(
        id: SessionId,
        peer_addr: SocketAddr,
        reader: R,
        config: ServerConfig,
        events: EventSender,
    ) -> Self {
        Self {
            id,
            peer_addr,
            reader,
            config,
            events,
        }
    }

    /// Serve the connection until it closes
    ///
    /// `writer` is the outbound half; it only starts being used once the
    /// request head was read successfully.
    pub async fn run<W>(mut self, writer: W) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let request = self.read_request().await?;

        tracing::debug!(
            session_id = self.id,
            peer = %self.peer_addr,
            method = %request.method(),
            url = request.url(),
            "Request received"
        );

        let (transport, monitor) = TcpTransport::spawn(
            self.id,
            writer,
            self.config.send_window,
            self.config.ack_timeout,
            self.events.clone(),
        );

        self.events
            .send(ConnectionEvent::Request {
                id: self.id,
                request,
                transport,
            })
            .map_err(|_| Error::ServerClosed)?;

        self.drain(monitor).await;
        Ok(())
    }

    async fn read_request(&mut self) -> Result<HttpRequest> {
        let head = tokio::time::timeout(
            self.config.request_timeout,
            read_request_head(&mut self.reader, self.config.max_request_head),
        )
        .await
        .map_err(|_| Error::Timeout)??;

        Ok(HttpRequest::parse(&head)?.with_peer(self.peer_addr))
    }

    /// Discard inbound bytes until the peer leaves or the transport closes
    async fn drain(&mut self, mut monitor: TransportMonitor) {
        let mut sink = [0u8; 1024];

        loop {
            tokio::select! {
                _ = monitor.closed() => break,
                read = self.reader.read(&mut sink) => match read {
                    Ok(0) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        tracing::debug!(session_id = self.id, error = %e, "Read failed");
                        break;
                    }
                },
            }
        }

        monitor.mark_disconnected();
        let _ = self.events.send(ConnectionEvent::Transport {
            id: self.id,
            event: TransportEvent::Disconnect,
        });
    }
}
