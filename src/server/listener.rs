//! Event stream server
//!
//! Accepts TCP connections, spawns a read task per connection and runs the
//! single event loop that owns every source and session.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Semaphore};
use tokio::time::MissedTickBehavior;

use crate::error::Result;
use crate::server::config::{ServerConfig, MIN_POLL_INTERVAL};
use crate::server::connection::Connection;
use crate::server::event_loop::EventLoop;
use crate::server::handle::{Command, EventSourceHandle};
use crate::session::ClientSession;
use crate::source::{EventSource, EventSourceConfig};
use crate::transport::tcp::EventSender;
use crate::transport::{ConnectionEvent, SessionId, TcpTransport};

/// Server-Sent Events server
pub struct EventServer {
    config: ServerConfig,
    event_loop: EventLoop<TcpTransport>,
    events_tx: EventSender,
    events_rx: mpsc::UnboundedReceiver<ConnectionEvent<TcpTransport>>,
    commands_tx: mpsc::UnboundedSender<Command>,
    commands_rx: mpsc::UnboundedReceiver<Command>,
    next_session_id: SessionId,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl EventServer {
    /// Create a new server with the given configuration
    pub fn new(config: ServerConfig) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        Self {
            config,
            event_loop: EventLoop::new(),
            events_tx,
            events_rx,
            commands_tx,
            commands_rx,
            next_session_id: 1,
            connection_semaphore,
        }
    }

    /// Register an event source
    ///
    /// `on_connect` runs inside the event loop for every admitted session,
    /// typically to send a greeting or replay events after `last_id()`.
    pub fn add_source<F>(&mut self, config: EventSourceConfig, on_connect: F) -> EventSourceHandle
    where
        F: FnMut(&mut ClientSession<TcpTransport>) + Send + 'static,
    {
        let path = config.path.clone();
        let mut source = EventSource::new(config);
        source.on_connect(on_connect);

        let index = self.event_loop.add_source(source);
        tracing::debug!(path = %path, index, "Event source registered");

        EventSourceHandle::new(index, path, self.commands_tx.clone())
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Run the server
    ///
    /// Only returns early if the listener cannot be bound.
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Run on an already bound listener until `shutdown` resolves
    ///
    /// On shutdown every session and unfinished response is closed gracefully.
    pub async fn serve<F>(mut self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let addr = listener.local_addr()?;
        tracing::info!(addr = %addr, "Event stream server listening");

        // The field is public, so a zero interval can bypass the setter
        let mut poll = tokio::time::interval(self.config.poll_interval.max(MIN_POLL_INTERVAL));
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown signal received");
                    break;
                }

                accepted = listener.accept() => match accepted {
                    Ok((socket, peer_addr)) => self.handle_connection(socket, peer_addr),
                    Err(e) => tracing::error!(error = %e, "Failed to accept connection"),
                },

                // Both senders are held by `self`, so neither channel ever closes
                Some(event) = self.events_rx.recv() => {
                    self.event_loop.handle_connection_event(event);
                }

                Some(command) = self.commands_rx.recv() => {
                    self.event_loop.handle_command(command);
                }

                _ = poll.tick() => self.event_loop.poll(),
            }
        }

        self.event_loop.close_all();
        Ok(())
    }

    fn handle_connection(&mut self, socket: TcpStream, peer_addr: SocketAddr) {
        // Check connection limit
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            }
        } else {
            None
        };

        let session_id = self.next_session_id;
        self.next_session_id += 1;

        tracing::debug!(session_id = session_id, peer = %peer_addr, "New connection");

        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::error!(error = %e, "Failed to configure socket");
                return;
            }
        }

        let (reader, writer) = socket.into_split();
        let connection = Connection::new(
            session_id,
            peer_addr,
            reader,
            self.config.clone(),
            self.events_tx.clone(),
        );

        tokio::spawn(async move {
            let _permit = permit;

            if let Err(e) = connection.run(writer).await {
                tracing::debug!(session_id = session_id, error = %e, "Connection error");
            }

            tracing::debug!(session_id = session_id, "Connection closed");
        });
    }
}
