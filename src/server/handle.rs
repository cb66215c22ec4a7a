//! Application-side handle to a running event source
//!
//! The event loop owns every source exclusively. Handles talk to it through a
//! command channel: broadcasts are fire-and-forget, queries carry a oneshot
//! reply. Frames are encoded on the caller's side so the loop only fans out
//! shared bytes.

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};
use crate::protocol::{encode_event, EventFrame};
use crate::stats::SourceStats;

/// Index of a source inside the event loop
pub type SourceIndex = usize;

/// Request from a handle to the event loop
#[derive(Debug)]
pub enum Command {
    /// Broadcast an encoded frame
    Send { source: SourceIndex, frame: Bytes },
    /// Number of connected sessions
    Count {
        source: SourceIndex,
        reply: oneshot::Sender<usize>,
    },
    /// Rounded mean queue depth
    AvgPacketsWaiting {
        source: SourceIndex,
        reply: oneshot::Sender<usize>,
    },
    /// Counter snapshot
    Stats {
        source: SourceIndex,
        reply: oneshot::Sender<SourceStats>,
    },
    /// Close every session of the source
    Close { source: SourceIndex },
}

/// Cloneable handle to one event source of a server
#[derive(Debug, Clone)]
pub struct EventSourceHandle {
    source: SourceIndex,
    path: String,
    commands: mpsc::UnboundedSender<Command>,
}

impl EventSourceHandle {
    pub(crate) fn new(
        source: SourceIndex,
        path: String,
        commands: mpsc::UnboundedSender<Command>,
    ) -> Self {
        Self {
            source,
            path,
            commands,
        }
    }

    /// Path the source serves
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Broadcast one event to every connected session
    ///
    /// `id` and `retry` are omitted from the frame when 0.
    pub fn send(&self, message: &str, event: Option<&str>, id: u32, retry: u32) -> Result<()> {
        self.send_frame(encode_event(message, event, id, retry))
    }

    /// Broadcast an event built with [`EventFrame`]
    pub fn send_event(&self, frame: &EventFrame) -> Result<()> {
        self.send_frame(frame.encode())
    }

    /// Broadcast pre-encoded frame bytes
    pub fn send_frame(&self, frame: Bytes) -> Result<()> {
        self.command(Command::Send {
            source: self.source,
            frame,
        })
    }

    /// Number of connected sessions
    pub async fn count(&self) -> Result<usize> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Count {
            source: self.source,
            reply,
        })?;
        rx.await.map_err(|_| Error::ServerClosed)
    }

    /// Rounded mean number of messages waiting per connected session
    pub async fn avg_packets_waiting(&self) -> Result<usize> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::AvgPacketsWaiting {
            source: self.source,
            reply,
        })?;
        rx.await.map_err(|_| Error::ServerClosed)
    }

    /// Snapshot of the source counters
    pub async fn stats(&self) -> Result<SourceStats> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Stats {
            source: self.source,
            reply,
        })?;
        rx.await.map_err(|_| Error::ServerClosed)
    }

    /// Gracefully close every connected session
    ///
    /// The source stays registered and accepts new clients afterwards.
    pub fn close(&self) -> Result<()> {
        self.command(Command::Close {
            source: self.source,
        })
    }

    fn command(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| Error::ServerClosed)
    }
}
