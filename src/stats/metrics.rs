//! Statistics for streaming sessions and sources

use std::time::{Duration, Instant};

/// Per-session delivery counters
#[derive(Debug, Clone)]
pub struct SessionStats {
    /// When the session was admitted
    pub connected_at: Instant,
    /// Bytes accepted into the queue
    pub bytes_queued: u64,
    /// Bytes handed to the transport
    pub bytes_sent: u64,
    /// Bytes acknowledged by the transport
    pub bytes_acked: u64,
    /// Messages accepted into the queue
    pub messages_queued: u64,
    /// Messages fully acknowledged and released
    pub messages_delivered: u64,
    /// Messages shed because the queue was full
    pub messages_dropped: u64,
}

impl SessionStats {
    /// Create new stats tracker
    pub fn new() -> Self {
        Self {
            connected_at: Instant::now(),
            bytes_queued: 0,
            bytes_sent: 0,
            bytes_acked: 0,
            messages_queued: 0,
            messages_delivered: 0,
            messages_dropped: 0,
        }
    }

    /// Time since admission
    pub fn duration(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Sent bytes still awaiting acknowledgment
    pub fn bytes_unacked(&self) -> u64 {
        self.bytes_sent.saturating_sub(self.bytes_acked)
    }

    /// Outgoing bitrate in bits per second
    pub fn bitrate(&self) -> u64 {
        let secs = self.duration().as_secs();
        if secs > 0 {
            (self.bytes_acked * 8) / secs
        } else {
            0
        }
    }
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-source counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceStats {
    /// Sessions ever admitted
    pub sessions_admitted: u64,
    /// Sessions removed after disconnect
    pub sessions_disconnected: u64,
    /// Currently connected sessions
    pub connected: usize,
    /// Events broadcast through the source
    pub events_sent: u64,
    /// Rounded mean queue depth over connected sessions
    pub avg_packets_waiting: usize,
}

impl SourceStats {
    pub fn new() -> Self {
        Self::default()
    }
}
