//! In-memory transport
//!
//! A transport with a fixed send window and no I/O. Every clone shares the
//! same state, so a test (or an embedding that moves bytes itself) can keep
//! one clone while a session owns another, then inspect what was written and
//! acknowledge it explicitly.

use std::sync::{Arc, Mutex, MutexGuard};

use super::Transport;

#[derive(Debug, Default)]
struct MemoryState {
    /// Send window in bytes
    window: usize,
    /// Idle transport takes a write of any size
    elastic: bool,
    /// Added but not yet sent
    buffered: Vec<u8>,
    /// Sent but not yet acknowledged
    in_flight: usize,
    /// Everything sent so far, in order
    written: Vec<u8>,
    /// Number of successful `send()` calls
    sends: usize,
    connected: bool,
    /// `Some(abort)` once `close` was called
    closed: Option<bool>,
}

/// Shared-state in-memory transport
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTransport {
    /// Create a connected transport with the given send window
    pub fn new(window: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                window,
                connected: true,
                ..Default::default()
            })),
        }
    }

    /// Create a transport that behaves like a socket: with nothing buffered
    /// or in flight it accepts a write larger than the window
    pub fn elastic(window: usize) -> Self {
        let transport = Self::new(window);
        transport.state().elastic = true;
        transport
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        // A poisoned lock only means a test panicked mid-update; the data is still usable
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Change the send window
    pub fn set_window(&self, window: usize) {
        self.state().window = window;
    }

    /// Bytes sent and not yet acknowledged
    pub fn in_flight(&self) -> usize {
        self.state().in_flight
    }

    /// Mark up to `len` in-flight bytes as acknowledged, returns the count
    pub fn acknowledge(&self, len: usize) -> usize {
        let mut state = self.state();
        let acked = len.min(state.in_flight);
        state.in_flight -= acked;
        acked
    }

    /// Acknowledge everything in flight, returns the count
    pub fn acknowledge_all(&self) -> usize {
        let mut state = self.state();
        std::mem::take(&mut state.in_flight)
    }

    /// Copy of every byte sent so far
    pub fn written(&self) -> Vec<u8> {
        self.state().written.clone()
    }

    /// Drain the record of sent bytes
    pub fn take_written(&self) -> Vec<u8> {
        std::mem::take(&mut self.state().written)
    }

    /// Number of `send()` calls that pushed data
    pub fn send_count(&self) -> usize {
        self.state().sends
    }

    /// `Some(abort)` if the transport was closed locally
    pub fn closed(&self) -> Option<bool> {
        self.state().closed
    }

    /// Simulate the peer going away
    pub fn disconnect(&self) {
        self.state().connected = false;
    }
}

impl Transport for MemoryTransport {
    fn space(&self) -> usize {
        let state = self.state();
        if !state.connected {
            return 0;
        }
        if state.elastic && state.in_flight == 0 && state.buffered.is_empty() {
            return usize::MAX;
        }
        state
            .window
            .saturating_sub(state.in_flight + state.buffered.len())
    }

    fn add(&mut self, data: &[u8]) -> usize {
        let space = self.space();
        let take = data.len().min(space);
        self.state().buffered.extend_from_slice(&data[..take]);
        take
    }

    fn can_send(&self) -> bool {
        self.state().connected
    }

    fn send(&mut self) -> bool {
        let mut state = self.state();
        if !state.connected || state.buffered.is_empty() {
            return false;
        }
        let buffered = std::mem::take(&mut state.buffered);
        state.in_flight += buffered.len();
        state.written.extend_from_slice(&buffered);
        state.sends += 1;
        true
    }

    fn connected(&self) -> bool {
        self.state().connected
    }

    fn close(&mut self, abort: bool) {
        let mut state = self.state();
        state.connected = false;
        state.closed = Some(abort);
        if abort {
            state.buffered.clear();
        }
    }
}
