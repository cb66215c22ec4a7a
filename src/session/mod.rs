//! Per-client streaming sessions
//!
//! A [`ClientSession`] owns one admitted connection and a queue of
//! [`OutboundMessage`]s. Messages are private to the session even when the
//! same frame is broadcast to many clients, because each client tracks its
//! own send and acknowledgment progress.

pub mod client;
pub mod message;

pub use client::ClientSession;
pub use message::OutboundMessage;
