//! Server-Sent Events wire protocol
//!
//! Frame encoding and the protocol constants shared by the session and
//! response layers.

pub mod constants;
pub mod frame;

pub use frame::{encode_event, EventFrame};
