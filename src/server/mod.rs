//! Event stream server
//!
//! Glues the streaming core to tokio sockets:
//!
//! - [`EventServer`]: accept loop plus the single event loop task
//! - [`EventSourceHandle`]: cloneable handle for broadcasting from anywhere
//! - [`ServerConfig`]: listener and transport settings

pub mod config;
pub mod connection;
pub mod event_loop;
pub mod handle;
pub mod listener;

pub use config::ServerConfig;
pub use event_loop::EventLoop;
pub use handle::EventSourceHandle;
pub use listener::EventServer;
