//! Server-Sent Events streaming with transport flow control
//!
//! The crate is split into a synchronous streaming core and a tokio server
//! that drives it:
//!
//! - [`protocol`]: `text/event-stream` frame encoding
//! - [`session`]: per-client message queues with send and ack cursors
//! - [`source`]: broadcast hubs that admit clients and fan events out
//! - [`http`]: the minimal request/response boundary
//! - [`transport`]: the byte-stream abstraction and its socket and in-memory
//!   implementations
//! - [`server`]: accept loop, single-owner event loop and application handles
//!
//! # Example
//!
//! ```no_run
//! use sse_hub::{EventServer, EventSourceConfig, ServerConfig};
//!
//! # async fn example() -> sse_hub::Result<()> {
//! let mut server = EventServer::new(ServerConfig::default());
//! let events = server.add_source(EventSourceConfig::new("/events"), |client| {
//!     client.send("connected", Some("hello"), 0, 3000);
//! });
//!
//! tokio::spawn(async move {
//!     let mut id = 0;
//!     loop {
//!         tokio::time::sleep(std::time::Duration::from_secs(1)).await;
//!         id += 1;
//!         if events.send("tick", Some("clock"), id, 0).is_err() {
//!             break;
//!         }
//!     }
//! });
//!
//! server.run().await
//! # }
//! ```

pub mod error;
pub mod http;
pub mod protocol;
pub mod server;
pub mod session;
pub mod source;
pub mod stats;
pub mod transport;

pub use error::{Error, RequestError, Result};
pub use http::{DefaultHeaders, HttpRequest, Request};
pub use protocol::{encode_event, EventFrame};
pub use server::{EventServer, EventSourceHandle, ServerConfig};
pub use session::{ClientSession, OutboundMessage};
pub use source::{EventSource, EventSourceConfig};
pub use stats::{SessionStats, SourceStats};
pub use transport::{MemoryTransport, SessionId, TcpTransport, Transport, TransportEvent};
