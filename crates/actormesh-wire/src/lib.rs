//! actormesh wire protocol engine.
//!
//! Frames, parses and dispatches the messages exchanged between nodes of an
//! actor mesh, and runs the handshake, heartbeat and proxy-lifecycle
//! sub-protocols on top of them.
//!
//! ## Frame layout
//!
//! Every frame is a 64-byte [`Header`] followed by `payload_len` bytes of
//! MessagePack payload. See [`header`] for the byte layout.
//!
//! ## Handshake
//!
//! The accepting side sends a server handshake (node id, application
//! identifier, published actor), the connecting side a client handshake
//! (node id, application identifier). A connection carries nothing else
//! until the peer's handshake was accepted.
//!
//! ## Driving the engine
//!
//! The transport owns sockets and buffers. It registers endpoints with
//! [`Instance::accept_connection`] or [`Instance::open_connection`], feeds
//! chunks of [`ConnectionState::expected_bytes`] bytes to
//! [`Instance::handle`], and flushes the buffers the engine fills through
//! the [`Callee`].

pub mod callee;
pub mod config;
pub mod connection;
pub mod error;
pub mod handshake;
pub mod header;
pub mod instance;
pub mod message_queue;
pub mod payload;
pub mod proxy;
pub mod published;
pub mod routing;

pub use callee::{Callee, Envelope};
pub use connection::{check_frame, ConnectionState, Role};
pub use error::{WireError, WireResult};
pub use header::{Destination, Header, MessageType, HEADER_SIZE, PROTOCOL_VERSION};
pub use instance::{Instance, Recipient};
pub use message_queue::MessageQueue;
pub use proxy::ProxyRegistry;
pub use published::{PublishedActor, PublishedActors, ANY_PORT};
pub use routing::{Route, RoutingTable};
