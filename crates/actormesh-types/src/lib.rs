//! Core types for the actormesh wire protocol.
//!
//! This crate defines the identifiers, message containers, endpoint handles
//! and configuration structures shared by the protocol engine and its
//! embedders. It contains no protocol logic.

pub mod actor;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod message;
pub mod node;

pub use actor::{ActorAddr, ActorId, ActorName};
pub use endpoint::{ConnectionHandle, DatagramHandle, EndpointHandle};
pub use error::{TypeError, TypeResult};
pub use message::{ExitReason, Message, MessageId};
pub use node::NodeId;
