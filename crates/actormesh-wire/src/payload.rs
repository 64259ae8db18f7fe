//! Payload encoding.
//!
//! Payloads are MessagePack documents. Their layout depends on the frame's
//! operation; the codec below is shared by every frame kind.

use crate::error::WireResult;
use actormesh_types::{ActorAddr, Message};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Serialize a payload.
pub fn encode<T: Serialize>(value: &T) -> WireResult<Vec<u8>> {
    Ok(rmp_serde::to_vec_named(value)?)
}

/// Deserialize a payload.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> WireResult<T> {
    Ok(rmp_serde::from_slice(bytes)?)
}

/// Payload of `dispatch_message` and `dispatch_message_named` frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchPayload {
    /// Actors the message passed through before reaching its receiver.
    pub forwarding_stack: Vec<ActorAddr>,
    /// Application message.
    pub message: Message,
}
