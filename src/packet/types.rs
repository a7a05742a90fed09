/*!
 * Packet Types
 * Errors for the packet lifecycle and dispatch table
 */

use crate::arena::ArenaError;
use crate::core::types::PacketId;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Packet lifecycle error types
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Diagnostic)]
#[serde(rename_all = "snake_case", tag = "error", content = "details")]
pub enum PacketError {
    #[error("Arena error: {0}")]
    #[diagnostic(transparent)]
    Arena(#[from] ArenaError),

    #[error("Packet needs {needed} bytes, segment has {available}")]
    #[diagnostic(
        code(packet::buffer_too_small),
        help("Serialized packets must fit one segment; raise the arena segment size.")
    )]
    BufferTooSmall { needed: usize, available: usize },

    #[error("Malformed payload: {0}")]
    #[diagnostic(code(packet::malformed))]
    Malformed(String),

    #[error("Packet id mismatch: expected {expected}, payload carries {actual}")]
    #[diagnostic(code(packet::id_mismatch))]
    IdMismatch { expected: PacketId, actual: PacketId },

    #[error("Handler failed: {0}")]
    #[diagnostic(code(packet::handler_failed))]
    Handler(String),
}

impl PacketError {
    /// A full send arena; retry once in-flight sends complete
    #[inline]
    pub fn is_backpressure(&self) -> bool {
        matches!(self, PacketError::Arena(e) if e.is_full())
    }
}

/// Dispatch table error types
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Diagnostic)]
#[serde(rename_all = "snake_case", tag = "error", content = "details")]
pub enum DispatchError {
    #[error("Unknown packet id {0}")]
    #[diagnostic(
        code(dispatch::unknown_packet_id),
        help("Register a handler for this id or check the peer's protocol version.")
    )]
    UnknownPacketId(PacketId),

    #[error("Payload of {0} bytes is too short to carry a packet id")]
    #[diagnostic(code(dispatch::missing_packet_id))]
    MissingPacketId(usize),
}
