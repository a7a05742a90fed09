/*!
 * Transport Types
 * Events, close reasons and errors for framed transports
 */

use crate::arena::{ArenaError, Segment};
use crate::packet::PacketError;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Receive-side framing phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "phase")]
pub enum ReceivePhase {
    /// No receive outstanding
    Idle,
    /// Waiting for the 2-byte length prefix
    AwaitingHeader,
    /// Waiting for `len` body bytes
    AwaitingBody { len: usize },
    /// Terminal; nothing is re-armed
    Disconnected,
}

/// Why a transport stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason", content = "details")]
pub enum CloseReason {
    /// Zero-length read from the peer
    PeerClosed,
    /// `disconnect()` was called locally
    LocalShutdown,
    /// Peer declared a frame larger than a receive segment
    FrameTooLarge { len: usize, max: usize },
    /// Stream ended partway through a header or body
    Truncated { expected: usize, received: usize },
    /// Socket error on send or receive
    Io(String),
    /// Nobody is listening for transport events any more
    EventsDropped,
}

/// Notifications a transport emits to its owner
#[derive(Debug)]
pub enum TransportEvent {
    /// A complete frame; the handler now owns `segment` and must release it
    PacketReceived { segment: Segment, len: usize },
    /// A frame of `bytes` (header included) was written to the socket
    PacketSent { bytes: usize },
    /// Emitted exactly once per transport
    Disconnected { reason: CloseReason },
}

/// Transport error types
#[derive(Error, Debug, Diagnostic)]
pub enum TransportError {
    #[error("Arena error: {0}")]
    #[diagnostic(transparent)]
    Arena(#[from] ArenaError),

    #[error("Packet error: {0}")]
    #[diagnostic(transparent)]
    Packet(#[from] PacketError),

    #[error("Connection closed")]
    #[diagnostic(
        code(transport::connection_closed),
        help("The peer or a local disconnect closed this transport; open a new connection.")
    )]
    ConnectionClosed,

    #[error("Frame too large: {len} bytes, max {max}")]
    #[diagnostic(code(transport::frame_too_large))]
    FrameTooLarge { len: usize, max: usize },

    #[error("Frame of {0} bytes has no room for the length header")]
    #[diagnostic(code(transport::missing_header))]
    MissingHeader(usize),

    #[error("Receive loop already started")]
    #[diagnostic(code(transport::already_receiving))]
    AlreadyReceiving,

    #[error("I/O error: {0}")]
    #[diagnostic(code(transport::io_error))]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// A full send arena; retry once in-flight sends complete
    pub fn is_backpressure(&self) -> bool {
        match self {
            TransportError::Arena(e) => e.is_full(),
            TransportError::Packet(e) => e.is_backpressure(),
            _ => false,
        }
    }
}
