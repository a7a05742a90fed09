/*!
 * Error Types
 * Centralized error handling with thiserror and miette
 */

use miette::Diagnostic;
use thiserror::Error;

pub use crate::arena::ArenaError;
pub use crate::packet::{DispatchError, PacketError};
pub use crate::transport::TransportError;

/// Unified error type with miette diagnostics
#[derive(Error, Debug, Diagnostic)]
pub enum SegnetError {
    #[error("Arena error: {0}")]
    #[diagnostic(transparent)]
    Arena(#[from] ArenaError),

    #[error("Packet error: {0}")]
    #[diagnostic(transparent)]
    Packet(#[from] PacketError),

    #[error("Dispatch error: {0}")]
    #[diagnostic(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("Transport error: {0}")]
    #[diagnostic(transparent)]
    Transport(#[from] TransportError),

    #[error("Configuration error: {0}")]
    #[diagnostic(
        code(segnet::configuration_error),
        help("Invalid configuration. Review SEGNET_* environment variables and arena geometry.")
    )]
    Config(String),

    #[error("I/O error: {0}")]
    #[diagnostic(
        code(segnet::io_error),
        help("Socket setup failed. Check the address and that the port is free.")
    )]
    Io(#[from] std::io::Error),
}

impl SegnetError {
    /// Recoverable by retrying once segments are released
    pub fn is_backpressure(&self) -> bool {
        match self {
            SegnetError::Arena(e) => e.is_full(),
            SegnetError::Packet(e) => e.is_backpressure(),
            SegnetError::Transport(e) => e.is_backpressure(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arena_full_is_backpressure() {
        let err: SegnetError = ArenaError::Full { segments: 4 }.into();
        assert!(err.is_backpressure());
        assert!(err.to_string().contains("4 segments"));
    }

    #[test]
    fn test_config_error_is_not_backpressure() {
        let err = SegnetError::Config("bad".into());
        assert!(!err.is_backpressure());
    }

    #[test]
    fn test_dispatch_error_display() {
        let err: SegnetError = DispatchError::UnknownPacketId(0x2a).into();
        assert_eq!(err.to_string(), "Dispatch error: Unknown packet id 42");
    }
}
