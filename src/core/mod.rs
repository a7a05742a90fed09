/*!
 * Core Module
 * Fundamental types, limits, configuration and error handling
 */

pub mod config;
pub mod errors;
pub mod limits;
pub mod logging;
pub mod types;

// Re-export for convenience
pub use config::{ArenaConfig, SessionConfig, TransportConfig, UnknownPacketPolicy};
pub use errors::*;
pub use logging::init_tracing;
pub use types::*;
