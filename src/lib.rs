/*!
 * Segnet Library
 * Arena-backed, length-prefixed packet transport over async byte streams
 */

pub mod arena;
pub mod core;
pub mod packet;
pub mod session;
pub mod transport;

// Re-exports
pub use arena::{ArenaStats, ReserveSize, Segment, SegmentArena};
pub use self::core::{
    init_tracing, ArenaConfig, SegnetError, SegnetResult, SessionConfig, TransportConfig,
    UnknownPacketPolicy,
};
pub use packet::{Dispatch, Envelope, Packet, PacketRegistry};
pub use session::{Session, SessionContext, SessionSummary};
pub use transport::{CloseReason, Transport, TransportEvent};
