/*!
 * Packet Traits
 *
 * Capability set every message type implements. The orchestration around
 * these hooks lives in `lifecycle`; implementors only move their own fields.
 */

use super::types::PacketError;
use crate::core::types::PacketId;
use crate::session::SessionContext;

/// A message type that can be framed and sent, or filled from a frame
pub trait Packet: Send {
    /// Id written in front of the fields on the wire
    fn id(&self) -> PacketId;

    /// Write this packet's fields into `buf`, returning the bytes used
    ///
    /// `buf` starts right after the packet id; fail with
    /// [`PacketError::BufferTooSmall`] when the fields do not fit.
    fn fill_into_buffer(&mut self, buf: &mut [u8]) -> Result<usize, PacketError>;

    /// Populate this packet from the peer's field bytes (packet id stripped)
    fn fill_from_peer_bytes(&mut self, bytes: &[u8]) -> Result<(), PacketError>;

    /// Act on a received packet
    ///
    /// Replies go through [`SessionContext::reply`].
    fn execute(&mut self, _ctx: &SessionContext) -> Result<(), PacketError> {
        Ok(())
    }
}

impl<P: Packet + ?Sized> Packet for Box<P> {
    fn id(&self) -> PacketId {
        (**self).id()
    }

    fn fill_into_buffer(&mut self, buf: &mut [u8]) -> Result<usize, PacketError> {
        (**self).fill_into_buffer(buf)
    }

    fn fill_from_peer_bytes(&mut self, bytes: &[u8]) -> Result<(), PacketError> {
        (**self).fill_from_peer_bytes(bytes)
    }

    fn execute(&mut self, ctx: &SessionContext) -> Result<(), PacketError> {
        (**self).execute(ctx)
    }
}
