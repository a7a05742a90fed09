/*!
 * Packet Lifecycle
 *
 * Send side: reserve -> write id -> fill fields -> send -> release after the
 * write completes. Receive side: fill from peer bytes -> release.
 */

use super::traits::Packet;
use super::types::PacketError;
use crate::arena::{ReserveSize, Segment, SegmentArena};
use crate::core::limits::PACKET_ID_BYTES;
use crate::core::types::PacketId;
use crate::transport::codec;
use crate::transport::{Transport, TransportError};
use tracing::trace;

/// A serialized packet bound to the segment holding it
#[derive(Debug)]
pub struct Envelope {
    id: PacketId,
    segment: Segment,
    size_used: usize,
}

impl Envelope {
    #[inline]
    pub fn id(&self) -> PacketId {
        self.id
    }

    /// Payload bytes written (packet id included)
    #[inline]
    pub fn size_used(&self) -> usize {
        self.size_used
    }

    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.segment[..self.size_used]
    }

    #[inline]
    pub fn into_parts(self) -> (Segment, usize) {
        (self.segment, self.size_used)
    }
}

/// Read the packet id at the front of a payload
pub fn read_packet_id(payload: &[u8]) -> Result<PacketId, PacketError> {
    codec::read_packet_id(payload).ok_or_else(|| {
        PacketError::Malformed(format!(
            "payload of {} bytes has no packet id",
            payload.len()
        ))
    })
}

/// Serialize `packet` into a fresh framed segment from `arena`
///
/// [`PacketError::Arena`] with a full arena is backpressure: nothing was
/// leased and the call can be retried.
pub fn serialize<P: Packet + ?Sized>(
    packet: &mut P,
    arena: &SegmentArena,
) -> Result<Envelope, PacketError> {
    let mut segment = arena.reserve(ReserveSize::Framed)?;
    let size_used = fill_segment(packet, &mut segment)?;
    Ok(Envelope {
        id: packet.id(),
        segment,
        size_used,
    })
}

/// Serialize into an already-leased framed segment, returning the payload size
pub fn fill_segment<P: Packet + ?Sized>(
    packet: &mut P,
    segment: &mut Segment,
) -> Result<usize, PacketError> {
    let available = segment.len();
    if codec::write_packet_id(segment, packet.id()).is_none() {
        return Err(PacketError::BufferTooSmall {
            needed: PACKET_ID_BYTES,
            available,
        });
    }

    let fields = &mut segment[PACKET_ID_BYTES..];
    let field_capacity = fields.len();
    let written = packet.fill_into_buffer(fields)?;
    if written > field_capacity {
        return Err(PacketError::BufferTooSmall {
            needed: PACKET_ID_BYTES + written,
            available,
        });
    }

    Ok(PACKET_ID_BYTES + written)
}

/// Serialize `packet` and send it through `transport`
pub async fn serialize_and_send<P: Packet + ?Sized>(
    packet: &mut P,
    transport: &Transport,
) -> Result<usize, TransportError> {
    let envelope = serialize(packet, transport.send_arena())?;
    trace!(id = envelope.id(), size = envelope.size_used(), "Packet serialized");
    transport.send_envelope(envelope).await
}

/// Fill `packet` from a received frame, then release the frame's segment
///
/// The segment is released on every path, including failures.
pub fn deserialize<P: Packet + ?Sized>(
    packet: &mut P,
    segment: Segment,
    len: usize,
) -> Result<(), PacketError> {
    let filled = fill_from_segment(packet, &segment, len);
    segment.release()?;
    filled
}

fn fill_from_segment<P: Packet + ?Sized>(
    packet: &mut P,
    segment: &Segment,
    len: usize,
) -> Result<(), PacketError> {
    let payload = segment.get(..len).ok_or_else(|| {
        PacketError::Malformed(format!(
            "frame length {} exceeds segment view {}",
            len,
            segment.len()
        ))
    })?;

    let actual = read_packet_id(payload)?;
    let expected = packet.id();
    if actual != expected {
        return Err(PacketError::IdMismatch { expected, actual });
    }

    packet.fill_from_peer_bytes(&payload[PACKET_ID_BYTES..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaError;

    struct Greeting {
        text: Vec<u8>,
    }

    impl Packet for Greeting {
        fn id(&self) -> PacketId {
            7
        }

        fn fill_into_buffer(&mut self, buf: &mut [u8]) -> Result<usize, PacketError> {
            let available = buf.len();
            let dest = buf.get_mut(..self.text.len()).ok_or(PacketError::BufferTooSmall {
                needed: self.text.len(),
                available,
            })?;
            dest.copy_from_slice(&self.text);
            Ok(self.text.len())
        }

        fn fill_from_peer_bytes(&mut self, bytes: &[u8]) -> Result<(), PacketError> {
            self.text = bytes.to_vec();
            Ok(())
        }
    }

    #[test]
    fn test_serialize_writes_id_then_fields() {
        let arena = SegmentArena::new(512, 64).unwrap();
        let mut packet = Greeting {
            text: b"hi".to_vec(),
        };
        let envelope = serialize(&mut packet, &arena).unwrap();
        assert_eq!(envelope.id(), 7);
        assert_eq!(envelope.size_used(), 4);
        assert_eq!(envelope.payload(), &[7, 0, b'h', b'i']);
    }

    #[test]
    fn test_serialize_too_large_releases_segment() {
        let arena = SegmentArena::new(512, 16).unwrap();
        let mut packet = Greeting {
            text: vec![1; 32],
        };
        let err = serialize(&mut packet, &arena).unwrap_err();
        assert!(matches!(err, PacketError::BufferTooSmall { .. }));
        assert!(arena.stats().is_idle());
    }

    #[test]
    fn test_serialize_reports_full_arena() {
        let arena = SegmentArena::new(64, 64).unwrap();
        let _held = arena.reserve(ReserveSize::Framed).unwrap();
        let mut packet = Greeting { text: vec![] };
        let err = serialize(&mut packet, &arena).unwrap_err();
        assert!(err.is_backpressure());
        assert_eq!(err, PacketError::Arena(ArenaError::Full { segments: 1 }));
    }

    #[test]
    fn test_deserialize_fills_then_releases() {
        let arena = SegmentArena::new(512, 64).unwrap();
        let mut segment = arena.reserve(ReserveSize::Exact(5)).unwrap();
        segment.copy_from_slice(&[7, 0, b'y', b'o', b'!']);

        let mut packet = Greeting { text: vec![] };
        deserialize(&mut packet, segment, 5).unwrap();
        assert_eq!(packet.text, b"yo!");
        assert!(arena.stats().is_idle());
    }

    #[test]
    fn test_deserialize_id_mismatch_still_releases() {
        let arena = SegmentArena::new(512, 64).unwrap();
        let mut segment = arena.reserve(ReserveSize::Exact(2)).unwrap();
        segment.copy_from_slice(&[8, 0]);

        let mut packet = Greeting { text: vec![] };
        assert_eq!(
            deserialize(&mut packet, segment, 2),
            Err(PacketError::IdMismatch {
                expected: 7,
                actual: 8
            })
        );
        assert!(arena.stats().is_idle());
    }

    #[test]
    fn test_deserialize_rejects_missing_id() {
        let arena = SegmentArena::new(512, 64).unwrap();
        let segment = arena.reserve(ReserveSize::Exact(1)).unwrap();
        let mut packet = Greeting { text: vec![] };
        assert!(matches!(
            deserialize(&mut packet, segment, 1),
            Err(PacketError::Malformed(_))
        ));
    }
}
