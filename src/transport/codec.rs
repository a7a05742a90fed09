/*!
 * Frame Codec
 *
 * `frame := u16_le(payload_len) || payload`, `payload := u16_le(packet_id) || fields`
 */

use super::types::TransportError;
use crate::core::limits::{HEADER_BYTES, MAX_FRAME_PAYLOAD, PACKET_ID_BYTES};
use crate::core::types::PacketId;
use bytes::{Buf, BufMut};

/// Write the payload length into the first `HEADER_BYTES` of `frame`
///
/// `frame` is header slot followed by payload; returns the encoded length.
pub fn encode_header(frame: &mut [u8]) -> Result<usize, TransportError> {
    let payload_len = frame
        .len()
        .checked_sub(HEADER_BYTES)
        .ok_or(TransportError::MissingHeader(frame.len()))?;
    if payload_len > MAX_FRAME_PAYLOAD {
        return Err(TransportError::FrameTooLarge {
            len: payload_len,
            max: MAX_FRAME_PAYLOAD,
        });
    }

    let mut header = &mut frame[..HEADER_BYTES];
    header.put_u16_le(payload_len as u16);
    Ok(payload_len)
}

/// Read a payload length from a complete header
#[inline]
pub fn decode_header(header: &[u8]) -> Option<usize> {
    if header.len() < HEADER_BYTES {
        return None;
    }
    let mut buf = &header[..HEADER_BYTES];
    Some(buf.get_u16_le() as usize)
}

#[inline]
pub fn write_packet_id(payload: &mut [u8], id: PacketId) -> Option<()> {
    let mut slot = payload.get_mut(..PACKET_ID_BYTES)?;
    slot.put_u16_le(id);
    Some(())
}

#[inline]
pub fn read_packet_id(payload: &[u8]) -> Option<PacketId> {
    let mut slot = payload.get(..PACKET_ID_BYTES)?;
    Some(slot.get_u16_le())
}
