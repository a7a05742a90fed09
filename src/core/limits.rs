/*!
 * Transport Limits and Constants
 *
 * Centralized location for wire constants and default arena geometry.
 */

use std::time::Duration;

// =============================================================================
// WIRE FORMAT
// =============================================================================

/// Frame length prefix size
/// Every frame on the wire starts with a little-endian u16 payload length
pub const HEADER_BYTES: usize = 2;

/// Packet id size at the front of every payload
pub const PACKET_ID_BYTES: usize = 2;

/// Largest payload a frame header can describe
pub const MAX_FRAME_PAYLOAD: usize = u16::MAX as usize;

// =============================================================================
// ARENA GEOMETRY
// =============================================================================

/// Default arena capacity (8KB)
pub const DEFAULT_ARENA_CAPACITY: usize = 8192;

/// Default segment size (256B), giving 32 segments per default arena
pub const DEFAULT_SEGMENT_SIZE: usize = 256;

/// Largest segment that still fits a full frame (header + max payload)
pub const MAX_SEGMENT_SIZE: usize = MAX_FRAME_PAYLOAD + HEADER_BYTES;

/// Upper bound on segments per arena (indices are u32)
pub const MAX_SEGMENT_COUNT: usize = u32::MAX as usize;

// =============================================================================
// SESSION
// =============================================================================

/// Reply attempts after a full send arena before giving up
pub const DEFAULT_SEND_RETRIES: u32 = 3;

/// Pause between reply attempts under backpressure
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(5);
