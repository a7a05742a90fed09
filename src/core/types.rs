/*!
 * Core Types
 * Common types used across the transport core
 */

/// 16-bit packet identifier carried at the front of every payload
pub type PacketId = u16;

/// 1-based segment index inside an arena
pub type SegmentIndex = u32;

/// Lease generation for a segment slot
pub type Generation = u32;

/// Common result type for crate operations
pub type SegnetResult<T> = Result<T, super::errors::SegnetError>;
