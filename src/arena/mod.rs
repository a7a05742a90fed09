/*!
 * Segment Arena
 *
 * Low-allocation buffer management for framed transports:
 * - One fixed byte buffer per arena, partitioned into equal segments
 * - Ring-cursor allocation with explicit outstanding count
 * - RAII segment leases released exactly once
 *
 * # Performance
 *
 * - Reserve/release: O(1) amortized under one short mutex hold
 * - No per-frame heap allocation after arena construction
 */

mod allocator;
mod ring;
mod segment;
mod types;

pub use allocator::SegmentArena;
pub use segment::Segment;
pub use types::{ArenaError, ArenaStats, ReserveSize};
