/*!
 * Arena Types
 * Reservation sizes, statistics and errors for segment arenas
 */

use crate::core::types::SegmentIndex;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How much of a segment a reservation exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveSize {
    /// Skip the frame header; expose `segment_size - HEADER_BYTES` bytes after it
    Framed,
    /// Expose exactly `n` bytes from the segment's first byte
    Exact(usize),
}

/// Arena error types
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Diagnostic)]
#[serde(rename_all = "snake_case", tag = "error", content = "details")]
pub enum ArenaError {
    #[error("Arena full: all {segments} segments are leased or awaiting reclaim")]
    #[diagnostic(
        code(arena::full),
        help("Release outstanding segments or retry once in-flight I/O completes.")
    )]
    Full { segments: usize },

    #[error("Invalid release of segment {index}: not currently leased")]
    #[diagnostic(
        code(arena::invalid_release),
        help("Each reservation must be released exactly once by its holder.")
    )]
    InvalidRelease { index: SegmentIndex },

    #[error("Requested size {requested} exceeds segment capacity {max}")]
    #[diagnostic(code(arena::invalid_size))]
    InvalidSize { requested: usize, max: usize },

    #[error("Invalid arena geometry: {0}")]
    #[diagnostic(code(arena::invalid_geometry))]
    InvalidGeometry(String),
}

impl ArenaError {
    #[inline]
    pub fn is_full(&self) -> bool {
        matches!(self, ArenaError::Full { .. })
    }
}

/// Arena statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ArenaStats {
    pub segment_count: usize,
    pub segment_size: usize,
    /// Segments held by a live lease
    pub leased: usize,
    /// Released out of order, waiting for older leases to be returned
    pub pending_reclaim: usize,
    /// Segments `reserve` can hand out right now
    pub free: usize,
    pub total_reserved: u64,
    pub total_released: u64,
    pub full_rejections: u64,
}

impl ArenaStats {
    #[inline]
    pub fn is_idle(&self) -> bool {
        self.leased == 0 && self.pending_reclaim == 0
    }
}
