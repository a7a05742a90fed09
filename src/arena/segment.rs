/*!
 * Segment Handle
 *
 * RAII lease over one arena segment. The handle is the only way to reach the
 * segment's bytes, and releasing consumes it, so a view can never be touched
 * after its segment went back to the arena.
 */

use super::allocator::SegmentArena;
use super::types::ArenaError;
use crate::core::limits::HEADER_BYTES;
use crate::core::types::{Generation, SegmentIndex};
use std::ops::{Deref, DerefMut};
use tracing::{error, trace};

/// Exclusive lease on one segment of a [`SegmentArena`]
///
/// Dereferences to the reserved view. Dropping an unreleased segment
/// releases it.
pub struct Segment {
    arena: SegmentArena,
    index: SegmentIndex,
    generation: Generation,
    offset: usize,
    len: usize,
    released: bool,
}

impl Segment {
    pub(crate) fn new(
        arena: SegmentArena,
        index: SegmentIndex,
        generation: Generation,
        offset: usize,
        len: usize,
    ) -> Self {
        Self {
            arena,
            index,
            generation,
            offset,
            len,
            released: false,
        }
    }

    /// 1-based index of the leased segment
    #[inline]
    pub fn index(&self) -> SegmentIndex {
        self.index
    }

    #[inline]
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Length of the reserved view
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the view starts after reserved frame header space
    #[inline]
    pub fn is_framed(&self) -> bool {
        self.offset == HEADER_BYTES
    }

    /// Arena the lease belongs to
    #[inline]
    pub fn arena(&self) -> &SegmentArena {
        &self.arena
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: this handle owns the lease and offset + len <= segment_size
        unsafe { std::slice::from_raw_parts(self.arena.segment_ptr(self.index, self.offset), self.len) }
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: this handle owns the lease and offset + len <= segment_size
        unsafe {
            std::slice::from_raw_parts_mut(self.arena.segment_ptr(self.index, self.offset), self.len)
        }
    }

    /// On-wire frame view: `length + HEADER_BYTES` bytes from the segment's
    /// first byte, covering the header slot and `length` payload bytes.
    pub fn view_for(&mut self, length: usize) -> Result<&mut [u8], ArenaError> {
        let max = self.arena.segment_size();
        let frame_len = length
            .checked_add(HEADER_BYTES)
            .filter(|&total| total <= max)
            .ok_or(ArenaError::InvalidSize {
                requested: length.saturating_add(HEADER_BYTES),
                max,
            })?;

        // SAFETY: this handle owns the lease and frame_len <= segment_size
        Ok(unsafe { std::slice::from_raw_parts_mut(self.arena.segment_ptr(self.index, 0), frame_len) })
    }

    /// Return the segment to its arena
    pub fn release(mut self) -> Result<(), ArenaError> {
        self.released = true;
        self.arena.release_index(self.index, Some(self.generation))
    }

    /// Whether the arena still considers this handle the live lease
    pub fn is_live(&self) -> bool {
        !self.released && self.arena.is_leased(self.index, self.generation)
    }
}

impl Deref for Segment {
    type Target = [u8];

    #[inline(always)]
    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl DerefMut for Segment {
    #[inline(always)]
    fn deref_mut(&mut self) -> &mut [u8] {
        self.as_mut_slice()
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        match self.arena.release_index(self.index, Some(self.generation)) {
            Ok(()) => trace!(index = self.index, "Segment released on drop"),
            Err(e) => error!(index = self.index, error = %e, "Segment drop failed to release"),
        }
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("index", &self.index)
            .field("generation", &self.generation)
            .field("offset", &self.offset)
            .field("len", &self.len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ReserveSize;

    #[test]
    fn test_drop_releases() {
        let arena = SegmentArena::new(512, 256).unwrap();
        {
            let segment = arena.reserve(ReserveSize::Framed).unwrap();
            assert!(segment.is_live());
            assert_eq!(arena.stats().leased, 1);
        }
        assert_eq!(arena.stats().leased, 0);
        assert_eq!(arena.stats().total_released, 1);
    }

    #[test]
    fn test_explicit_release_counts_once() {
        let arena = SegmentArena::new(512, 256).unwrap();
        let segment = arena.reserve(ReserveSize::Framed).unwrap();
        segment.release().unwrap();
        let stats = arena.stats();
        assert_eq!(stats.total_released, 1);
        assert!(stats.is_idle());
    }

    #[test]
    fn test_view_for_bounds() {
        let arena = SegmentArena::new(512, 256).unwrap();
        let mut segment = arena.reserve(ReserveSize::Framed).unwrap();
        assert_eq!(segment.view_for(0).unwrap().len(), HEADER_BYTES);
        assert_eq!(segment.view_for(254).unwrap().len(), 256);
        assert_eq!(
            segment.view_for(255).unwrap_err(),
            ArenaError::InvalidSize {
                requested: 257,
                max: 256
            }
        );
        assert!(segment.view_for(usize::MAX).is_err());
    }

    #[test]
    fn test_segment_keeps_arena_alive() {
        let segment = {
            let arena = SegmentArena::new(256, 256).unwrap();
            arena.reserve(ReserveSize::Exact(4)).unwrap()
        };
        assert_eq!(segment.len(), 4);
        assert!(segment.is_live());
    }
}
