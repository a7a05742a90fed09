/*!
 * Ring Cursors
 *
 * Bookkeeping behind a segment arena. Indices are handed out in strictly
 * increasing order (mod N) from `next_to_allocate`; `free_boundary` is the
 * oldest index not yet reclaimed. The free range is
 * `[next_to_allocate, free_boundary)` on the ring and `outstanding` says how
 * many slots sit outside it, so full and empty never share a representation.
 *
 * A release marks its slot; `free_boundary` then sweeps forward over every
 * consecutive released slot. Releasing out of allocation order therefore
 * delays reuse of that slot instead of corrupting the free range.
 */

use super::types::ArenaError;
use crate::core::types::{Generation, SegmentIndex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Free,
    Leased(Generation),
    Released,
}

/// Lease handed out by [`RingState::reserve`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Lease {
    pub index: SegmentIndex,
    pub generation: Generation,
}

pub(crate) struct RingState {
    slots: Vec<SlotState>,
    generations: Vec<Generation>,
    next_to_allocate: usize,
    free_boundary: usize,
    outstanding: usize,
    leased: usize,
}

impl RingState {
    pub fn new(count: usize) -> Self {
        Self {
            slots: vec![SlotState::Free; count],
            generations: vec![0; count],
            next_to_allocate: 0,
            free_boundary: 0,
            outstanding: 0,
            leased: 0,
        }
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.outstanding == self.count()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.outstanding == 0
    }

    #[inline]
    pub fn leased(&self) -> usize {
        self.leased
    }

    #[inline]
    pub fn pending_reclaim(&self) -> usize {
        self.outstanding - self.leased
    }

    #[inline]
    pub fn free(&self) -> usize {
        self.count() - self.outstanding
    }

    pub fn reserve(&mut self) -> Result<Lease, ArenaError> {
        if self.is_full() {
            return Err(ArenaError::Full {
                segments: self.count(),
            });
        }

        let pos = self.next_to_allocate;
        debug_assert_eq!(self.slots[pos], SlotState::Free);

        let generation = self.generations[pos].wrapping_add(1);
        self.generations[pos] = generation;
        self.slots[pos] = SlotState::Leased(generation);

        self.next_to_allocate = (pos + 1) % self.count();
        self.outstanding += 1;
        self.leased += 1;

        Ok(Lease {
            index: (pos + 1) as SegmentIndex,
            generation,
        })
    }

    /// Release `index`, optionally checking the lease generation.
    /// Returns how many slots became reusable.
    pub fn release(
        &mut self,
        index: SegmentIndex,
        generation: Option<Generation>,
    ) -> Result<usize, ArenaError> {
        let pos = match (index as usize).checked_sub(1) {
            Some(pos) if pos < self.count() => pos,
            _ => return Err(ArenaError::InvalidRelease { index }),
        };

        match self.slots[pos] {
            SlotState::Leased(current) if generation.map_or(true, |g| g == current) => {
                self.slots[pos] = SlotState::Released;
                self.leased -= 1;
            }
            _ => return Err(ArenaError::InvalidRelease { index }),
        }

        Ok(self.reclaim())
    }

    fn reclaim(&mut self) -> usize {
        let mut reclaimed = 0;
        while self.outstanding > 0 && self.slots[self.free_boundary] == SlotState::Released {
            self.slots[self.free_boundary] = SlotState::Free;
            self.free_boundary = (self.free_boundary + 1) % self.count();
            self.outstanding -= 1;
            reclaimed += 1;
        }
        reclaimed
    }

    pub fn is_leased(&self, index: SegmentIndex, generation: Generation) -> bool {
        (index as usize)
            .checked_sub(1)
            .and_then(|pos| self.slots.get(pos))
            .map_or(false, |slot| *slot == SlotState::Leased(generation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_are_one_based_and_sequential() {
        let mut ring = RingState::new(3);
        let a = ring.reserve().unwrap();
        let b = ring.reserve().unwrap();
        assert_eq!(a.index, 1);
        assert_eq!(b.index, 2);
    }

    #[test]
    fn test_full_and_empty_are_distinct() {
        let mut ring = RingState::new(2);
        assert!(ring.is_empty());
        assert!(!ring.is_full());

        let a = ring.reserve().unwrap();
        let b = ring.reserve().unwrap();
        assert!(ring.is_full());
        assert!(!ring.is_empty());
        assert_eq!(ring.reserve(), Err(ArenaError::Full { segments: 2 }));

        ring.release(a.index, Some(a.generation)).unwrap();
        ring.release(b.index, Some(b.generation)).unwrap();
        assert!(ring.is_empty());
        assert_eq!(ring.free(), 2);
    }

    #[test]
    fn test_wraps_after_in_order_release() {
        let mut ring = RingState::new(2);
        let a = ring.reserve().unwrap();
        let b = ring.reserve().unwrap();
        ring.release(a.index, None).unwrap();

        let c = ring.reserve().unwrap();
        assert_eq!(c.index, 1);
        assert_eq!(c.generation, a.generation + 1);

        ring.release(b.index, None).unwrap();
        let d = ring.reserve().unwrap();
        assert_eq!(d.index, 2);
    }

    #[test]
    fn test_out_of_order_release_defers_reclaim() {
        let mut ring = RingState::new(3);
        let a = ring.reserve().unwrap();
        let b = ring.reserve().unwrap();
        let c = ring.reserve().unwrap();

        assert_eq!(ring.release(b.index, None).unwrap(), 0);
        assert_eq!(ring.pending_reclaim(), 1);
        assert_eq!(ring.free(), 0);

        assert_eq!(ring.release(a.index, None).unwrap(), 2);
        assert_eq!(ring.pending_reclaim(), 0);
        assert_eq!(ring.free(), 2);

        assert_eq!(ring.release(c.index, None).unwrap(), 1);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_double_release_rejected() {
        let mut ring = RingState::new(4);
        let a = ring.reserve().unwrap();
        let _b = ring.reserve().unwrap();
        ring.release(a.index, None).unwrap();
        assert_eq!(
            ring.release(a.index, None),
            Err(ArenaError::InvalidRelease { index: a.index })
        );
    }

    #[test]
    fn test_out_of_range_release_rejected() {
        let mut ring = RingState::new(4);
        assert!(ring.release(0, None).is_err());
        assert!(ring.release(5, None).is_err());
    }

    #[test]
    fn test_stale_generation_rejected() {
        let mut ring = RingState::new(1);
        let first = ring.reserve().unwrap();
        ring.release(first.index, Some(first.generation)).unwrap();
        let second = ring.reserve().unwrap();
        assert_eq!(second.index, first.index);

        assert!(ring.release(first.index, Some(first.generation)).is_err());
        assert!(ring.is_leased(second.index, second.generation));
        assert!(!ring.is_leased(first.index, first.generation));
    }
}
