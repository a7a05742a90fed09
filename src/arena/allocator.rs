/*!
 * Segment Arena
 *
 * One fixed byte buffer sliced into equal segments. Reservations hand out
 * exclusive leases over single segments; the ring cursors guarantee no index
 * is leased twice, which is what makes the disjoint mutable views sound.
 */

use super::ring::RingState;
use super::segment::Segment;
use super::types::{ArenaError, ArenaStats, ReserveSize};
use crate::core::config::ArenaConfig;
use crate::core::limits::HEADER_BYTES;
use crate::core::types::{Generation, SegmentIndex};
use parking_lot::Mutex;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, error, trace};

/// Fixed-size segment allocator over a single byte arena
///
/// Cloning is cheap and yields another handle to the same arena.
///
/// # Example
///
/// ```ignore
/// let arena = SegmentArena::new(8192, 256)?;
/// let mut segment = arena.reserve(ReserveSize::Framed)?;
/// segment[..5].copy_from_slice(b"hello");
/// segment.release()?;
/// ```
#[derive(Clone)]
pub struct SegmentArena {
    inner: Arc<ArenaInner>,
}

struct ArenaInner {
    storage: Box<[UnsafeCell<u8>]>,
    segment_size: usize,
    ring: Mutex<RingState>,
    space_available: Notify,
    total_reserved: AtomicU64,
    total_released: AtomicU64,
    full_rejections: AtomicU64,
}

// SAFETY: bytes in `storage` are only reached through `Segment` views, and the
// ring hands each index to at most one live lease at a time.
unsafe impl Sync for ArenaInner {}

impl SegmentArena {
    /// Create an arena of `capacity` bytes split into `segment_size` segments
    pub fn new(capacity: usize, segment_size: usize) -> Result<Self, ArenaError> {
        Self::from_config(&ArenaConfig::new(capacity, segment_size))
    }

    pub fn from_config(config: &ArenaConfig) -> Result<Self, ArenaError> {
        config.validate().map_err(ArenaError::InvalidGeometry)?;

        let segment_count = config.segment_count();
        let storage: Box<[UnsafeCell<u8>]> = (0..segment_count * config.segment_size)
            .map(|_| UnsafeCell::new(0))
            .collect();

        debug!(
            capacity = config.capacity,
            segment_size = config.segment_size,
            segment_count = segment_count,
            "Segment arena created"
        );

        Ok(Self {
            inner: Arc::new(ArenaInner {
                storage,
                segment_size: config.segment_size,
                ring: Mutex::new(RingState::new(segment_count)),
                space_available: Notify::new(),
                total_reserved: AtomicU64::new(0),
                total_released: AtomicU64::new(0),
                full_rejections: AtomicU64::new(0),
            }),
        })
    }

    #[inline]
    pub fn segment_size(&self) -> usize {
        self.inner.segment_size
    }

    #[inline]
    pub fn segment_count(&self) -> usize {
        self.inner.storage.len() / self.inner.segment_size
    }

    /// Largest payload a framed reservation can carry
    #[inline]
    pub fn max_payload(&self) -> usize {
        self.inner.segment_size - HEADER_BYTES
    }

    /// Lease the next free segment
    ///
    /// Fails with [`ArenaError::Full`] when every segment is leased or waiting
    /// for an older lease to be returned.
    pub fn reserve(&self, size: ReserveSize) -> Result<Segment, ArenaError> {
        let (offset, len) = self.view_bounds(size)?;

        let lease = self.inner.ring.lock().reserve();
        let lease = match lease {
            Ok(lease) => lease,
            Err(e) => {
                self.inner.full_rejections.fetch_add(1, Ordering::Relaxed);
                trace!(segments = self.segment_count(), "Arena full");
                return Err(e);
            }
        };

        self.inner.total_reserved.fetch_add(1, Ordering::Relaxed);
        trace!(
            index = lease.index,
            generation = lease.generation,
            len = len,
            "Segment reserved"
        );

        Ok(Segment::new(
            self.clone(),
            lease.index,
            lease.generation,
            offset,
            len,
        ))
    }

    /// Like [`reserve`](Self::reserve) but waits for a release instead of
    /// failing when the arena is full
    pub async fn reserve_wait(&self, size: ReserveSize) -> Result<Segment, ArenaError> {
        loop {
            let notified = self.inner.space_available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.reserve(size) {
                Err(e) if e.is_full() => notified.await,
                other => return other,
            }
        }
    }

    /// Arena statistics
    pub fn stats(&self) -> ArenaStats {
        let ring = self.inner.ring.lock();
        ArenaStats {
            segment_count: ring.count(),
            segment_size: self.inner.segment_size,
            leased: ring.leased(),
            pending_reclaim: ring.pending_reclaim(),
            free: ring.free(),
            total_reserved: self.inner.total_reserved.load(Ordering::Relaxed),
            total_released: self.inner.total_released.load(Ordering::Relaxed),
            full_rejections: self.inner.full_rejections.load(Ordering::Relaxed),
        }
    }

    /// Whether two handles refer to the same arena
    #[inline]
    pub fn same_arena(&self, other: &SegmentArena) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn view_bounds(&self, size: ReserveSize) -> Result<(usize, usize), ArenaError> {
        let segment_size = self.inner.segment_size;
        match size {
            ReserveSize::Framed => Ok((HEADER_BYTES, segment_size - HEADER_BYTES)),
            ReserveSize::Exact(requested) if requested <= segment_size => Ok((0, requested)),
            ReserveSize::Exact(requested) => Err(ArenaError::InvalidSize {
                requested,
                max: segment_size,
            }),
        }
    }

    /// Return a lease to the ring. `generation` of `None` skips the stale
    /// handle check.
    pub(crate) fn release_index(
        &self,
        index: SegmentIndex,
        generation: Option<Generation>,
    ) -> Result<(), ArenaError> {
        let released = self.inner.ring.lock().release(index, generation);
        match released {
            Ok(reclaimed) => {
                self.inner.total_released.fetch_add(1, Ordering::Relaxed);
                trace!(index = index, reclaimed = reclaimed, "Segment released");
                if reclaimed > 0 {
                    self.inner.space_available.notify_waiters();
                }
                Ok(())
            }
            Err(e) => {
                error!(index = index, generation = ?generation, "Release of segment not currently leased");
                debug_assert!(false, "release of segment {} not currently leased", index);
                Err(e)
            }
        }
    }

    pub(crate) fn is_leased(&self, index: SegmentIndex, generation: Generation) -> bool {
        self.inner.ring.lock().is_leased(index, generation)
    }

    /// Raw pointer to byte `offset` of segment `index`.
    ///
    /// # Safety
    ///
    /// Caller must hold the live lease for `index` and keep
    /// `offset + len <= segment_size` for any slice built from the pointer.
    #[inline]
    pub(crate) unsafe fn segment_ptr(&self, index: SegmentIndex, offset: usize) -> *mut u8 {
        debug_assert!(index >= 1 && (index as usize) <= self.segment_count());
        debug_assert!(offset <= self.inner.segment_size);
        let start = (index as usize - 1) * self.inner.segment_size + offset;
        UnsafeCell::raw_get(self.inner.storage.as_ptr().add(start))
    }
}

impl std::fmt::Debug for SegmentArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentArena")
            .field("segment_size", &self.segment_size())
            .field("segment_count", &self.segment_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn arena() -> SegmentArena {
        SegmentArena::new(1024, 256).unwrap()
    }

    #[test]
    fn test_geometry() {
        let arena = SegmentArena::new(1000, 256).unwrap();
        assert_eq!(arena.segment_count(), 3);
        assert_eq!(arena.max_payload(), 254);
    }

    #[test]
    fn test_invalid_geometry() {
        assert!(matches!(
            SegmentArena::new(1024, 2),
            Err(ArenaError::InvalidGeometry(_))
        ));
        assert!(SegmentArena::new(10, 256).is_err());
    }

    #[test]
    fn test_framed_reserve_skips_header() {
        let arena = arena();
        let segment = arena.reserve(ReserveSize::Framed).unwrap();
        assert_eq!(segment.index(), 1);
        assert_eq!(segment.len(), 256 - HEADER_BYTES);
        assert!(segment.is_framed());
    }

    #[test]
    fn test_exact_reserve_starts_at_segment() {
        let arena = arena();
        let segment = arena.reserve(ReserveSize::Exact(10)).unwrap();
        assert_eq!(segment.len(), 10);
        assert!(!segment.is_framed());

        let whole = arena.reserve(ReserveSize::Exact(256)).unwrap();
        assert_eq!(whole.len(), 256);
    }

    #[test]
    fn test_oversized_exact_reserve_rejected_without_lease() {
        let arena = arena();
        assert_eq!(
            arena.reserve(ReserveSize::Exact(257)).unwrap_err(),
            ArenaError::InvalidSize {
                requested: 257,
                max: 256
            }
        );
        assert_eq!(arena.stats().leased, 0);
        assert_eq!(arena.stats().total_reserved, 0);
    }

    #[test]
    fn test_full_on_extra_reserve() {
        let arena = arena();
        let held: Vec<_> = (0..4)
            .map(|_| arena.reserve(ReserveSize::Framed).unwrap())
            .collect();
        assert!(arena.reserve(ReserveSize::Framed).unwrap_err().is_full());
        assert_eq!(arena.stats().full_rejections, 1);
        drop(held);
        assert!(arena.stats().is_idle());
    }

    #[test]
    fn test_views_are_disjoint() {
        let arena = arena();
        let mut a = arena.reserve(ReserveSize::Exact(256)).unwrap();
        let mut b = arena.reserve(ReserveSize::Exact(256)).unwrap();
        a.fill(0xAA);
        b.fill(0xBB);
        assert!(a.iter().all(|&x| x == 0xAA));
        assert!(b.iter().all(|&x| x == 0xBB));
    }

    #[test]
    fn test_framed_view_shares_bytes_with_frame_view() {
        let arena = arena();
        let mut segment = arena.reserve(ReserveSize::Framed).unwrap();
        segment[..3].copy_from_slice(b"abc");
        let frame = segment.view_for(3).unwrap();
        assert_eq!(frame.len(), 3 + HEADER_BYTES);
        assert_eq!(&frame[HEADER_BYTES..], b"abc");
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic(expected = "not currently leased"))]
    fn test_raw_double_release_is_invalid() {
        let arena = arena();
        let segment = arena.reserve(ReserveSize::Framed).unwrap();
        let index = segment.index();
        segment.release().unwrap();
        assert_eq!(
            arena.release_index(index, None),
            Err(ArenaError::InvalidRelease { index })
        );
        assert!(arena.stats().is_idle());
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic(expected = "not currently leased"))]
    fn test_stale_handle_cannot_release_new_lease() {
        let arena = SegmentArena::new(256, 256).unwrap();
        let first = arena.reserve(ReserveSize::Framed).unwrap();
        let index = first.index();
        arena.release_index(index, None).unwrap();

        let second = arena.reserve(ReserveSize::Framed).unwrap();
        assert_eq!(second.index(), index);

        assert!(first.release().is_err());
        assert_eq!(arena.stats().leased, 1);
        second.release().unwrap();
    }

    #[tokio::test]
    async fn test_reserve_wait_resumes_after_release() {
        let arena = SegmentArena::new(256, 256).unwrap();
        let held = arena.reserve(ReserveSize::Framed).unwrap();

        let waiter = {
            let arena = arena.clone();
            tokio::spawn(async move { arena.reserve_wait(ReserveSize::Exact(2)).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        held.release().unwrap();
        let segment = waiter.await.unwrap().unwrap();
        assert_eq!(segment.len(), 2);
    }

    #[tokio::test]
    async fn test_reserve_wait_fails_fast_on_invalid_size() {
        let arena = arena();
        let err = arena.reserve_wait(ReserveSize::Exact(4096)).await.unwrap_err();
        assert!(matches!(err, ArenaError::InvalidSize { .. }));
    }
}
