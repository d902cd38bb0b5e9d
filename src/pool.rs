use std::num::NonZeroUsize;

use tracing::info;

use crate::{
  arena::Arena,
  error::{PoolError, Result},
  stats::PoolStats,
};

/// Opaque reference to a live allocation.
///
/// Wraps the payload's byte offset inside the arena, which is always at least
/// one header past the start, so it is never zero. `Option<Handle>` is the
/// nullable handle and has the size of a `usize`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(NonZeroUsize);

impl Handle {
  /// Payload offset from the start of the arena.
  #[inline]
  #[must_use]
  pub const fn offset(self) -> usize {
    self.0.get()
  }

  fn from_offset(offset: usize) -> Result<Self> {
    NonZeroUsize::new(offset).map(Self).ok_or(PoolError::Corrupted("payload offset of zero"))
  }
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
  allocations: usize,
  deallocations: usize,
  failed_allocations: usize,
}

impl Counters {
  const ZERO: Self = Self {
    allocations: 0,
    deallocations: 0,
    failed_allocations: 0,
  };
}

/// A malloc/free-style pool over one pre-reserved arena.
///
/// A `Pool` starts uninitialized; [`init`](Self::init) reserves the arena and
/// [`deinit`](Self::deinit) releases it. Every operation either succeeds
/// completely or leaves the pool exactly as it found it.
///
/// # Thread Safety
///
/// This pool is NOT thread-safe. Keep it on one thread, wrap it in a mutex,
/// or go through [`crate::global`], which does the latter.
///
/// # Example
///
/// ```rust
/// use rpool::Pool;
///
/// let mut pool = Pool::new();
/// pool.init(1024)?;
///
/// let handle = pool.alloc(100)?;
/// pool.bytes_mut(handle)?[0] = 5;
/// assert_eq!(pool.bytes(handle)?[0], 5);
///
/// pool.free(handle)?;
/// pool.free(None)?;
/// pool.deinit()?;
/// # Ok::<(), rpool::PoolError>(())
/// ```
#[derive(Debug)]
pub struct Pool {
  arena: Option<Arena>,
  counters: Counters,
}

impl Default for Pool {
  fn default() -> Self {
    Self::new()
  }
}

impl Pool {
  /// Creates an uninitialized pool. No memory is reserved until `init`.
  #[must_use]
  pub const fn new() -> Self {
    Self { arena: None, counters: Counters::ZERO }
  }

  #[inline]
  #[must_use]
  pub fn is_initialized(&self) -> bool {
    self.arena.is_some()
  }

  /// Reserves an arena of `capacity` bytes.
  ///
  /// # Errors
  ///
  /// `AlreadyInitialized` on a live pool, `InvalidArgument` for a zero (or
  /// smaller than one header) capacity, `OutOfMemory` if the buffer cannot
  /// be mapped.
  pub fn init(
    &mut self,
    capacity: usize,
  ) -> Result<()> {
    if self.arena.is_some() {
      return Err(PoolError::AlreadyInitialized);
    }

    self.arena = Some(Arena::create(capacity)?);
    self.counters = Counters::ZERO;
    Ok(())
  }

  /// Allocates `size` payload bytes with a first-fit search.
  ///
  /// # Errors
  ///
  /// `NotInitialized`, `InvalidArgument` for a zero size, or `OutOfMemory`
  /// when no free block is large enough.
  pub fn alloc(
    &mut self,
    size: usize,
  ) -> Result<Handle> {
    let arena = self.arena.as_mut().ok_or(PoolError::NotInitialized)?;

    match arena.allocate(size).and_then(Handle::from_offset) {
      Ok(handle) => {
        self.counters.allocations += 1;
        Ok(handle)
      },
      Err(err) => {
        if matches!(err, PoolError::OutOfMemory { .. }) {
          self.counters.failed_allocations += 1;
        }
        Err(err)
      },
    }
  }

  /// Returns an allocation to the pool, merging it with free neighbours.
  ///
  /// A `None` handle is a no-op that always succeeds, initialized or not.
  ///
  /// # Errors
  ///
  /// `NotInitialized`, `InvalidPointer` for a handle that does not lead to a
  /// live block of this pool, `DoubleFree` for a block that is already free.
  pub fn free<H>(
    &mut self,
    handle: H,
  ) -> Result<()>
  where
    H: Into<Option<Handle>>,
  {
    let Some(handle) = handle.into() else {
      return Ok(());
    };

    let arena = self.arena.as_mut().ok_or(PoolError::NotInitialized)?;
    arena.release(handle.offset())?;
    self.counters.deallocations += 1;
    Ok(())
  }

  /// Releases the arena. Handles from it must not be used afterwards; the
  /// pool can be initialized again.
  ///
  /// # Errors
  ///
  /// `NotInitialized` if there is nothing to release.
  pub fn deinit(&mut self) -> Result<()> {
    let arena = self.arena.take().ok_or(PoolError::NotInitialized)?;

    info!(
      allocations = self.counters.allocations,
      deallocations = self.counters.deallocations,
      failed = self.counters.failed_allocations,
      "pool deinitialized"
    );
    arena.destroy();
    self.counters = Counters::ZERO;
    Ok(())
  }

  /// Payload bytes granted to `handle`; at least the requested size.
  pub fn usable_size(
    &self,
    handle: Handle,
  ) -> Result<usize> {
    Ok(self.bytes(handle)?.len())
  }

  /// Read access to the payload of a live allocation.
  pub fn bytes(
    &self,
    handle: Handle,
  ) -> Result<&[u8]> {
    self.arena()?.payload(handle.offset())
  }

  /// Write access to the payload of a live allocation.
  pub fn bytes_mut(
    &mut self,
    handle: Handle,
  ) -> Result<&mut [u8]> {
    self.arena.as_mut().ok_or(PoolError::NotInitialized)?.payload_mut(handle.offset())
  }

  /// Raw payload address for callers that need malloc-style pointers.
  ///
  /// The pointer stays valid until the handle is freed or the pool is
  /// deinitialized.
  pub fn as_mut_ptr(
    &mut self,
    handle: Handle,
  ) -> Result<*mut u8> {
    self.arena.as_mut().ok_or(PoolError::NotInitialized)?.payload_ptr(handle.offset())
  }

  /// Snapshot of capacity, free-list shape and operation counters.
  pub fn stats(&self) -> Result<PoolStats> {
    let arena = self.arena()?;
    let largest_free_extent = arena.free_extents().map(|(_, extent)| extent).max().unwrap_or(0);

    Ok(PoolStats {
      total_capacity: arena.total_capacity(),
      free_capacity: arena.free_capacity(),
      used_bytes: arena.total_capacity() - arena.free_capacity(),
      free_blocks: arena.free_blocks(),
      largest_free_extent,
      live_allocations: self.counters.allocations - self.counters.deallocations,
      allocations: self.counters.allocations,
      deallocations: self.counters.deallocations,
      failed_allocations: self.counters.failed_allocations,
    })
  }

  /// Free blocks in free-list order as `(offset, extent)` pairs.
  pub fn free_extents(&self) -> Result<Vec<(usize, usize)>> {
    Ok(self.arena()?.free_extents().collect())
  }

  /// Verifies the block partition, the free list and the free capacity.
  ///
  /// # Errors
  ///
  /// `Corrupted` describing the first inconsistency found.
  pub fn check(&self) -> Result<()> {
    self.arena()?.check()
  }

  fn arena(&self) -> Result<&Arena> {
    self.arena.as_ref().ok_or(PoolError::NotInitialized)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::HEADER_SIZE;

  #[test]
  fn operations_before_init_fail() {
    let mut pool = Pool::new();

    assert_eq!(pool.alloc(8), Err(PoolError::NotInitialized));
    assert_eq!(pool.deinit(), Err(PoolError::NotInitialized));
    assert_eq!(pool.stats(), Err(PoolError::NotInitialized));
    assert_eq!(pool.free(None), Ok(()));
  }

  #[test]
  fn init_twice_is_rejected() {
    let mut pool = Pool::new();
    pool.init(512).unwrap();
    let handle = pool.alloc(10).unwrap();

    assert_eq!(pool.init(4096), Err(PoolError::AlreadyInitialized));

    // The original arena and its allocation survive the rejected call.
    assert_eq!(pool.stats().unwrap().total_capacity, 512);
    assert_eq!(pool.usable_size(handle), Ok(10));
  }

  #[test]
  fn deinit_allows_reinit() {
    let mut pool = Pool::new();
    pool.init(256).unwrap();
    pool.alloc(16).unwrap();
    pool.deinit().unwrap();

    assert!(!pool.is_initialized());
    pool.init(1024).unwrap();

    let stats = pool.stats().unwrap();
    assert_eq!(stats.total_capacity, 1024);
    assert_eq!(stats.free_capacity, 1024);
    assert_eq!(stats.allocations, 0);
  }

  #[test]
  fn zero_size_alloc_is_invalid_and_not_counted() {
    let mut pool = Pool::new();
    pool.init(256).unwrap();

    assert!(matches!(pool.alloc(0), Err(PoolError::InvalidArgument(_))));
    assert_eq!(pool.stats().unwrap().failed_allocations, 0);
  }

  #[test]
  fn handle_is_header_past_block_start() {
    let mut pool = Pool::new();
    pool.init(512).unwrap();

    let first = pool.alloc(40).unwrap();
    let second = pool.alloc(40).unwrap();

    assert_eq!(first.offset(), HEADER_SIZE);
    assert_eq!(second.offset(), first.offset() + 40 + HEADER_SIZE);
  }

  #[test]
  fn counters_track_operations() {
    let mut pool = Pool::new();
    pool.init(HEADER_SIZE + 64).unwrap();

    let handle = pool.alloc(64).unwrap();
    assert!(matches!(pool.alloc(1), Err(PoolError::OutOfMemory { .. })));
    pool.free(handle).unwrap();

    let stats = pool.stats().unwrap();
    assert_eq!(stats.allocations, 1);
    assert_eq!(stats.deallocations, 1);
    assert_eq!(stats.failed_allocations, 1);
    assert_eq!(stats.live_allocations, 0);
  }

  #[test]
  fn rejected_free_is_not_counted() {
    let mut pool = Pool::new();
    pool.init(256).unwrap();
    let handle = pool.alloc(8).unwrap();

    pool.free(handle).unwrap();
    assert_eq!(pool.free(handle), Err(PoolError::DoubleFree(handle.offset())));
    assert_eq!(pool.stats().unwrap().deallocations, 1);
  }

  #[test]
  fn live_allocations_counts_outstanding_handles() {
    let mut pool = Pool::new();
    pool.init(1024).unwrap();

    let first = pool.alloc(16).unwrap();
    let second = pool.alloc(16).unwrap();
    assert_eq!(pool.stats().unwrap().live_allocations, 2);

    pool.free(first).unwrap();
    pool.free(None).unwrap();
    assert_eq!(pool.free(first), Err(PoolError::DoubleFree(first.offset())));
    assert_eq!(pool.stats().unwrap().live_allocations, 1);

    pool.free(second).unwrap();
    assert_eq!(pool.stats().unwrap().live_allocations, 0);
  }

  #[test]
  fn stale_handle_has_no_bytes() {
    let mut pool = Pool::new();
    pool.init(256).unwrap();
    let handle = pool.alloc(8).unwrap();
    pool.free(handle).unwrap();

    assert_eq!(pool.bytes(handle), Err(PoolError::DoubleFree(handle.offset())));
    assert!(pool.as_mut_ptr(handle).is_err());
  }
}
