/// Point-in-time view of a pool, returned by [`crate::Pool::stats`].
///
/// Byte figures count headers: `free_capacity + used_bytes == total_capacity`
/// always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
  /// Size of the arena.
  pub total_capacity: usize,
  /// Extents of all free blocks.
  pub free_capacity: usize,
  /// Extents of all live blocks, payload padding included.
  pub used_bytes: usize,
  /// Length of the free list.
  pub free_blocks: usize,
  /// Largest single free extent; a request fits only if its size plus one
  /// header is at most this.
  pub largest_free_extent: usize,
  /// Allocations not yet freed.
  pub live_allocations: usize,
  /// Successful allocations since `init`.
  pub allocations: usize,
  /// Successful frees since `init`, not counting null handles.
  pub deallocations: usize,
  /// Allocations refused for lack of memory since `init`.
  pub failed_allocations: usize,
}

impl PoolStats {
  /// Share of free capacity that lies outside the largest free block.
  ///
  /// 0.0 means all free memory is one block; values near 1.0 mean it is
  /// scattered in small pieces.
  #[must_use]
  pub fn fragmentation(&self) -> f64 {
    if self.free_capacity == 0 {
      return 0.0;
    }

    1.0 - self.largest_free_extent as f64 / self.free_capacity as f64
  }
}
