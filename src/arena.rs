use std::{ptr::NonNull, slice};

use libc::{MAP_ANONYMOUS, MAP_FAILED, MAP_PRIVATE, PROT_READ, PROT_WRITE, c_void, mmap, munmap};
use tracing::{debug, info, warn};

use crate::{
  block::{BlockState, HEADER_SIZE, Header},
  error::{PoolError, Result},
  free_list::{self, FreeList},
};

/// One fixed-capacity byte buffer carved into headed blocks.
///
/// ```text
///   offset 0                                                    capacity
///   ┌────┬──────────┬────┬───────────────┬────┬──────┬────┬───────────┐
///   │ H  │ used     │ H  │ free          │ H  │ used │ H  │ free      │
///   └────┴──────────┴────┴───────────────┴────┴──────┴────┴───────────┘
///                     ▲                                 │
///       head ─────────┼─────────────────────────────────┘  (list order is
///                     └──────────────── next ─── tail      insertion order)
/// ```
///
/// The buffer is mapped once in [`Arena::create`] and never resized. Blocks
/// always partition it exactly: walking from offset 0 by header extents
/// lands on `capacity`.
///
/// # Thread Safety
///
/// An arena may move between threads but is not synchronized; every method
/// that touches blocks takes `&mut self`.
pub struct Arena {
  mapping: Mapping,
  free_capacity: usize,
  free_list: FreeList,
}

/// Anonymous private mapping backing an arena; unmapped on drop.
struct Mapping {
  base: NonNull<u8>,
  len: usize,
}

// The mapping is owned exclusively by its arena and only reachable through it.
unsafe impl Send for Mapping {}

impl Mapping {
  fn new(len: usize) -> Option<Self> {
    let address = unsafe {
      mmap(
        std::ptr::null_mut(),
        len,
        PROT_READ | PROT_WRITE,
        MAP_PRIVATE | MAP_ANONYMOUS,
        -1,
        0,
      )
    };

    if address == MAP_FAILED {
      return None;
    }

    NonNull::new(address.cast::<u8>()).map(|base| Self { base, len })
  }

  fn as_slice(&self) -> &[u8] {
    unsafe { slice::from_raw_parts(self.base.as_ptr(), self.len) }
  }

  fn as_mut_slice(&mut self) -> &mut [u8] {
    unsafe { slice::from_raw_parts_mut(self.base.as_ptr(), self.len) }
  }
}

impl Drop for Mapping {
  fn drop(&mut self) {
    unsafe {
      munmap(self.base.as_ptr().cast::<c_void>(), self.len);
    }
  }
}

impl Arena {
  /// Maps `capacity` bytes and lays a single free block across them.
  pub fn create(capacity: usize) -> Result<Self> {
    if capacity == 0 {
      return Err(PoolError::InvalidArgument("capacity must be greater than zero"));
    }

    if capacity < HEADER_SIZE {
      return Err(PoolError::InvalidArgument("capacity cannot hold a block header"));
    }

    let Some(mut mapping) = Mapping::new(capacity) else {
      warn!(capacity, "mmap refused arena mapping");
      return Err(PoolError::OutOfMemory { requested: capacity, free: 0 });
    };

    let free_list = FreeList::spanning(mapping.as_mut_slice());
    let arena = Self { mapping, free_capacity: capacity, free_list };

    info!(capacity, base = ?arena.mapping.base, "arena created");
    Ok(arena)
  }

  /// Unmaps the buffer. Every handle derived from this arena is dead.
  pub fn destroy(self) {
    info!(
      capacity = self.mapping.len,
      free = self.free_capacity,
      free_blocks = self.free_list.len(),
      "arena destroyed"
    );
  }

  pub fn total_capacity(&self) -> usize {
    self.mapping.len
  }

  /// Sum of the extents of all free blocks, headers included.
  pub fn free_capacity(&self) -> usize {
    self.free_capacity
  }

  /// Number of nodes on the free list.
  pub fn free_blocks(&self) -> usize {
    self.free_list.len()
  }

  /// Free blocks in list order, as `(offset, extent)` pairs.
  pub fn free_extents(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
    self.free_list.iter(self.mapping.as_slice()).map(|(offset, header)| (offset, header.extent()))
  }

  /// First-fit allocation of `size` payload bytes.
  ///
  /// Returns the payload offset, `HEADER_SIZE` past the block start.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Result<usize> {
    if size == 0 {
      return Err(PoolError::InvalidArgument("allocation size must be greater than zero"));
    }

    let out_of_memory = PoolError::OutOfMemory {
      requested: size.saturating_add(HEADER_SIZE),
      free: self.free_capacity,
    };

    let needed = size.checked_add(HEADER_SIZE).ok_or(out_of_memory)?;
    if needed > self.free_capacity {
      return Err(out_of_memory);
    }

    let fit = self.free_list.find_fit(self.mapping.as_slice(), size).ok_or(out_of_memory)?;

    let buf = self.mapping.as_mut_slice();
    self.free_list.take(buf, &fit);
    let split = free_list::split(&mut self.free_list, buf, fit, size);

    self.free_capacity -= HEADER_SIZE + split.granted;

    debug!(
      size,
      granted = split.granted,
      offset = fit.offset,
      remainder = ?split.remainder,
      free = self.free_capacity,
      "allocated block"
    );
    Ok(fit.offset + HEADER_SIZE)
  }

  /// Returns the block behind the payload offset `handle` to the free list.
  ///
  /// Returns the extent handed back to the free capacity.
  pub fn release(
    &mut self,
    handle: usize,
  ) -> Result<usize> {
    let (offset, mut header) = self.live_block(handle)?;
    let extent = header.extent();

    let buf = self.mapping.as_mut_slice();
    header.state = BlockState::Free;
    header.write(buf, offset);
    self.free_capacity += extent;

    let merged_into = self.free_list.insert(buf, offset);

    debug!(
      size = header.size,
      offset,
      merged_into,
      free = self.free_capacity,
      free_blocks = self.free_list.len(),
      "released block"
    );
    Ok(extent)
  }

  /// Payload bytes of the live block behind `handle`.
  pub fn payload(
    &self,
    handle: usize,
  ) -> Result<&[u8]> {
    let (_, header) = self.live_block(handle)?;
    Ok(&self.mapping.as_slice()[handle..handle + header.size])
  }

  pub fn payload_mut(
    &mut self,
    handle: usize,
  ) -> Result<&mut [u8]> {
    let (_, header) = self.live_block(handle)?;
    Ok(&mut self.mapping.as_mut_slice()[handle..handle + header.size])
  }

  /// Raw address of the payload at `handle`, valid until the block is freed
  /// or the arena destroyed.
  pub fn payload_ptr(
    &mut self,
    handle: usize,
  ) -> Result<*mut u8> {
    self.live_block(handle)?;
    Ok(unsafe { self.mapping.base.as_ptr().add(handle) })
  }

  /// Walks every block by address and cross-checks the free list and the
  /// tracked free capacity against it.
  pub fn check(&self) -> Result<()> {
    let buf = self.mapping.as_slice();
    let capacity = self.mapping.len;
    let mut offset = 0;
    let mut previous_free = false;
    let mut free_bytes = 0;
    let mut free_count = 0;

    while offset < capacity {
      let header = Header::read(buf, offset).ok_or(PoolError::Corrupted("unreadable block header"))?;

      offset = offset
        .checked_add(header.extent())
        .filter(|end| *end <= capacity)
        .ok_or(PoolError::Corrupted("block extends past the arena end"))?;

      if header.is_free() {
        if previous_free {
          return Err(PoolError::Corrupted("adjacent free blocks were not coalesced"));
        }
        free_bytes += header.extent();
        free_count += 1;
      }
      previous_free = header.is_free();
    }

    let mut listed_bytes = 0;
    let mut listed = 0;
    for (_, header) in self.free_list.iter(buf) {
      if !header.is_free() {
        return Err(PoolError::Corrupted("used block on the free list"));
      }
      listed_bytes += header.extent();
      listed += 1;
    }

    if listed != self.free_list.len() || listed != free_count {
      return Err(PoolError::Corrupted("free list does not match free blocks"));
    }

    if listed_bytes != free_bytes || free_bytes != self.free_capacity {
      return Err(PoolError::Corrupted("free capacity does not match free blocks"));
    }

    Ok(())
  }

  /// Locates and validates the used block whose payload starts at `handle`.
  fn live_block(
    &self,
    handle: usize,
  ) -> Result<(usize, Header)> {
    let capacity = self.mapping.len;
    if handle < HEADER_SIZE || handle > capacity {
      warn!(handle, "handle outside the arena");
      return Err(PoolError::InvalidPointer(handle));
    }

    let offset = handle - HEADER_SIZE;
    let Some(header) = Header::read(self.mapping.as_slice(), offset) else {
      warn!(handle, "no block header in front of handle");
      return Err(PoolError::InvalidPointer(handle));
    };

    if header.is_free() {
      warn!(handle, "handle refers to a free block");
      return Err(PoolError::DoubleFree(handle));
    }

    let in_bounds = header
      .size
      .checked_add(HEADER_SIZE)
      .is_some_and(|extent| extent <= capacity - offset);
    if !in_bounds {
      warn!(handle, size = header.size, "block header runs past the arena end");
      return Err(PoolError::InvalidPointer(handle));
    }

    Ok((offset, header))
  }
}

impl std::fmt::Debug for Arena {
  fn fmt(
    &self,
    f: &mut std::fmt::Formatter<'_>,
  ) -> std::fmt::Result {
    f.debug_struct("Arena")
      .field("base", &self.mapping.base)
      .field("total_capacity", &self.mapping.len)
      .field("free_capacity", &self.free_capacity)
      .field("free_blocks", &self.free_list.len())
      .finish()
  }
}
