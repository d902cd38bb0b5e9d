//! First-fit search, splitting and coalescing over an in-band free list.
//!
//! The list is singly linked through the `next` word of each free block's
//! header and kept in insertion order: new tails from a split and freshly
//! released blocks are appended at the end. Every position is a byte offset
//! into the arena buffer, so neighbour lookups are plain `usize` sums.

use tracing::trace;

use crate::block::{self, HEADER_SIZE, Header, NIL};

#[derive(Debug)]
pub(crate) struct FreeList {
  head: usize,
  tail: usize,
  len: usize,
}

/// A free block chosen by [`FreeList::find_fit`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct Fit {
  /// Node listed before the block, [`NIL`] when it is the head.
  pub prev: usize,
  pub offset: usize,
  pub header: Header,
}

/// Outcome of carving a used block out of a free one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Split {
  /// Payload bytes granted to the used block; larger than requested when
  /// the leftover was too small to host its own header.
  pub granted: usize,
  /// Offset of the leftover free block, if one was created.
  pub remainder: Option<usize>,
}

impl FreeList {
  pub const fn empty() -> Self {
    Self { head: NIL, tail: NIL, len: 0 }
  }

  /// A list holding one free block that spans the whole buffer.
  pub fn spanning(buf: &mut [u8]) -> Self {
    let mut list = Self::empty();
    Header::free(buf.len() - HEADER_SIZE, NIL).write(buf, 0);
    list.push_back(buf, 0);
    list
  }

  pub fn len(&self) -> usize {
    self.len
  }

  pub fn iter<'a>(
    &self,
    buf: &'a [u8],
  ) -> Iter<'a> {
    Iter { buf, cursor: self.head, remaining: self.len }
  }

  /// Appends the free block at `offset` to the end of the list.
  pub fn push_back(
    &mut self,
    buf: &mut [u8],
    offset: usize,
  ) {
    block::set_next(buf, offset, NIL);

    if self.tail == NIL {
      self.head = offset;
    } else {
      block::set_next(buf, self.tail, offset);
    }

    self.tail = offset;
    self.len += 1;
  }

  /// Unlinks the free block at `offset`. Returns `false` if it is not listed.
  pub fn remove(
    &mut self,
    buf: &mut [u8],
    offset: usize,
  ) -> bool {
    let Some(prev) = self.predecessor(buf, offset) else {
      return false;
    };
    let Some(header) = Header::read(buf, offset) else {
      return false;
    };

    self.unlink_after(buf, prev, offset, header.next);
    true
  }

  /// Unlinks a block returned by [`find_fit`](Self::find_fit) without
  /// walking the list again.
  pub fn take(
    &mut self,
    buf: &mut [u8],
    fit: &Fit,
  ) {
    self.unlink_after(buf, fit.prev, fit.offset, fit.header.next);
  }

  fn unlink_after(
    &mut self,
    buf: &mut [u8],
    prev: usize,
    offset: usize,
    next: usize,
  ) {
    match prev {
      NIL => self.head = next,
      prev => block::set_next(buf, prev, next),
    }

    if self.tail == offset {
      self.tail = prev;
    }

    self.len -= 1;
  }

  /// Offset of the node listed before `offset`, [`NIL`] when it is the head.
  fn predecessor(
    &self,
    buf: &[u8],
    offset: usize,
  ) -> Option<usize> {
    let mut prev = NIL;

    for (at, _) in self.iter(buf) {
      if at == offset {
        return Some(prev);
      }
      prev = at;
    }

    None
  }

  /// First block in list order whose extent covers `HEADER_SIZE + size`.
  ///
  /// The comparison is done on payload sizes, which is the same condition
  /// without the overflow risk.
  pub fn find_fit(
    &self,
    buf: &[u8],
    size: usize,
  ) -> Option<Fit> {
    let mut prev = NIL;

    for (offset, header) in self.iter(buf) {
      if header.size >= size {
        return Some(Fit { prev, offset, header });
      }
      prev = offset;
    }

    None
  }

  /// Returns the free block at `offset` to the list and merges it with any
  /// address-adjacent free neighbours.
  ///
  /// The header at `offset` must already be marked free. Returns the offset
  /// of the block that finally holds the released bytes.
  pub fn insert(
    &mut self,
    buf: &mut [u8],
    offset: usize,
  ) -> usize {
    self.push_back(buf, offset);
    self.coalesce(buf, offset)
  }

  /// Merges the listed free block at `offset` with free neighbours on both
  /// sides until neither side has one. The lower-addressed block always
  /// absorbs the higher one.
  fn coalesce(
    &mut self,
    buf: &mut [u8],
    mut offset: usize,
  ) -> usize {
    loop {
      let Some(current) = Header::read(buf, offset) else {
        return offset;
      };
      let end = offset + current.extent();

      let mut lower = None;
      let mut upper = None;
      for (at, header) in self.iter(buf) {
        if at + header.extent() == offset {
          lower = Some(at);
        } else if at == end {
          upper = Some(at);
        }
      }

      if lower.is_none() && upper.is_none() {
        return offset;
      }

      if let Some(upper) = upper {
        self.absorb(buf, offset, upper);
      }

      if let Some(lower) = lower {
        self.absorb(buf, lower, offset);
        offset = lower;
      }
    }
  }

  /// Grows `lower` over the adjacent free block `upper` and unlinks `upper`.
  fn absorb(
    &mut self,
    buf: &mut [u8],
    lower: usize,
    upper: usize,
  ) {
    self.remove(buf, upper);

    let (Some(mut low), Some(high)) = (Header::read(buf, lower), Header::read(buf, upper)) else {
      return;
    };

    low.size += high.extent();
    low.write(buf, lower);

    trace!(lower, upper, size = low.size, "coalesced free blocks");
  }
}

/// Carves `size` payload bytes off the front of the unlisted free block in
/// `fit` and marks it used. A leftover of at least `HEADER_SIZE` bytes
/// becomes a new free block appended to `list`; anything smaller stays as
/// padding inside the used block.
pub(crate) fn split(
  list: &mut FreeList,
  buf: &mut [u8],
  fit: Fit,
  size: usize,
) -> Split {
  let leftover = fit.header.size - size;

  if leftover < HEADER_SIZE {
    Header::used(fit.header.size).write(buf, fit.offset);
    trace!(offset = fit.offset, size, padding = leftover, "allocated whole block");
    return Split { granted: fit.header.size, remainder: None };
  }

  let remainder = fit.offset + HEADER_SIZE + size;
  Header::used(size).write(buf, fit.offset);
  Header::free(leftover - HEADER_SIZE, NIL).write(buf, remainder);
  list.push_back(buf, remainder);

  trace!(offset = fit.offset, size, remainder, "split free block");
  Split { granted: size, remainder: Some(remainder) }
}

/// Walks the free list in traversal order, yielding `(offset, header)`.
///
/// Bounded by the list length so that a corrupted link cannot loop forever.
pub(crate) struct Iter<'a> {
  buf: &'a [u8],
  cursor: usize,
  remaining: usize,
}

impl Iterator for Iter<'_> {
  type Item = (usize, Header);

  fn next(&mut self) -> Option<Self::Item> {
    if self.cursor == NIL || self.remaining == 0 {
      return None;
    }

    let header = Header::read(self.buf, self.cursor)?;
    let at = self.cursor;

    self.cursor = header.next;
    self.remaining -= 1;
    Some((at, header))
  }
}
