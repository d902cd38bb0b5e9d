use std::mem::size_of;

use crate::align;

const WORD: usize = size_of::<usize>();

/// Bytes reserved in front of every block, free or used.
///
/// ```text
///   ┌──────────────┬──────────────┬──────────────┬─────────────────────┐
///   │ size         │ tag          │ next         │ payload (size bytes)│
///   │ (1 word)     │ (1 word)     │ (1 word)     │                     │
///   └──────────────┴──────────────┴──────────────┴─────────────────────┘
///   ▲ block offset                               ▲ handle offset
/// ```
pub const HEADER_SIZE: usize = align!(size_of::<Header>());

const _: () = assert!(HEADER_SIZE >= 3 * WORD);

/// End-of-list marker for free-list links.
pub(crate) const NIL: usize = usize::MAX;

const USED_TAG: usize = 0xB10C_0A11;
const FREE_TAG: usize = 0xF4EE_B10C;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BlockState {
  Used,
  Free,
}

/// Decoded view of the header stored in-band at a block offset.
///
/// `next` is only meaningful while the block is free; used blocks keep it
/// at [`NIL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Header {
  pub size: usize,
  pub state: BlockState,
  pub next: usize,
}

impl Header {
  pub fn free(
    size: usize,
    next: usize,
  ) -> Self {
    Self { size, state: BlockState::Free, next }
  }

  pub fn used(size: usize) -> Self {
    Self { size, state: BlockState::Used, next: NIL }
  }

  pub fn is_free(&self) -> bool {
    self.state == BlockState::Free
  }

  /// Header plus payload, in bytes.
  pub fn extent(&self) -> usize {
    HEADER_SIZE + self.size
  }

  /// Decodes the header at `offset`.
  ///
  /// Returns `None` when the header would run past the buffer, when the
  /// tag word is neither the used nor the free marker, or when the size is
  /// too large for [`Header::extent`] to represent.
  pub fn read(
    buf: &[u8],
    offset: usize,
  ) -> Option<Self> {
    let end = offset.checked_add(HEADER_SIZE)?;
    let raw = buf.get(offset..end)?;

    let size = word_at(raw, 0);
    size.checked_add(HEADER_SIZE)?;
    let state = match word_at(raw, 1) {
      USED_TAG => BlockState::Used,
      FREE_TAG => BlockState::Free,
      _ => return None,
    };
    let next = word_at(raw, 2);

    Some(Self { size, state, next })
  }

  /// Encodes the header at `offset`. The caller guarantees the range is
  /// inside `buf`.
  pub fn write(
    &self,
    buf: &mut [u8],
    offset: usize,
  ) {
    let tag = match self.state {
      BlockState::Used => USED_TAG,
      BlockState::Free => FREE_TAG,
    };
    let raw = &mut buf[offset..offset + HEADER_SIZE];

    raw[..WORD].copy_from_slice(&self.size.to_ne_bytes());
    raw[WORD..2 * WORD].copy_from_slice(&tag.to_ne_bytes());
    raw[2 * WORD..3 * WORD].copy_from_slice(&self.next.to_ne_bytes());
  }
}

/// Rewrites only the link word of the free block at `offset`.
pub(crate) fn set_next(
  buf: &mut [u8],
  offset: usize,
  next: usize,
) {
  buf[offset + 2 * WORD..offset + 3 * WORD].copy_from_slice(&next.to_ne_bytes());
}

fn word_at(
  raw: &[u8],
  index: usize,
) -> usize {
  let mut bytes = [0u8; WORD];
  bytes.copy_from_slice(&raw[index * WORD..(index + 1) * WORD]);
  usize::from_ne_bytes(bytes)
}
