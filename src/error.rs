//! Error types for pool operations.

use thiserror::Error;

/// Errors returned by the pool, the arena and the global facade.
///
/// Every failing call leaves the pool exactly as it was before the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PoolError {
  /// Zero capacity at `init`, zero size at `alloc`, or a capacity too small
  /// to hold a single block header.
  #[error("invalid argument: {0}")]
  InvalidArgument(&'static str),

  /// The pool has not been initialized, or was deinitialized.
  #[error("pool is not initialized")]
  NotInitialized,

  /// `init` was called on a live pool without an intervening `deinit`.
  #[error("pool is already initialized")]
  AlreadyInitialized,

  /// No free block is large enough, or the backing buffer could not be mapped.
  #[error("out of memory: requested {requested} bytes, {free} bytes free")]
  OutOfMemory {
    /// Bytes the request needed, header included.
    requested: usize,
    /// Free capacity tracked at the time of the request.
    free: usize,
  },

  /// The handle does not point at a live block header of this pool.
  #[error("invalid pointer at offset {0:#x}")]
  InvalidPointer(usize),

  /// The handle refers to a block that is already free.
  #[error("double free at offset {0:#x}")]
  DoubleFree(usize),

  /// An internal consistency check failed.
  #[error("arena corrupted: {0}")]
  Corrupted(&'static str),
}

/// Result type for pool operations.
pub type Result<T> = std::result::Result<T, PoolError>;
