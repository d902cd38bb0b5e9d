//! # rpool - A Fixed-Capacity Memory Pool
//!
//! This crate carves one pre-reserved byte arena into variable-sized blocks
//! with malloc/free semantics, without touching the global heap allocator
//! after the arena is mapped.
//!
//! ## Overview
//!
//! ```text
//!   Pool Concept:
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │                          ARENA (mmap)                                │
//!   │                                                                      │
//!   │   ┌────┬──────┬────┬────────┬────┬──────┬────┬────────────────────┐  │
//!   │   │ H  │ A1   │ H  │ free   │ H  │ A2   │ H  │       free         │  │
//!   │   └────┴──────┴────┴────────┴────┴──────┴────┴────────────────────┘  │
//!   │                 ▲                          ▲                         │
//!   │                 │                          │                         │
//!   │           free list ──── next ─────────────┘                         │
//!   │                                                                      │
//!   └──────────────────────────────────────────────────────────────────────┘
//!
//!   alloc: first-fit scan of the free list, split off the remainder.
//!   free:  append to the free list, merge with free neighbours by address.
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   rpool
//!   ├── align      - Word alignment macro (align!)
//!   ├── block      - In-band header format (internal)
//!   ├── free_list  - First-fit, split, insert and coalesce (internal)
//!   ├── arena      - Arena: the mapped buffer and its accounting
//!   ├── pool       - Pool and Handle: init / alloc / free / deinit
//!   ├── global     - Process-wide pool behind a mutex
//!   ├── stats      - PoolStats snapshots
//!   └── error      - PoolError
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use rpool::Pool;
//!
//! let mut pool = Pool::new();
//! pool.init(1024)?;
//!
//! let p1 = pool.alloc(100)?;
//! let p2 = pool.alloc(100)?;
//! let p3 = pool.alloc(100)?;
//!
//! pool.free(p2)?;
//! pool.free(p1)?;
//! pool.free(p3)?;
//!
//! // Everything coalesced back into one block spanning the arena.
//! assert_eq!(pool.free_extents()?, vec![(0, 1024)]);
//! pool.deinit()?;
//! # Ok::<(), rpool::PoolError>(())
//! ```
//!
//! ## How It Works
//!
//! Every block, free or used, starts with a header of [`HEADER_SIZE`] bytes:
//!
//! ```text
//!   Single Allocation:
//!   ┌───────────────────────┬────────────────────────────────┐
//!   │    Block Header       │         User Data              │
//!   │  ┌─────────────────┐  │                                │
//!   │  │ size: N         │  │  ┌──────────────────────────┐  │
//!   │  │ tag: used/free  │  │  │                          │  │
//!   │  │ next: offset    │  │  │     N bytes usable       │  │
//!   │  └─────────────────┘  │  │                          │  │
//!   │      24 bytes         │  └──────────────────────────┘  │
//!   └───────────────────────┴────────────────────────────────┘
//!                           ▲
//!                           └── Handle offset returned to user
//! ```
//!
//! All positions are byte offsets from the arena base, so adjacency is a
//! plain sum: `Y` follows `X` iff `Y == X + HEADER_SIZE + X.size`.
//!
//! - **Allocation** takes the first listed block with `size >= request`. If
//!   the leftover can hold a header it becomes a new free block at the end
//!   of the list; otherwise it stays with the allocation as padding.
//! - **Deallocation** appends the block to the list, then repeatedly merges
//!   it with an address-adjacent free block on either side, the lower block
//!   absorbing the higher, until no free neighbour remains.
//!
//! ## Limitations
//!
//! - **Single-threaded**: [`Pool`] is not synchronized; [`global`] is, by a
//!   mutex.
//! - **Fixed size**: the arena never grows or shrinks.
//! - **No alignment guarantees**: payloads start wherever the previous block
//!   ended.
//! - **Unix-only**: the arena is mapped with `libc::mmap`.
//!
//! ## Safety
//!
//! Handles are offsets, not pointers; [`Pool::bytes`] and
//! [`Pool::bytes_mut`] check them against the block header before handing
//! out a slice. A freed handle reports [`PoolError::DoubleFree`] until its
//! bytes are reused by a later allocation.

pub mod align;
mod arena;
mod block;
mod error;
mod free_list;
pub mod global;
mod pool;
mod stats;

pub use arena::Arena;
pub use block::HEADER_SIZE;
pub use error::{PoolError, Result};
pub use pool::{Handle, Pool};
pub use stats::PoolStats;
