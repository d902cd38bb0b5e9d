//! Process-wide pool behind four free functions.
//!
//! Mirrors the classic `init` / `alloc` / `free` / `deinit` surface for code
//! that wants one shared pool instead of passing a [`Pool`] around. Calls
//! are serialized through a mutex; each one runs to completion before the
//! next starts.

use parking_lot::{Mutex, const_mutex};

use crate::{
  error::Result,
  pool::{Handle, Pool},
};

static POOL: Mutex<Pool> = const_mutex(Pool::new());

/// Reserves the process-wide arena. See [`Pool::init`].
pub fn init(capacity: usize) -> Result<()> {
  POOL.lock().init(capacity)
}

/// Allocates from the process-wide arena. See [`Pool::alloc`].
pub fn alloc(size: usize) -> Result<Handle> {
  POOL.lock().alloc(size)
}

/// Frees into the process-wide arena. See [`Pool::free`].
pub fn free<H>(handle: H) -> Result<()>
where
  H: Into<Option<Handle>>,
{
  POOL.lock().free(handle)
}

/// Releases the process-wide arena. See [`Pool::deinit`].
pub fn deinit() -> Result<()> {
  POOL.lock().deinit()
}

/// Runs `f` with exclusive access to the process-wide pool, for payload
/// access and statistics.
pub fn with<R>(f: impl FnOnce(&mut Pool) -> R) -> R {
  f(&mut POOL.lock())
}
