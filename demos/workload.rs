//! Drives a pool with the two classic workloads and prints timing statistics:
//!
//! - fixed-size allocate/free cycles over a pool,
//! - a burst of random-size allocations followed by a full drain.
//!
//! Run with `cargo run --release --example workload`.

use std::time::{Duration, Instant};

use rand::{Rng, SeedableRng, rngs::StdRng};
use rpool::{Handle, Pool, PoolError};

const KIB: usize = 1024;
const MIB: usize = 1024 * KIB;

/// Parameters for one run of the demo.
struct WorkloadConfig {
  /// Pool size and allocation size for each fixed-size run.
  fixed_runs: Vec<(usize, usize)>,
  /// Pool size for the variable-size run.
  variable_capacity: usize,
  /// Allocation attempts in the variable-size burst.
  variable_attempts: usize,
  /// Upper bound (exclusive) for a random allocation size.
  variable_max_size: usize,
  /// Seed for the random sizes.
  seed: u64,
}

impl Default for WorkloadConfig {
  fn default() -> Self {
    Self {
      fixed_runs: vec![(2 * MIB, 5 * KIB), (1024 * MIB, 2 * MIB)],
      variable_capacity: 1024 * MIB,
      variable_attempts: 2_000,
      variable_max_size: 1024 * MIB,
      seed: 0x5EED,
    }
  }
}

/// Counters aggregated over one workload.
#[derive(Debug, Default)]
struct WorkloadStats {
  allocations: usize,
  deallocations: usize,
  failed: usize,
  min_size: usize,
  max_size: usize,
  total_size: usize,
  alloc_time: Duration,
  dealloc_time: Duration,
}

impl WorkloadStats {
  fn record_alloc(
    &mut self,
    size: usize,
    elapsed: Duration,
  ) {
    if self.allocations == 0 {
      self.min_size = size;
      self.max_size = size;
    }
    self.min_size = self.min_size.min(size);
    self.max_size = self.max_size.max(size);
    self.total_size += size;
    self.alloc_time += elapsed;
    self.allocations += 1;
  }

  fn record_free(
    &mut self,
    elapsed: Duration,
  ) {
    self.dealloc_time += elapsed;
    self.deallocations += 1;
  }

  fn print(&self) {
    println!("\tNumber of allocations: {:>25}", self.allocations);
    println!("\tAverage allocation time: {:>23?}", average(self.alloc_time, self.allocations));
    println!("\tNumber of de-allocations: {:>22}", self.deallocations);
    println!("\tAverage de-allocation time: {:>20?}", average(self.dealloc_time, self.deallocations));
    println!("\tNumber of failed allocations: {:>18}", self.failed);
    println!("\tMinimum allocation size: {:>23}", self.min_size);
    println!("\tMaximum allocation size: {:>23}", self.max_size);
    println!("\tAverage allocation size: {:>23}", self.total_size.checked_div(self.allocations).unwrap_or(0));
  }
}

fn average(
  total: Duration,
  count: usize,
) -> Duration {
  u32::try_from(count).ok().filter(|count| *count > 0).map_or(Duration::ZERO, |count| total / count)
}

/// Allocates and immediately frees `alloc_size` bytes, `capacity / alloc_size` times.
fn fixed_sized_allocs(
  capacity: usize,
  alloc_size: usize,
) -> Result<WorkloadStats, PoolError> {
  let mut pool = Pool::new();
  let mut stats = WorkloadStats::default();
  pool.init(capacity)?;

  for _ in 0..capacity / alloc_size {
    let begin = Instant::now();
    let result = pool.alloc(alloc_size);
    let elapsed = begin.elapsed();

    let Ok(handle) = result else {
      stats.failed += 1;
      continue;
    };

    pool.bytes_mut(handle)?[0] = 5;
    stats.record_alloc(alloc_size, elapsed);

    let begin = Instant::now();
    pool.free(handle)?;
    stats.record_free(begin.elapsed());
  }

  pool.deinit()?;
  Ok(stats)
}

/// Allocates a burst of random sizes, then frees every success in order.
fn variable_sized_allocs(config: &WorkloadConfig) -> Result<WorkloadStats, PoolError> {
  let mut rng = StdRng::seed_from_u64(config.seed);
  let mut pool = Pool::new();
  let mut stats = WorkloadStats::default();
  let mut handles: Vec<Handle> = Vec::with_capacity(config.variable_attempts);
  pool.init(config.variable_capacity)?;

  for _ in 0..config.variable_attempts {
    let size = rng.gen_range(1..config.variable_max_size);

    let begin = Instant::now();
    let result = pool.alloc(size);
    let elapsed = begin.elapsed();

    match result {
      Ok(handle) => {
        pool.bytes_mut(handle)?[0] = 5;
        stats.record_alloc(size, elapsed);
        handles.push(handle);
      },
      Err(PoolError::OutOfMemory { .. }) => stats.failed += 1,
      Err(err) => return Err(err),
    }
  }

  for handle in handles {
    let begin = Instant::now();
    pool.free(handle)?;
    stats.record_free(begin.elapsed());
  }

  pool.check()?;
  pool.deinit()?;
  Ok(stats)
}

fn main() -> Result<(), PoolError> {
  let config = WorkloadConfig::default();

  for (capacity, alloc_size) in &config.fixed_runs {
    let label = format!("{}MB block with fixed {}KB allocations", capacity / MIB, alloc_size / KIB);

    println!("\nStart {label} test");
    fixed_sized_allocs(*capacity, *alloc_size)?.print();
    println!("\nEnd {label} test");
  }

  let label = format!("{}MB block with variable sized allocations", config.variable_capacity / MIB);
  println!("\nStart {label} test");
  variable_sized_allocs(&config)?.print();
  println!("\nEnd {label} test");

  Ok(())
}
