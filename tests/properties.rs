use rand::{Rng, SeedableRng, rngs::StdRng};
use rpool::{HEADER_SIZE, Handle, Pool, PoolError, PoolStats};

fn pool_with(capacity: usize) -> Pool {
  let mut pool = Pool::new();
  pool.init(capacity).unwrap();
  pool
}

/// Free capacity plus every live block's extent must add up to the arena.
fn assert_conserved(
  pool: &Pool,
  live: &[(Handle, u8)],
) {
  let stats = pool.stats().unwrap();
  let live_bytes: usize = live.iter().map(|(handle, _)| pool.usable_size(*handle).unwrap() + HEADER_SIZE).sum();

  assert_eq!(stats.free_capacity + live_bytes, stats.total_capacity);
}

/// Live block ranges, header included, never overlap.
fn assert_disjoint(
  pool: &Pool,
  live: &[(Handle, u8)],
) {
  let mut ranges: Vec<_> = live
    .iter()
    .map(|(handle, _)| {
      let start = handle.offset() - HEADER_SIZE;
      (start, handle.offset() + pool.usable_size(*handle).unwrap())
    })
    .collect();
  ranges.sort_unstable();

  for pair in ranges.windows(2) {
    assert!(pair[0].1 <= pair[1].0, "overlapping blocks {:?} and {:?}", pair[0], pair[1]);
  }
}

#[test]
fn freeing_everything_coalesces_to_one_block() {
  let mut pool = pool_with(1024);

  let p1 = pool.alloc(100).unwrap();
  let p2 = pool.alloc(100).unwrap();
  let p3 = pool.alloc(100).unwrap();

  pool.free(p2).unwrap();
  pool.free(p1).unwrap();
  pool.free(p3).unwrap();

  assert_eq!(pool.free_extents().unwrap(), vec![(0, 1024)]);
  pool.check().unwrap();
}

#[test]
fn freeing_in_address_order_coalesces() {
  let mut pool = pool_with(4096);
  let handles: Vec<_> = (1..=10).map(|i| pool.alloc(i * 17).unwrap()).collect();

  for handle in handles {
    pool.free(handle).unwrap();
    pool.check().unwrap();
  }

  assert_eq!(pool.free_extents().unwrap(), vec![(0, 4096)]);
}

#[test]
fn freeing_in_reverse_order_coalesces() {
  let mut pool = pool_with(4096);
  let handles: Vec<_> = (1..=10).map(|i| pool.alloc(i * 31).unwrap()).collect();

  for handle in handles.into_iter().rev() {
    pool.free(handle).unwrap();
    pool.check().unwrap();
  }

  assert_eq!(pool.free_extents().unwrap(), vec![(0, 4096)]);
}

#[test]
fn reuse_does_not_grow_free_list() {
  let mut pool = pool_with(1024);
  let before = pool.stats().unwrap().free_blocks;

  let p = pool.alloc(64).unwrap();
  pool.free(p).unwrap();
  let q = pool.alloc(64).unwrap();

  assert_eq!(p, q);
  assert!(pool.stats().unwrap().free_blocks <= before);
}

#[test]
fn exhaustion_boundary() {
  const CAPACITY: usize = 2_000_000;
  const SIZE: usize = 5 * 1024;

  let mut pool = pool_with(CAPACITY);
  let mut successes = 0;

  let err = loop {
    match pool.alloc(SIZE) {
      Ok(handle) => {
        pool.bytes_mut(handle).unwrap()[0] = 5;
        successes += 1;
      },
      Err(err) => break err,
    }
  };

  assert_eq!(successes, CAPACITY / (SIZE + HEADER_SIZE));
  assert!(matches!(err, PoolError::OutOfMemory { .. }));

  let extents = pool.free_extents().unwrap();
  let free = pool.stats().unwrap().free_capacity;

  assert!(matches!(pool.alloc(SIZE), Err(PoolError::OutOfMemory { .. })));
  assert_eq!(pool.free_extents().unwrap(), extents);
  assert_eq!(pool.stats().unwrap().free_capacity, free);
  pool.check().unwrap();
}

#[test]
fn argument_validation() {
  let mut pool = Pool::new();
  assert!(matches!(pool.init(0), Err(PoolError::InvalidArgument(_))));
  assert!(!pool.is_initialized());

  pool.init(64).unwrap();
  assert!(matches!(pool.alloc(0), Err(PoolError::InvalidArgument(_))));
}

#[test]
fn null_free_is_a_no_op_in_every_state() {
  let mut pool = Pool::new();
  assert_eq!(pool.free(None), Ok(()));

  pool.init(512).unwrap();
  let _held = pool.alloc(32).unwrap();
  let extents = pool.free_extents().unwrap();
  let stats = pool.stats().unwrap();

  assert_eq!(pool.free(None), Ok(()));
  assert_eq!(pool.free_extents().unwrap(), extents);
  assert_eq!(pool.stats().unwrap(), stats);

  pool.deinit().unwrap();
  assert_eq!(pool.free(None), Ok(()));
}

#[test]
fn first_fit_takes_earliest_listed_block() {
  let mut pool = pool_with(4096);

  let small = pool.alloc(64).unwrap();
  let _a = pool.alloc(8).unwrap();
  let large = pool.alloc(512).unwrap();
  let _b = pool.alloc(8).unwrap();

  // Free the higher block first: the list becomes [tail, large, small].
  pool.free(large).unwrap();
  pool.free(small).unwrap();
  let tail = pool.free_extents().unwrap()[0];
  let _rest = pool.alloc(tail.1 - HEADER_SIZE).unwrap();

  // `small` is lower and a tighter fit, but `large` is listed first.
  assert_eq!(pool.alloc(32).unwrap(), large);
  assert_eq!(pool.alloc(32).unwrap(), small);
}

#[test]
fn fragmented_free_space_is_out_of_memory() {
  // Two 100-byte blocks, each followed by an 8-byte guard, and nothing else.
  let mut pool = pool_with(2 * (2 * HEADER_SIZE + 108));

  let a = pool.alloc(100).unwrap();
  let _guard_a = pool.alloc(8).unwrap();
  let b = pool.alloc(100).unwrap();
  let _guard_b = pool.alloc(8).unwrap();
  pool.free(a).unwrap();
  pool.free(b).unwrap();

  let before = pool.stats().unwrap();
  let extents = pool.free_extents().unwrap();
  assert_eq!(extents.len(), 2);
  assert_eq!(before.free_capacity, 2 * (HEADER_SIZE + 100));

  // Enough bytes in total, but no single block holds them.
  let size = 150;
  assert!(before.free_capacity >= size + HEADER_SIZE);
  assert!(before.largest_free_extent < size + HEADER_SIZE);
  assert_eq!(
    pool.alloc(size),
    Err(PoolError::OutOfMemory { requested: size + HEADER_SIZE, free: before.free_capacity })
  );

  let after = pool.stats().unwrap();
  assert_eq!(pool.free_extents().unwrap(), extents);
  assert_eq!(after, PoolStats { failed_allocations: before.failed_allocations + 1, ..before });
  pool.check().unwrap();
}

#[test]
fn padding_is_returned_on_free() {
  let mut pool = pool_with(HEADER_SIZE + 100);

  let handle = pool.alloc(90).unwrap();
  assert_eq!(pool.usable_size(handle), Ok(100));
  assert_eq!(pool.stats().unwrap().free_capacity, 0);

  pool.free(handle).unwrap();
  assert_eq!(pool.free_extents().unwrap(), vec![(0, HEADER_SIZE + 100)]);
}

#[test]
fn foreign_handles_are_rejected_without_mutation() {
  let mut pool = pool_with(1024);
  let mut other = pool_with(1024);

  let _mine = pool.alloc(10).unwrap();
  let _padding = other.alloc(200).unwrap();
  let theirs = other.alloc(10).unwrap();
  let extents = pool.free_extents().unwrap();

  // Same offset in another pool lands in the middle of this pool's free block.
  assert_eq!(pool.free(theirs), Err(PoolError::InvalidPointer(theirs.offset())));
  assert_eq!(pool.free_extents().unwrap(), extents);
  pool.check().unwrap();
}

#[test]
fn foreign_handle_with_oversized_header_is_rejected() {
  let mut pool = pool_with(1024);
  let mut other = pool_with(1024);

  let _first = pool.alloc(100).unwrap();
  let theirs = pool.alloc(100).unwrap();
  let mine = other.alloc(200).unwrap();

  // Plant a used header claiming `usize::MAX` bytes right in front of the
  // offset `theirs` resolves to inside `other`.
  const WORD: usize = std::mem::size_of::<usize>();
  let at = theirs.offset() - HEADER_SIZE - mine.offset();
  let bytes = other.bytes_mut(mine).unwrap();
  bytes[at..at + WORD].copy_from_slice(&usize::MAX.to_ne_bytes());
  bytes[at + WORD..at + 2 * WORD].copy_from_slice(&0xB10C_0A11usize.to_ne_bytes());

  let before = other.stats().unwrap();
  let extents = other.free_extents().unwrap();

  assert_eq!(other.free(theirs), Err(PoolError::InvalidPointer(theirs.offset())));
  assert_eq!(other.usable_size(theirs), Err(PoolError::InvalidPointer(theirs.offset())));
  assert_eq!(other.stats().unwrap(), before);
  assert_eq!(other.free_extents().unwrap(), extents);
  other.check().unwrap();
}

#[test]
fn random_workload_keeps_invariants() {
  const CAPACITY: usize = 64 * 1024;

  for seed in [1_u64, 7, 42] {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut pool = pool_with(CAPACITY);
    let mut live: Vec<(Handle, u8)> = Vec::new();

    for step in 0..2_000 {
      if live.is_empty() || rng.gen_bool(0.6) {
        let size = rng.gen_range(1..=512);
        match pool.alloc(size) {
          Ok(handle) => {
            let tag = (step % 251) as u8;
            pool.bytes_mut(handle).unwrap().fill(tag);
            live.push((handle, tag));
          },
          Err(PoolError::OutOfMemory { .. }) => {},
          Err(err) => panic!("unexpected error {err}"),
        }
      } else {
        let (handle, tag) = live.swap_remove(rng.gen_range(0..live.len()));
        assert!(pool.bytes(handle).unwrap().iter().all(|b| *b == tag));
        pool.free(handle).unwrap();
      }

      assert_conserved(&pool, &live);
      assert_disjoint(&pool, &live);
      pool.check().unwrap();
    }

    while !live.is_empty() {
      let (handle, tag) = live.swap_remove(rng.gen_range(0..live.len()));
      assert!(pool.bytes(handle).unwrap().iter().all(|b| *b == tag));
      pool.free(handle).unwrap();
    }

    assert_eq!(pool.free_extents().unwrap(), vec![(0, CAPACITY)]);
    pool.deinit().unwrap();
  }
}
