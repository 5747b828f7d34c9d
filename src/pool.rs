use std::{
  fmt,
  ptr::NonNull,
  slice,
};

use log::{debug, trace};

use crate::{
  align,
  block::{Block, BlockInfo, HEADER_SIZE, NIL},
  error::{InvariantViolation, PoolError, PoolResult},
  region::Region,
};

/// Capacity of a pool created with [`Pool::new`].
pub const HEAP_SIZE: usize = 1024;

/// Every payload size is rounded up to a multiple of this many bytes.
pub const ALIGNMENT: usize = 4;

/// Offset of the first header; it never moves.
const HEAD: u32 = 0;

/// Aggregate view of a pool, computed by [`Pool::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
  pub capacity: usize,
  pub blocks: usize,
  pub free_blocks: usize,
  pub free_bytes: usize,
  pub used_bytes: usize,
  pub largest_free: usize,
}

impl PoolStats {
  /// Bytes spent on block headers.
  pub fn overhead(&self) -> usize {
    self.blocks * HEADER_SIZE
  }
}

/// Fixed-capacity first-fit allocator over a single contiguous region.
///
/// Every block in the region starts with a header; the headers form a
/// singly linked list in address order that always covers the whole
/// region. Allocation splits the first free block that fits, and every
/// deallocation sweeps the list once, merging adjacent free blocks.
///
/// A `Pool` is not thread safe and is neither `Send` nor `Sync`.
pub struct Pool {
  region: Region,
}

impl Pool {
  /// Creates a pool of [`HEAP_SIZE`] bytes holding one free block.
  pub fn new() -> PoolResult<Self> {
    Self::with_capacity(HEAP_SIZE)
  }

  /// Creates a pool of `capacity` bytes holding one free block.
  ///
  /// `capacity` must be a multiple of [`ALIGNMENT`] with room for at least
  /// one header and one alignment unit.
  pub fn with_capacity(capacity: usize) -> PoolResult<Self> {
    if capacity % ALIGNMENT != 0 || capacity < HEADER_SIZE + ALIGNMENT || capacity >= NIL as usize {
      return Err(PoolError::InvalidCapacity(capacity));
    }

    let mut pool = Self {
      region: Region::map(capacity)?,
    };
    pool.init();

    Ok(pool)
  }

  /// Resets the pool to a single free block spanning the whole region.
  ///
  /// Every outstanding allocation is discarded; handles issued before the
  /// reset must not be used afterwards.
  pub fn init(&mut self) {
    let size = (self.capacity() - HEADER_SIZE) as u32;

    unsafe {
      self.block(HEAD).write(Block::new(size, true, NIL));
    }

    debug!("initialized pool of {} bytes at {:p}", self.capacity(), self.region.as_ptr());
    debug_assert_eq!(self.verify(), Ok(()));
  }

  pub fn capacity(&self) -> usize {
    self.region.len()
  }

  /// Returns true if `address` points anywhere inside the pool's region.
  pub fn contains(
    &self,
    address: *const u8,
  ) -> bool {
    self.region.offset_of(address).is_some()
  }

  /// Allocates at least `size` bytes and returns the payload address.
  ///
  /// The request is rounded up to [`ALIGNMENT`] and served from the first
  /// free block large enough. The block is split when the excess can hold
  /// another header plus a payload; otherwise the caller receives the whole
  /// block.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> PoolResult<NonNull<u8>> {
    if size == 0 {
      return Err(PoolError::ZeroSize);
    }

    if size > self.capacity() - HEADER_SIZE {
      return Err(self.out_of_memory(size));
    }

    let size = align!(size);

    let Some(offset) = self.find_free_block(size) else {
      return Err(self.out_of_memory(size));
    };

    unsafe {
      let block = self.block(offset);

      if (*block).size as usize > size + HEADER_SIZE {
        let split = offset + (HEADER_SIZE + size) as u32;
        let remainder = (*block).size - (size + HEADER_SIZE) as u32;

        self.block(split).write(Block::new(remainder, true, (*block).next));

        (*block).size = size as u32;
        (*block).next = split;

        trace!("split block at offset {}: kept {} bytes, {} bytes free at offset {}", offset, size, remainder, split);
      }

      (*block).is_free = false;
    }

    let address = self.payload(offset);

    debug!("allocated {} bytes at {:p} (offset {})", size, address, offset);
    debug_assert_eq!(self.verify(), Ok(()));

    Ok(address)
  }

  /// Releases the block whose payload starts at `address`, then merges
  /// every pair of adjacent free blocks in the pool.
  ///
  /// `address` must be a handle returned by [`allocate`](Self::allocate)
  /// on this pool. Anything else is rejected with
  /// [`PoolError::InvalidHandle`] before the pool is touched. Releasing a
  /// block that is already free is accepted as long as it still has its
  /// own header.
  pub fn deallocate(
    &mut self,
    address: *mut u8,
  ) -> PoolResult<()> {
    if address.is_null() {
      return Err(PoolError::NullHandle);
    }

    let offset = self
      .find_block(address)
      .ok_or(PoolError::InvalidHandle(address as usize))?;

    unsafe {
      (*self.block(offset)).is_free = true;
    }

    let merged = self.coalesce();

    debug!("freed block at {:p} (offset {}), merged {} blocks", address, offset, merged);
    debug_assert_eq!(self.verify(), Ok(()));

    Ok(())
  }

  /// Iterates over every block in address order.
  pub fn blocks(&self) -> Blocks<'_> {
    Blocks {
      pool: self,
      current: HEAD,
    }
  }

  /// Usable size of the live allocation at `address`.
  pub fn usable_size(
    &self,
    address: NonNull<u8>,
  ) -> Option<usize> {
    let offset = self.find_block(address.as_ptr())?;
    let block = unsafe { &*self.block(offset) };

    (!block.is_free).then_some(block.size as usize)
  }

  /// Borrows the payload of the live allocation at `address`.
  pub fn payload_mut(
    &mut self,
    address: NonNull<u8>,
  ) -> Option<&mut [u8]> {
    let size = self.usable_size(address)?;

    Some(unsafe { slice::from_raw_parts_mut(address.as_ptr(), size) })
  }

  pub fn largest_free(&self) -> usize {
    self
      .blocks()
      .filter(|block| block.is_free)
      .map(|block| block.size)
      .max()
      .unwrap_or(0)
  }

  pub fn stats(&self) -> PoolStats {
    let mut stats = PoolStats {
      capacity: self.capacity(),
      ..PoolStats::default()
    };

    for block in self.blocks() {
      stats.blocks += 1;

      if block.is_free {
        stats.free_blocks += 1;
        stats.free_bytes += block.size;
        stats.largest_free = stats.largest_free.max(block.size);
      } else {
        stats.used_bytes += block.size;
      }
    }

    stats
  }

  /// Checks that the headers tile the region exactly, in address order,
  /// with aligned sizes.
  pub fn verify(&self) -> Result<(), InvariantViolation> {
    let capacity = self.capacity();
    let mut offset = HEAD as usize;
    let mut covered = 0;

    loop {
      if offset + HEADER_SIZE > capacity {
        return Err(InvariantViolation::OutOfBounds { offset });
      }

      let block = unsafe { &*self.block(offset as u32) };
      let size = block.size as usize;

      if size % ALIGNMENT != 0 {
        return Err(InvariantViolation::Misaligned { offset, size });
      }

      let end = offset + HEADER_SIZE + size;

      if end > capacity {
        return Err(InvariantViolation::OutOfBounds { offset });
      }

      covered += HEADER_SIZE + size;

      if block.next == NIL {
        break;
      }

      if block.next as usize != end {
        return Err(InvariantViolation::OutOfOrder {
          offset: block.next as usize,
          expected: end,
        });
      }

      offset = end;
    }

    if covered != capacity {
      return Err(InvariantViolation::Coverage {
        expected: capacity,
        actual: covered,
      });
    }

    Ok(())
  }

  /// First block in address order that is free and holds `size` bytes.
  fn find_free_block(
    &self,
    size: usize,
  ) -> Option<u32> {
    self
      .blocks()
      .find(|block| block.is_free && block.size >= size)
      .map(|block| block.offset as u32)
  }

  /// Header offset of the block whose payload starts at `address`, if the
  /// list currently contains such a block.
  fn find_block(
    &self,
    address: *const u8,
  ) -> Option<u32> {
    let header = self.region.offset_of(address)?.checked_sub(HEADER_SIZE)?;

    self
      .blocks()
      .find(|block| block.offset == header)
      .map(|block| block.offset as u32)
  }

  /// Single pass over the list merging each free block with a free
  /// successor. After a merge the grown block is tested again against its
  /// new successor before the walk advances.
  fn coalesce(&mut self) -> usize {
    let mut merged = 0;
    let mut current = HEAD;

    unsafe {
      loop {
        let block = self.block(current);
        let next = (*block).next;

        if next == NIL {
          break;
        }

        let neighbor = self.block(next);

        if (*block).is_free && (*neighbor).is_free {
          (*block).size += (*neighbor).size + HEADER_SIZE as u32;
          (*block).next = (*neighbor).next;
          merged += 1;

          trace!("merged block at offset {} into offset {}", next, current);
        } else {
          current = next;
        }
      }
    }

    merged
  }

  fn out_of_memory(
    &self,
    requested: usize,
  ) -> PoolError {
    let error = PoolError::OutOfMemory {
      requested,
      largest_free: self.largest_free(),
    };

    debug!("{}", error);

    error
  }

  /// Header at `offset`. Offsets handed to this come from the list, so they
  /// are in bounds and aligned.
  fn block(
    &self,
    offset: u32,
  ) -> *mut Block {
    self.region.as_ptr().wrapping_add(offset as usize) as *mut Block
  }

  fn payload(
    &self,
    offset: u32,
  ) -> NonNull<u8> {
    unsafe { NonNull::new_unchecked(self.region.as_ptr().add(offset as usize + HEADER_SIZE)) }
  }
}

impl fmt::Display for Pool {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    for block in self.blocks() {
      write!(
        f,
        "[Addr: {:#x}, Size: {}, Free: {}] -> ",
        block.address, block.size, block.is_free as u8
      )?;
    }

    write!(f, "NULL")
  }
}

impl fmt::Debug for Pool {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("Pool")
      .field("base", &self.region.as_ptr())
      .field("capacity", &self.capacity())
      .field("blocks", &self.blocks().collect::<Vec<_>>())
      .finish()
  }
}

/// Iterator over a pool's blocks in address order, see [`Pool::blocks`].
pub struct Blocks<'a> {
  pool: &'a Pool,
  current: u32,
}

impl Iterator for Blocks<'_> {
  type Item = BlockInfo;

  fn next(&mut self) -> Option<Self::Item> {
    if self.current == NIL {
      return None;
    }

    let offset = self.current;
    let block = unsafe { &*self.pool.block(offset) };

    self.current = block.next;

    Some(BlockInfo {
      offset: offset as usize,
      address: self.pool.payload(offset).as_ptr() as usize,
      size: block.size as usize,
      is_free: block.is_free,
    })
  }
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;

  fn layout(pool: &Pool) -> Vec<(usize, bool)> {
    pool.blocks().map(|block| (block.size, block.is_free)).collect()
  }

  fn has_adjacent_free(pool: &Pool) -> bool {
    let blocks: Vec<_> = pool.blocks().collect();
    blocks.windows(2).any(|pair| pair[0].is_free && pair[1].is_free)
  }

  #[test]
  fn test_init() {
    let pool = Pool::new().unwrap();

    assert_eq!(pool.capacity(), HEAP_SIZE);
    assert_eq!(layout(&pool), vec![(HEAP_SIZE - HEADER_SIZE, true)]);
    assert_eq!(pool.verify(), Ok(()));
  }

  #[test]
  fn test_invalid_capacity() {
    for capacity in [0, 10, HEADER_SIZE, 1026] {
      assert!(matches!(
        Pool::with_capacity(capacity),
        Err(PoolError::InvalidCapacity(c)) if c == capacity
      ));
    }

    let smallest = Pool::with_capacity(HEADER_SIZE + ALIGNMENT).unwrap();
    assert_eq!(layout(&smallest), vec![(ALIGNMENT, true)]);
  }

  #[test]
  fn test_alloc_splits_and_free_restores() {
    let mut pool = Pool::new().unwrap();

    let first = pool.allocate(100).unwrap();

    assert_eq!(first.as_ptr(), unsafe { pool.region.as_ptr().add(HEADER_SIZE) });
    assert_eq!(layout(&pool), vec![(100, false), (1024 - 100 - 2 * HEADER_SIZE, true)]);

    pool.deallocate(first.as_ptr()).unwrap();

    assert_eq!(layout(&pool), vec![(1024 - HEADER_SIZE, true)]);
  }

  #[test]
  fn test_alloc_rounds_to_alignment() {
    let mut pool = Pool::new().unwrap();

    let address = pool.allocate(13).unwrap();

    assert_eq!(pool.usable_size(address), Some(16));
    assert_eq!(address.as_ptr() as usize % ALIGNMENT, 0);

    let next = pool.allocate(1).unwrap();

    assert_eq!(next.as_ptr() as usize - address.as_ptr() as usize, 16 + HEADER_SIZE);
  }

  #[test]
  fn test_zero_size() {
    let mut pool = Pool::new().unwrap();
    pool.allocate(40).unwrap();
    let before = layout(&pool);

    assert!(matches!(pool.allocate(0), Err(PoolError::ZeroSize)));
    assert_eq!(layout(&pool), before);
  }

  #[test]
  fn test_first_fit() {
    let mut pool = Pool::new().unwrap();

    let a = pool.allocate(100).unwrap();
    pool.allocate(4).unwrap();
    let c = pool.allocate(50).unwrap();
    pool.allocate(4).unwrap();
    let e = pool.allocate(200).unwrap();
    let rest = pool.largest_free();
    pool.allocate(rest).unwrap();

    pool.deallocate(a.as_ptr()).unwrap();
    pool.deallocate(c.as_ptr()).unwrap();
    pool.deallocate(e.as_ptr()).unwrap();

    assert_eq!(
      layout(&pool),
      vec![(100, true), (4, false), (52, true), (4, false), (200, true), (rest, false)]
    );

    let chosen = pool.allocate(40).unwrap();

    assert_eq!(chosen, a);
    assert_eq!(layout(&pool)[..3], [(40, false), (100 - 40 - HEADER_SIZE, true), (4, false)]);
  }

  #[test]
  fn test_split_threshold() {
    // One free block of 52 bytes.
    for (request, expected) in [(44, vec![(52, false)]), (40, vec![(52, false)]), (37, vec![(52, false)])] {
      let mut pool = Pool::with_capacity(64).unwrap();
      let address = pool.allocate(request).unwrap();

      assert_eq!(pool.usable_size(address), Some(52));
      assert_eq!(layout(&pool), expected);
    }

    let mut pool = Pool::with_capacity(64).unwrap();
    let address = pool.allocate(36).unwrap();

    assert_eq!(pool.usable_size(address), Some(36));
    assert_eq!(layout(&pool), vec![(36, false), (4, true)]);
  }

  #[test]
  fn test_out_of_memory() {
    let mut pool = Pool::new().unwrap();
    let mut handles = Vec::new();

    for _ in 0..9 {
      handles.push(pool.allocate(100).unwrap());
    }

    assert_eq!(pool.largest_free(), 4);

    match pool.allocate(100) {
      Err(PoolError::OutOfMemory { requested, largest_free }) => {
        assert_eq!(requested, 100);
        assert_eq!(largest_free, 4);
      },
      other => panic!("expected out of memory, got {:?}", other),
    }

    assert_eq!(pool.verify(), Ok(()));
    assert_eq!(pool.blocks().count(), 10);

    pool.allocate(3).unwrap();
    assert!(matches!(
      pool.allocate(1),
      Err(PoolError::OutOfMemory { requested: 4, largest_free: 0 })
    ));

    pool.deallocate(handles[4].as_ptr()).unwrap();
    assert!(pool.allocate(100).is_ok());
  }

  #[test]
  fn test_request_larger_than_pool() {
    let mut pool = Pool::new().unwrap();

    assert!(matches!(
      pool.allocate(usize::MAX),
      Err(PoolError::OutOfMemory { requested: usize::MAX, largest_free: 1012 })
    ));
    assert!(pool.allocate(1012).is_ok());
  }

  #[test]
  fn test_coalesce_both_neighbours() {
    let mut pool = Pool::new().unwrap();

    let a = pool.allocate(100).unwrap();
    let b = pool.allocate(100).unwrap();
    let c = pool.allocate(100).unwrap();

    pool.deallocate(b.as_ptr()).unwrap();
    assert_eq!(layout(&pool), vec![(100, false), (100, true), (100, false), (676, true)]);

    pool.deallocate(a.as_ptr()).unwrap();
    assert_eq!(layout(&pool), vec![(212, true), (100, false), (676, true)]);
    assert!(!has_adjacent_free(&pool));

    pool.deallocate(c.as_ptr()).unwrap();
    assert_eq!(layout(&pool), vec![(1024 - HEADER_SIZE, true)]);
  }

  #[test]
  fn test_null_handle() {
    let mut pool = Pool::new().unwrap();

    assert!(matches!(pool.deallocate(std::ptr::null_mut()), Err(PoolError::NullHandle)));
  }

  #[test]
  fn test_invalid_handles_leave_pool_untouched() {
    let mut pool = Pool::new().unwrap();
    let mut other = Pool::new().unwrap();

    let a = pool.allocate(32).unwrap();
    let foreign = other.allocate(32).unwrap();
    let before = layout(&pool);

    let mut local = 0u8;
    let inside = unsafe { a.as_ptr().add(4) };

    for address in [&mut local as *mut u8, inside, foreign.as_ptr(), pool.region.as_ptr()] {
      assert!(matches!(
        pool.deallocate(address),
        Err(PoolError::InvalidHandle(addr)) if addr == address as usize
      ));
    }

    assert_eq!(layout(&pool), before);
  }

  #[test]
  fn test_double_free() {
    let mut pool = Pool::new().unwrap();

    let a = pool.allocate(16).unwrap();
    let b = pool.allocate(16).unwrap();

    pool.deallocate(a.as_ptr()).unwrap();
    let before = layout(&pool);
    pool.deallocate(a.as_ptr()).unwrap();
    assert_eq!(layout(&pool), before);

    pool.deallocate(b.as_ptr()).unwrap();
    assert!(matches!(pool.deallocate(b.as_ptr()), Err(PoolError::InvalidHandle(_))));
    assert_eq!(layout(&pool), vec![(1024 - HEADER_SIZE, true)]);
  }

  #[test]
  fn test_reinit_discards_allocations() {
    let mut pool = Pool::new().unwrap();

    let a = pool.allocate(10).unwrap();
    let b = pool.allocate(10).unwrap();

    pool.init();

    assert_eq!(layout(&pool), vec![(1024 - HEADER_SIZE, true)]);
    assert_eq!(pool.usable_size(a), None);
    assert!(matches!(pool.deallocate(b.as_ptr()), Err(PoolError::InvalidHandle(_))));
  }

  #[test]
  fn test_payloads_do_not_overlap() {
    let mut pool = Pool::new().unwrap();

    let a = pool.allocate(24).unwrap();
    let b = pool.allocate(24).unwrap();

    pool.payload_mut(a).unwrap().fill(0xAA);
    pool.payload_mut(b).unwrap().fill(0xBB);

    assert!(pool.payload_mut(a).unwrap().iter().all(|byte| *byte == 0xAA));
    assert!(pool.payload_mut(b).unwrap().iter().all(|byte| *byte == 0xBB));
    assert_eq!(pool.verify(), Ok(()));

    pool.deallocate(a.as_ptr()).unwrap();
    assert!(pool.payload_mut(a).is_none());
  }

  #[test]
  fn test_stats() {
    let mut pool = Pool::new().unwrap();

    pool.allocate(100).unwrap();
    let b = pool.allocate(200).unwrap();
    pool.allocate(50).unwrap();
    pool.deallocate(b.as_ptr()).unwrap();

    let stats = pool.stats();

    assert_eq!(stats.blocks, 4);
    assert_eq!(stats.free_blocks, 2);
    assert_eq!(stats.used_bytes, 152);
    assert_eq!(stats.largest_free, 1024 - 100 - 200 - 52 - 4 * HEADER_SIZE);
    assert_eq!(stats.free_bytes + stats.used_bytes + stats.overhead(), HEAP_SIZE);
  }

  #[test]
  fn test_display() {
    let mut pool = Pool::new().unwrap();
    let a = pool.allocate(100).unwrap();

    let expected = format!(
      "[Addr: {:#x}, Size: 100, Free: 0] -> [Addr: {:#x}, Size: 900, Free: 1] -> NULL",
      a.as_ptr() as usize,
      a.as_ptr() as usize + 100 + HEADER_SIZE
    );

    assert_eq!(pool.to_string(), expected);
  }

  #[test]
  fn test_verify_detects_corruption() {
    let mut pool = Pool::new().unwrap();

    let a = pool.allocate(4).unwrap();
    pool.allocate(4).unwrap();

    // Overrun `a` into the size field of the following header.
    unsafe {
      (a.as_ptr().add(4) as *mut u32).write(5);
    }

    assert_eq!(
      pool.verify(),
      Err(InvariantViolation::Misaligned {
        offset: 4 + HEADER_SIZE,
        size: 5
      })
    );
  }

  #[test]
  fn test_contains() {
    let mut pool = Pool::new().unwrap();
    let a = pool.allocate(8).unwrap();
    let local = 0u8;

    assert!(pool.contains(a.as_ptr()));
    assert!(!pool.contains(&local));
  }
}
