use std::io;

use thiserror::Error;

/// Result alias for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;

/// Errors reported by [`Pool`](crate::Pool) operations.
///
/// None of these leave the pool in an inconsistent state.
#[derive(Error, Debug)]
pub enum PoolError {
  #[error("cannot allocate zero bytes")]
  ZeroSize,

  #[error("out of memory: requested {requested} bytes, largest free block is {largest_free} bytes")]
  OutOfMemory { requested: usize, largest_free: usize },

  #[error("null handle passed to deallocate")]
  NullHandle,

  #[error("handle 0x{0:x} was not issued by this pool or is no longer live")]
  InvalidHandle(usize),

  #[error("invalid pool capacity: {0} bytes")]
  InvalidCapacity(usize),

  #[error("failed to map pool region: {0}")]
  Map(#[from] io::Error),
}

/// Structural problems found by [`Pool::verify`](crate::Pool::verify).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
  #[error("blocks cover {actual} bytes, pool capacity is {expected}")]
  Coverage { expected: usize, actual: usize },

  #[error("block at offset {offset} does not follow its predecessor ending at {expected}")]
  OutOfOrder { offset: usize, expected: usize },

  #[error("block at offset {offset} has unaligned size {size}")]
  Misaligned { offset: usize, size: usize },

  #[error("block at offset {offset} extends past the end of the pool")]
  OutOfBounds { offset: usize },
}
