use std::mem;

/// Offset marking the end of the block list.
pub(crate) const NIL: u32 = u32::MAX;

/// Bytes occupied by the header in front of every payload.
pub const HEADER_SIZE: usize = mem::size_of::<Block>();

/// Header embedded at the start of every block inside the pool.
///
/// `next` is the offset of the following header from the pool base, or
/// [`NIL`] for the last block.
#[repr(C)]
pub(crate) struct Block {
  pub size: u32,
  pub is_free: bool,
  pub next: u32,
}

impl Block {
  pub fn new(
    size: u32,
    is_free: bool,
    next: u32,
  ) -> Self {
    Self { size, is_free, next }
  }
}

/// Snapshot of one block, as produced by [`Pool::blocks`](crate::Pool::blocks).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  /// Offset of the block header from the pool base.
  pub offset: usize,
  /// Address of the payload, i.e. the handle `allocate` returned for it.
  pub address: usize,
  /// Usable payload size in bytes.
  pub size: usize,
  pub is_free: bool,
}

impl BlockInfo {
  /// Offset one past the end of this block's payload.
  pub fn end(&self) -> usize {
    self.offset + HEADER_SIZE + self.size
  }
}
