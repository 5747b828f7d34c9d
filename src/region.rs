use std::{io, ptr::{self, NonNull}};

use libc::{MAP_ANONYMOUS, MAP_FAILED, MAP_PRIVATE, PROT_READ, PROT_WRITE, c_void, mmap, munmap};

use crate::error::PoolResult;

/// Fixed-size, zero-filled memory region obtained from the OS.
///
/// The mapping is page aligned, so any offset that is a multiple of the
/// alignment unit is suitably aligned for a block header.
pub(crate) struct Region {
  base: NonNull<u8>,
  len: usize,
}

impl Region {
  pub fn map(len: usize) -> PoolResult<Self> {
    let address = unsafe {
      mmap(
        ptr::null_mut(),
        len,
        PROT_READ | PROT_WRITE,
        MAP_PRIVATE | MAP_ANONYMOUS,
        -1,
        0,
      )
    };

    if address == MAP_FAILED {
      return Err(io::Error::last_os_error().into());
    }

    let base = NonNull::new(address as *mut u8).ok_or_else(|| io::Error::other("mmap returned null"))?;

    log::trace!("mapped {} byte region at {:?}", len, base);

    Ok(Self { base, len })
  }

  pub fn as_ptr(&self) -> *mut u8 {
    self.base.as_ptr()
  }

  pub fn len(&self) -> usize {
    self.len
  }

  /// Returns the offset of `address` from the base if it lies inside the region.
  pub fn offset_of(
    &self,
    address: *const u8,
  ) -> Option<usize> {
    (address as usize)
      .checked_sub(self.base.as_ptr() as usize)
      .filter(|offset| *offset < self.len)
  }
}

impl Drop for Region {
  fn drop(&mut self) {
    let result = unsafe { munmap(self.base.as_ptr() as *mut c_void, self.len) };

    if result != 0 {
      log::warn!(
        "failed to unmap pool region at {:?}: {}",
        self.base,
        io::Error::last_os_error()
      );
    }
  }
}
