/// Rounds `value` up to the next multiple of `unit`, which must be a power
/// of two.
#[macro_export]
macro_rules! align_to {
  ($value:expr, $unit:expr) => {
    ($value + $unit - 1) & !($unit - 1)
  };
}

/// Rounds the given size up to the pool's alignment unit (4 bytes).
///
/// # Examples
///
/// ```rust
/// use rpool::align;
///
/// assert_eq!(align!(1usize), 4);
/// assert_eq!(align!(13usize), 16);
/// assert_eq!(align!(16usize), 16);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    $crate::align_to!($value, $crate::ALIGNMENT)
  };
}

#[cfg(test)]
mod tests {
  use crate::ALIGNMENT;

  #[test]
  fn test_align() {
    let mut alignments = Vec::new();

    for i in 0..10 {
      let sizes = (ALIGNMENT * i + 1)..=(ALIGNMENT * (i + 1));

      let expected_alignment = ALIGNMENT * (i + 1);

      alignments.push((sizes, expected_alignment));
    }

    for (sizes, expected) in alignments {
      for size in sizes {
        assert_eq!(expected, align!(size));
      }
    }
  }

  #[test]
  fn test_align_to_word() {
    assert_eq!(align_to!(0usize, 8), 0);
    assert_eq!(align_to!(1usize, 8), 8);
    assert_eq!(align_to!(17usize, 8), 24);
    assert_eq!(align_to!(4095usize, 4096), 4096);
  }
}
