use std::env;

use rpool::{HEAP_SIZE, Pool, PoolError};

/// Prints every block of the pool, one per line.
fn print_blocks(
  label: &str,
  pool: &Pool,
) {
  println!("\n[{}] Heap memory blocks:", label);
  for block in pool.blocks() {
    println!(
      "  [Addr: {:#x}, Size: {:>4}, Free: {}]",
      block.address, block.size, block.is_free as u8
    );
  }
  println!("  NULL");
}

fn main() -> Result<(), PoolError> {
  // Set RUST_LOG=rpool=trace to follow splits and merges.
  env_logger::init();

  let capacity = env::args()
    .nth(1)
    .and_then(|arg| arg.parse().ok())
    .unwrap_or(HEAP_SIZE);

  let mut pool = Pool::with_capacity(capacity)?;
  print_blocks("start", &pool);

  // --------------------------------------------------------------------
  // 1) Allocate three blocks. Each one is split off the free tail.
  // --------------------------------------------------------------------
  let first = pool.allocate(100)?;
  let second = pool.allocate(30)?;
  let third = pool.allocate(200)?;
  println!("\n[1] Allocated {:?}, {:?}, {:?}", first, second, third);
  println!("[1] 30 bytes were rounded up to {:?}", pool.usable_size(second));

  pool.payload_mut(first).unwrap().fill(0xAB);
  print_blocks("1", &pool);

  // --------------------------------------------------------------------
  // 2) Zero-size and oversized requests are rejected, the pool is unchanged.
  // --------------------------------------------------------------------
  for size in [0, capacity] {
    match pool.allocate(size) {
      Ok(handle) => println!("\n[2] Unexpectedly allocated {} bytes at {:?}", size, handle),
      Err(error) => println!("\n[2] allocate({}) failed: {}", size, error),
    }
  }

  // --------------------------------------------------------------------
  // 3) Free the middle block, then the first. The two merge.
  // --------------------------------------------------------------------
  pool.deallocate(second.as_ptr())?;
  print_blocks("3a", &pool);

  pool.deallocate(first.as_ptr())?;
  print_blocks("3b", &pool);

  // --------------------------------------------------------------------
  // 4) First fit: a small request lands in the merged hole at the front.
  // --------------------------------------------------------------------
  let reused = pool.allocate(40)?;
  println!(
    "\n[4] reused == first? {}",
    if reused == first { "Yes, first fit took the front hole" } else { "No" }
  );

  // --------------------------------------------------------------------
  // 5) Freeing something twice after it was merged is caught.
  // --------------------------------------------------------------------
  pool.deallocate(reused.as_ptr())?;
  if let Err(error) = pool.deallocate(second.as_ptr()) {
    println!("\n[5] second free rejected: {}", error);
  }

  // --------------------------------------------------------------------
  // 6) Release everything; one free block remains.
  // --------------------------------------------------------------------
  pool.deallocate(third.as_ptr())?;
  print_blocks("6", &pool);
  println!("\n[6] {:?}", pool.stats());
  println!("[6] {}", pool);

  Ok(())
}
