//! # rpool - A Fixed-Size Pool Allocator
//!
//! This crate provides a **first-fit free-list allocator** over a single,
//! fixed-size memory region mapped from the OS with `mmap(2)`.
//!
//! ## Overview
//!
//! The pool never grows. Every byte of it belongs to exactly one block, and
//! every block starts with a small header:
//!
//! ```text
//!   Pool Layout (1024 bytes):
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │ offset 0                                                   1024 ─┐   │
//!   │   ┌────┬──────────┬────┬────┬────┬──────────────────────────────┐│   │
//!   │   │ H  │  A1 100  │ H  │ F4 │ H  │        Free 884              ││   │
//!   │   └────┴──────────┴────┴────┴────┴──────────────────────────────┘│   │
//!   │     │               ▲ │       ▲ │                           ▲    │   │
//!   │     └─── next ──────┘ └─ next ┘ └────────── next ───────────┘    │   │
//!   │                                                                  │   │
//!   └──────────────────────────────────────────────────────────────────────┘
//!
//!   H = 12 byte header, A = allocated payload, F = free payload.
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   rpool
//!   ├── align      - Alignment macros (align!, align_to!)
//!   ├── block      - Block header and the BlockInfo inspection record
//!   ├── error      - PoolError and InvariantViolation
//!   ├── pool       - Pool implementation
//!   └── region     - mmap-backed fixed region (internal)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rpool::Pool;
//!
//! fn main() -> Result<(), rpool::PoolError> {
//!     let mut pool = Pool::new()?;
//!
//!     // Allocate 100 bytes (rounded up to a multiple of 4)
//!     let handle = pool.allocate(100)?;
//!
//!     // Use the memory
//!     pool.payload_mut(handle).unwrap().fill(42);
//!     println!("{}", pool);
//!
//!     // Free the memory
//!     pool.deallocate(handle.as_ptr())?;
//!     Ok(())
//! }
//! ```
//!
//! ## How It Works
//!
//! **Allocation** rounds the request up to 4 bytes and walks the list from
//! the first block, taking the first free block that is large enough. If
//! the block has room for another header and at least one more unit, it is
//! split:
//!
//! ```text
//!   Split on allocate(100):
//!
//!   before  ┌────┬─────────────────────────────────────────────┐
//!           │ H  │                 Free 1012                   │
//!           └────┴─────────────────────────────────────────────┘
//!   after   ┌────┬──────────┬────┬──────────────────────────────┐
//!           │ H  │  A 100   │ H  │          Free 900            │
//!           └────┴──────────┴────┴──────────────────────────────┘
//!                ▲
//!                └── Pointer returned to user
//! ```
//!
//! **Deallocation** marks the block free and then sweeps the whole list
//! once, folding every free block into a free predecessor:
//!
//! ```text
//!   ┌────┬────────┬────┬────────┬────┬────────┐
//!   │ H  │ Free a │ H  │ Free b │ H  │ Free c │  ──►  one block: a + b + c + 2H
//!   └────┴────────┴────┴────────┴────┴────────┘
//! ```
//!
//! ## Features
//!
//! - **Bounded memory**: one region, fixed at construction
//! - **Deterministic placement**: first fit in address order
//! - **Validated frees**: handles not issued by the pool are rejected
//! - **Inspection**: iterate blocks, gather stats, verify the list
//!
//! ## Limitations
//!
//! - **Single-threaded only**: `Pool` is neither `Send` nor `Sync`
//! - **4 byte alignment**: no stronger alignment guarantee for payloads
//! - **No growth**: requests beyond the largest free block fail
//! - **Unix-only**: Requires `libc` and `mmap` (POSIX systems)
//!
//! ## Logging
//!
//! The pool never prints. Allocation, release, splitting and merging are
//! reported through the [`log`] facade at `debug` and `trace` level.

pub mod align;
mod block;
mod error;
mod pool;
mod region;

pub use block::{BlockInfo, HEADER_SIZE};
pub use error::{InvariantViolation, PoolError, PoolResult};
pub use pool::{ALIGNMENT, Blocks, HEAP_SIZE, Pool, PoolStats};
