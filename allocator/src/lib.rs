//! Lend and reclaim reusable memory blocks.
//!
//! A [BlockAllocator] keeps one bounded freelist per power-of-two size class. Callers
//! [rent](BlockAllocator::rent) a [Block] of at least some number of bytes and hand it back with
//! [release](BlockAllocator::release) (or by dropping it) once they are done, so that the next
//! request of a similar size can reuse the memory instead of going back to the system allocator.
//!
//! Requests that the pool cannot serve (larger than the largest class, a class whose freelist is
//! exhausted, or an alignment stronger than the pool's) are satisfied with an untracked block that
//! is freed when it is dropped.
//!
//! Most code should use the process-wide [BlockAllocator::shared] instance. It is created lazily on
//! first use and lives until the process exits.

mod config;
pub use config::{cache_line_size, page_size, AllocatorConfig};
mod pool;
pub use pool::{Block, BlockAllocator};

use thiserror::Error;

/// Errors that can occur when renting a [Block].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("invalid layout: size={size} align={align}")]
    InvalidLayout { size: usize, align: usize },
    #[error("requested size exceeds largest size class: {0}")]
    Oversized(usize),
    #[error("size class exhausted: {0}")]
    Exhausted(usize),
}

/// Create a [std::num::NonZeroUsize] from a literal, panicking at compile time (in const
/// contexts) or at runtime if the value is zero.
#[macro_export]
macro_rules! NZUsize {
    ($val:expr) => {
        match ::std::num::NonZeroUsize::new($val) {
            Some(value) => value,
            None => panic!("value must be non-zero"),
        }
    };
}
