//! Growable buffers and packed bit vectors backed by pooled memory blocks.
//!
//! [GrowableBuffer] is a resizable sequence whose storage is rented from a
//! [tidepool_allocator::BlockAllocator] and handed back when it grows or is disposed, so that
//! short-lived buffers of similar sizes keep reusing the same memory. [BitVector] packs booleans
//! into 64-bit words stored in a `GrowableBuffer<u64>`.
//!
//! Both types are single-writer. Mutation while a [Cursor] is enumerating the same instance is
//! detected through a version stamp and reported as [Error::ModifiedDuringIteration] on the
//! cursor's next step.

mod bitvec;
pub use bitvec::{BitIterator, BitVector, WORD_BITS};
mod buffer;
pub use buffer::GrowableBuffer;
mod cursor;
pub use cursor::{Cursor, Versioned};

use thiserror::Error;

/// Errors that can occur when operating on a collection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("index out of range: index={index} len={len}")]
    OutOfRange { index: usize, len: usize },
    #[error("length mismatch: {0} != {1}")]
    SizeMismatch(usize, usize),
    #[error("not supported: {0}")]
    NotSupported(&'static str),
    #[error("collection disposed")]
    Disposed,
    #[error("collection modified during iteration")]
    ModifiedDuringIteration,
    #[error("cursor belongs to another collection")]
    ForeignCursor,
    #[error("capacity exhausted: requested {0}")]
    Exhausted(usize),
    #[error("invalid encoding: {0}")]
    Invalid(&'static str),
    #[error("allocator: {0}")]
    Allocator(#[from] tidepool_allocator::Error),
}
