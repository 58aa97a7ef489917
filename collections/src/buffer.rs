//! Resizable sequence over pooled blocks.
//!
//! # Growth
//!
//! When an append or reservation needs more room than the current block offers, the buffer rents
//! a block of `max(2 * capacity, required, 4)` elements (capped at [GrowableBuffer::max_capacity]),
//! moves the live elements over and releases the old block. Only the first `len` slots are ever
//! copied. Because the allocator rounds requests up to its size classes, the resulting capacity is
//! often larger than requested.
//!
//! # Layout
//!
//! ```text
//! [0...................len...................capacity]
//!  ^                    ^                     ^
//!  |                    |                     |
//!  block start          first free slot       block end
//!
//! - [0..len]:        initialized elements
//! - [len..capacity]: uninitialized
//! ```
//!
//! # Versioning
//!
//! Every structural change (push, insert, remove, pop, truncate, clear, bulk extend, resize) bumps
//! the version exactly once, however many elements it touches. Reserving capacity and writing
//! through [GrowableBuffer::get_mut] or [GrowableBuffer::as_mut_slice] do not.

use crate::{cursor, Cursor, Error, Versioned};
use std::{
    fmt,
    marker::PhantomData,
    mem,
    ops::{Index, IndexMut},
    ptr, slice,
};
use tidepool_allocator::{Block, BlockAllocator};
use tracing::trace;

/// Smallest capacity rented when an empty buffer first grows.
const DEFAULT_CAPACITY: usize = 4;

/// A resizable sequence whose storage is rented from a [BlockAllocator].
///
/// Once [disposed](GrowableBuffer::dispose), every fallible operation returns
/// [Error::Disposed].
pub struct GrowableBuffer<T> {
    /// Storage for `capacity` elements, of which the first `len` are initialized.
    block: Block,
    capacity: usize,
    len: usize,
    version: u64,
    /// Identifies this instance to the cursors it creates.
    id: u64,
    disposed: bool,
    allocator: BlockAllocator,
    _marker: PhantomData<T>,
}

impl<T> GrowableBuffer<T> {
    /// Creates an empty buffer backed by the shared allocator. Does not allocate.
    pub fn new() -> Self {
        Self::new_in(BlockAllocator::shared())
    }

    /// Creates an empty buffer backed by `allocator`. Does not allocate.
    pub fn new_in(allocator: &BlockAllocator) -> Self {
        Self {
            block: Block::empty::<T>(),
            capacity: Self::initial_capacity(),
            len: 0,
            version: 0,
            id: cursor::next_id(),
            disposed: false,
            allocator: allocator.clone(),
            _marker: PhantomData,
        }
    }

    /// Creates an empty buffer with room for at least `capacity` elements.
    pub fn with_capacity(capacity: usize) -> Result<Self, Error> {
        Self::with_capacity_in(capacity, BlockAllocator::shared())
    }

    /// Creates an empty buffer backed by `allocator` with room for at least `capacity` elements.
    pub fn with_capacity_in(capacity: usize, allocator: &BlockAllocator) -> Result<Self, Error> {
        let mut buffer = Self::new_in(allocator);
        if capacity > buffer.capacity {
            if capacity > Self::max_capacity() {
                return Err(Error::Exhausted(capacity));
            }
            buffer.reallocate(capacity)?;
        }
        Ok(buffer)
    }

    /// Creates a buffer from the items of `iter`, renting storage once if the number of items is
    /// known up front.
    pub fn try_from_iter<I: IntoIterator<Item = T>>(iter: I) -> Result<Self, Error> {
        let mut buffer = Self::new();
        buffer.extend(iter)?;
        Ok(buffer)
    }

    /// Returns the largest number of elements a buffer of `T` can hold.
    pub const fn max_capacity() -> usize {
        let size = mem::size_of::<T>();
        if size == 0 {
            usize::MAX
        } else {
            isize::MAX as usize / size
        }
    }

    /// Zero-sized elements never need storage.
    const fn initial_capacity() -> usize {
        if mem::size_of::<T>() == 0 {
            usize::MAX
        } else {
            0
        }
    }

    /// Returns the number of elements in the buffer.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the buffer contains no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the number of elements the buffer can hold without growing.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the version, bumped on every structural change.
    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Returns true once the buffer has been disposed.
    #[inline]
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Returns the allocator backing this buffer.
    pub fn allocator(&self) -> &BlockAllocator {
        &self.allocator
    }

    /// Returns the element at `index`.
    pub fn get(&self, index: usize) -> Result<&T, Error> {
        self.ensure_live()?;
        let len = self.len;
        self.slice().get(index).ok_or(Error::OutOfRange { index, len })
    }

    /// Returns a mutable reference to the element at `index`.
    pub fn get_mut(&mut self, index: usize) -> Result<&mut T, Error> {
        self.ensure_live()?;
        let len = self.len;
        self.slice_mut()
            .get_mut(index)
            .ok_or(Error::OutOfRange { index, len })
    }

    /// Returns the elements as a slice.
    pub fn as_slice(&self) -> Result<&[T], Error> {
        self.ensure_live()?;
        Ok(self.slice())
    }

    /// Returns the elements as a mutable slice.
    pub fn as_mut_slice(&mut self) -> Result<&mut [T], Error> {
        self.ensure_live()?;
        Ok(self.slice_mut())
    }

    /// Returns an iterator over the elements.
    ///
    /// Unlike the other reads this does not report [Error::Disposed]: a disposed buffer yields
    /// nothing.
    pub fn iter(&self) -> slice::Iter<'_, T> {
        self.slice().iter()
    }

    /// Returns a [Cursor] positioned before the first element.
    pub fn cursor(&self) -> Result<Cursor, Error> {
        Cursor::new(self)
    }

    /// Returns the element under `cursor`.
    pub fn current(&self, cursor: &Cursor) -> Option<&T> {
        if !cursor.belongs_to(self) {
            return None;
        }
        cursor.position().and_then(|index| self.slice().get(index))
    }

    /// Appends `value` to the end of the buffer.
    pub fn push(&mut self, value: T) -> Result<(), Error> {
        self.ensure_live()?;
        self.reserve_one()?;

        // SAFETY: reserve_one guarantees len < capacity.
        unsafe { self.ptr().add(self.len).write(value) };
        self.len += 1;
        self.bump();
        Ok(())
    }

    /// Inserts `value` at `index`, shifting all later elements right.
    pub fn insert(&mut self, index: usize, value: T) -> Result<(), Error> {
        self.ensure_live()?;
        if index > self.len {
            return Err(Error::OutOfRange {
                index,
                len: self.len,
            });
        }
        self.reserve_one()?;

        // SAFETY: index <= len < capacity, so both the shifted range and the written slot lie
        // inside the block.
        unsafe {
            let slot = self.ptr().add(index);
            ptr::copy(slot, slot.add(1), self.len - index);
            slot.write(value);
        }
        self.len += 1;
        self.bump();
        Ok(())
    }

    /// Removes and returns the element at `index`, shifting all later elements left.
    pub fn remove(&mut self, index: usize) -> Result<T, Error> {
        self.ensure_live()?;
        if index >= self.len {
            return Err(Error::OutOfRange {
                index,
                len: self.len,
            });
        }

        // SAFETY: index < len. The element is moved out before its slot is overwritten and the
        // vacated last slot falls outside the new length, so nothing is dropped twice.
        let value = unsafe {
            let slot = self.ptr().add(index);
            let value = slot.read();
            ptr::copy(slot.add(1), slot, self.len - index - 1);
            value
        };
        self.len -= 1;
        self.bump();
        Ok(value)
    }

    /// Removes and returns the last element, or `None` if the buffer is empty.
    pub fn pop(&mut self) -> Result<Option<T>, Error> {
        self.ensure_live()?;
        if self.len == 0 {
            return Ok(None);
        }
        self.len -= 1;
        self.bump();

        // SAFETY: the slot at the old last index is initialized and now outside the length.
        Ok(Some(unsafe { self.ptr().add(self.len).read() }))
    }

    /// Shortens the buffer to `len` elements, dropping the rest. Has no effect if `len` is not
    /// smaller than the current length.
    pub fn truncate(&mut self, len: usize) -> Result<(), Error> {
        self.ensure_live()?;
        if len >= self.len {
            return Ok(());
        }
        self.drop_tail(len);
        self.bump();
        Ok(())
    }

    /// Removes every element. The block is kept for reuse.
    pub fn clear(&mut self) -> Result<(), Error> {
        self.ensure_live()?;
        self.drop_tail(0);
        self.bump();
        Ok(())
    }

    /// Ensures the buffer can hold at least `min_capacity` elements, growing once if needed.
    /// Returns the resulting capacity.
    pub fn ensure_capacity(&mut self, min_capacity: usize) -> Result<usize, Error> {
        self.ensure_live()?;
        if min_capacity > self.capacity {
            self.grow(min_capacity)?;
        }
        Ok(self.capacity)
    }

    /// Appends the items of `iter`.
    ///
    /// When the iterator reports an exact size, storage is grown once up front and the whole
    /// append counts as a single structural change. Otherwise every item is pushed individually.
    pub fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) -> Result<(), Error> {
        self.ensure_live()?;
        let mut iter = iter.into_iter();
        let (lower, upper) = iter.size_hint();
        if lower > 0 && upper == Some(lower) {
            let required = self.required(lower)?;
            self.ensure_capacity(required)?;

            let mut written = 0;
            while written < lower {
                let Some(value) = iter.next() else {
                    break;
                };
                // SAFETY: len < required <= capacity.
                unsafe { self.ptr().add(self.len).write(value) };
                self.len += 1;
                written += 1;
            }
            if written > 0 {
                self.bump();
            }
        }

        // Leftovers from an iterator that under-reported its size, or an unsized iterator.
        for value in iter {
            self.push(value)?;
        }
        Ok(())
    }

    /// Returns `len + additional`, or an error if that overflows.
    fn required(&self, additional: usize) -> Result<usize, Error> {
        self.len
            .checked_add(additional)
            .ok_or(Error::Exhausted(usize::MAX))
    }

    /// Grows the buffer if it has no free slot.
    fn reserve_one(&mut self) -> Result<(), Error> {
        if self.len == self.capacity {
            let required = self.required(1)?;
            self.grow(required)?;
        }
        Ok(())
    }

    fn grow(&mut self, required: usize) -> Result<(), Error> {
        let max = Self::max_capacity();
        if required > max {
            return Err(Error::Exhausted(required));
        }
        let capacity = self
            .capacity
            .saturating_mul(2)
            .max(required)
            .max(DEFAULT_CAPACITY)
            .min(max);
        self.reallocate(capacity)
    }

    /// Moves the live elements into a block with room for at least `capacity` elements.
    fn reallocate(&mut self, capacity: usize) -> Result<(), Error> {
        let size = mem::size_of::<T>();
        debug_assert!(size > 0, "zero-sized elements never reallocate");
        let block = self.allocator.rent(capacity * size, mem::align_of::<T>())?;

        // SAFETY: the new block holds at least `capacity >= len` elements and is distinct from
        // the current one.
        unsafe { ptr::copy_nonoverlapping(self.ptr(), block.as_ptr() as *mut T, self.len) };
        let previous = mem::replace(&mut self.block, block);
        let old_capacity = self.capacity;
        self.capacity = self.block.capacity() / size;

        // The elements were moved, so the old block only holds stale bytes.
        self.allocator.release(previous, mem::needs_drop::<T>());
        trace!(old_capacity, capacity = self.capacity, "grew buffer");
        Ok(())
    }

    /// Drops every element at or after `len` and shortens the buffer to `len`.
    fn drop_tail(&mut self, len: usize) {
        let count = self.len - len;
        // Shorten first so a panicking destructor cannot cause a double drop.
        self.len = len;

        // SAFETY: the `count` elements after `len` were initialized and are no longer reachable.
        unsafe {
            ptr::drop_in_place(ptr::slice_from_raw_parts_mut(self.ptr().add(len), count));
        }
    }

    /// Returns the block to the allocator, dropping any remaining elements. Calling this more
    /// than once has no further effect.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.drop_tail(0);
        self.capacity = 0;
        let block = mem::replace(&mut self.block, Block::empty::<T>());
        self.allocator.release(block, mem::needs_drop::<T>());
        trace!("disposed buffer");
    }

    #[inline]
    fn ensure_live(&self) -> Result<(), Error> {
        if self.disposed {
            return Err(Error::Disposed);
        }
        Ok(())
    }

    #[inline]
    fn bump(&mut self) {
        self.version = self.version.wrapping_add(1);
    }

    #[inline]
    fn ptr(&self) -> *mut T {
        self.block.as_ptr() as *mut T
    }

    /// Returns the initialized elements (empty once disposed).
    #[inline]
    pub(crate) fn slice(&self) -> &[T] {
        // SAFETY: the block pointer is non-null and aligned for T, and the first `len`
        // elements are initialized.
        unsafe { slice::from_raw_parts(self.ptr(), self.len) }
    }

    #[inline]
    pub(crate) fn slice_mut(&mut self) -> &mut [T] {
        // SAFETY: see slice(); `&mut self` guarantees exclusive access.
        unsafe { slice::from_raw_parts_mut(self.ptr(), self.len) }
    }
}

impl<T: Clone> GrowableBuffer<T> {
    /// Creates a buffer holding a copy of `values`, renting storage once.
    pub fn from_slice(values: &[T]) -> Result<Self, Error> {
        Self::from_slice_in(values, BlockAllocator::shared())
    }

    /// Creates a buffer backed by `allocator` holding a copy of `values`.
    pub fn from_slice_in(values: &[T], allocator: &BlockAllocator) -> Result<Self, Error> {
        let mut buffer = Self::with_capacity_in(values.len(), allocator)?;
        buffer.extend_from_slice(values)?;
        Ok(buffer)
    }

    /// Appends a copy of every element of `values`, growing at most once. Counts as a single
    /// structural change.
    pub fn extend_from_slice(&mut self, values: &[T]) -> Result<(), Error> {
        self.ensure_live()?;
        if values.is_empty() {
            return Ok(());
        }
        let required = self.required(values.len())?;
        self.ensure_capacity(required)?;

        for value in values {
            // SAFETY: len < required <= capacity.
            unsafe { self.ptr().add(self.len).write(value.clone()) };
            self.len += 1;
        }
        self.bump();
        Ok(())
    }

    /// Resizes the buffer to `len` elements, filling new slots with clones of `value` or
    /// dropping the tail. Counts as a single structural change.
    pub fn resize(&mut self, len: usize, value: T) -> Result<(), Error> {
        self.ensure_live()?;
        if len <= self.len {
            return self.truncate(len);
        }
        self.ensure_capacity(len)?;

        while self.len + 1 < len {
            // SAFETY: len + 1 < capacity.
            unsafe { self.ptr().add(self.len).write(value.clone()) };
            self.len += 1;
        }
        // SAFETY: the last new slot is inside the capacity.
        unsafe { self.ptr().add(self.len).write(value) };
        self.len += 1;
        self.bump();
        Ok(())
    }

    /// Returns an independent copy with its own block from the same allocator.
    pub fn try_clone(&self) -> Result<Self, Error> {
        self.ensure_live()?;
        Self::from_slice_in(self.slice(), &self.allocator)
    }
}

impl<T> Versioned for GrowableBuffer<T> {
    fn id(&self) -> u64 {
        self.id
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn len(&self) -> usize {
        self.len
    }

    fn is_disposed(&self) -> bool {
        self.disposed
    }
}

impl<T> Drop for GrowableBuffer<T> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<T> Default for GrowableBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: PartialEq> PartialEq for GrowableBuffer<T> {
    fn eq(&self, other: &Self) -> bool {
        self.disposed == other.disposed && self.slice() == other.slice()
    }
}

impl<T: Eq> Eq for GrowableBuffer<T> {}

impl<T: fmt::Debug> fmt::Debug for GrowableBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.slice()).finish()
    }
}

impl<T> Index<usize> for GrowableBuffer<T> {
    type Output = T;

    /// Allows accessing elements using the `[]` operator.
    ///
    /// Panics if out of bounds.
    #[inline]
    fn index(&self, index: usize) -> &Self::Output {
        &self.slice()[index]
    }
}

impl<T> IndexMut<usize> for GrowableBuffer<T> {
    /// Panics if out of bounds.
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.slice_mut()[index]
    }
}

impl<'a, T> IntoIterator for &'a GrowableBuffer<T> {
    type Item = &'a T;
    type IntoIter = slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
