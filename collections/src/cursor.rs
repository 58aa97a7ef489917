//! Version-checked enumeration.
//!
//! A borrowing iterator already prevents mutation of the collection it walks. A [Cursor] is the
//! detached alternative: it does not borrow its collection between steps, so the owner may mutate
//! the collection while a cursor is live. Each step re-checks the collection's version against
//! the one captured when the cursor was created and fails with
//! [Error::ModifiedDuringIteration] if a structural change happened in between. A cursor is tied
//! to the instance that created it; stepping it over any other instance fails with
//! [Error::ForeignCursor].

use crate::Error;
use std::sync::atomic::{AtomicU64, Ordering};

/// Source of instance ids.
static NEXT_ID: AtomicU64 = AtomicU64::new(0);

/// Returns an id no other collection instance in this process has.
pub(crate) fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// A collection that stamps every structural change with a new version.
pub trait Versioned {
    /// Returns an id unique to this instance for the life of the process.
    fn id(&self) -> u64;

    /// Returns the current version.
    fn version(&self) -> u64;

    /// Returns the number of elements.
    fn len(&self) -> usize;

    /// Returns `true` if the collection holds no elements.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` once the collection has been disposed.
    fn is_disposed(&self) -> bool;
}

/// A forward cursor over a [Versioned] collection.
///
/// A cursor starts before the first element. [Cursor::advance] moves it to the next element and
/// returns `false` once the end is reached. [Cursor::reset] moves it back before the first element
/// but keeps the version captured at creation, so a cursor invalidated by a mutation stays
/// invalid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cursor {
    source: u64,
    version: u64,
    next: usize,
    current: Option<usize>,
}

impl Cursor {
    /// Creates a cursor positioned before the first element of `source`.
    pub fn new<S: Versioned + ?Sized>(source: &S) -> Result<Self, Error> {
        if source.is_disposed() {
            return Err(Error::Disposed);
        }
        Ok(Self {
            source: source.id(),
            version: source.version(),
            next: 0,
            current: None,
        })
    }

    /// Moves to the next element of `source`.
    ///
    /// Returns `Ok(false)` when there are no more elements.
    pub fn advance<S: Versioned + ?Sized>(&mut self, source: &S) -> Result<bool, Error> {
        self.check(source)?;
        if self.next < source.len() {
            self.current = Some(self.next);
            self.next += 1;
            return Ok(true);
        }
        self.current = None;
        Ok(false)
    }

    /// Moves back before the first element.
    pub fn reset<S: Versioned + ?Sized>(&mut self, source: &S) -> Result<(), Error> {
        self.check(source)?;
        self.next = 0;
        self.current = None;
        Ok(())
    }

    /// Returns the index of the current element, if the cursor is on one.
    #[inline]
    pub fn position(&self) -> Option<usize> {
        self.current
    }

    /// Returns true if `source` is the collection this cursor was created from.
    #[inline]
    pub fn belongs_to<S: Versioned + ?Sized>(&self, source: &S) -> bool {
        self.source == source.id()
    }

    fn check<S: Versioned + ?Sized>(&self, source: &S) -> Result<(), Error> {
        if source.is_disposed() {
            return Err(Error::Disposed);
        }
        if !self.belongs_to(source) {
            return Err(Error::ForeignCursor);
        }
        if source.version() != self.version {
            return Err(Error::ModifiedDuringIteration);
        }
        Ok(())
    }
}
