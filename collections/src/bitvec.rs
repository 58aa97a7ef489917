//! Bit-vector implementation
//!
//! The bit-vector packs a sequence of bits into [u64] words stored in a [GrowableBuffer]. Bit `i`
//! lives in word `i / 64` at bit position `i % 64`, counting from the least significant bit.
//!
//! If the length of the bit-vector is not a multiple of 64, the last word contains bits that are
//! not part of the vector. Unlike a vector that keeps those bits zeroed on every write, this
//! implementation lets them hold garbage (for example after [BitVector::set_all] or
//! [BitVector::not]) and masks them out in every operation that reads whole words: counting,
//! searching, comparing and encoding.
//!
//! The vector only grows and shrinks at its tail.

use crate::{Cursor, Error, GrowableBuffer, Versioned};
use bytes::{Buf, BufMut};
use core::{
    fmt::{self, Formatter, Write as _},
    ops::Index,
};
use tidepool_allocator::BlockAllocator;

/// Type alias for the underlying word type.
type Word = u64;

/// Number of bits in a [Word].
pub const WORD_BITS: usize = Word::BITS as usize;

/// Empty word of bits (all bits set to 0).
const EMPTY_WORD: Word = 0;

/// Full word of bits (all bits set to 1).
const FULL_WORD: Word = Word::MAX;

/// Size in bytes of the encoded length prefix.
const LENGTH_PREFIX: usize = 8;

/// Represents a vector of bits.
pub struct BitVector {
    /// Exactly `num_words(len)` words.
    words: GrowableBuffer<Word>,
    /// The total number of bits.
    len: usize,
    /// Bumped on every write, including single-bit writes.
    version: u64,
}

impl BitVector {
    /// Creates a new, empty `BitVector`.
    pub fn new() -> Self {
        Self::new_in(BlockAllocator::shared())
    }

    /// Creates a new, empty `BitVector` whose words are rented from `allocator`.
    pub fn new_in(allocator: &BlockAllocator) -> Self {
        Self {
            words: GrowableBuffer::new_in(allocator),
            len: 0,
            version: 0,
        }
    }

    /// Creates a `BitVector` of `len` bits, all set to `value`.
    pub fn with_len(len: usize, value: bool) -> Result<Self, Error> {
        Self::with_len_in(len, value, BlockAllocator::shared())
    }

    /// Creates a `BitVector` of `len` bits, all set to `value`, whose words are rented from
    /// `allocator`.
    pub fn with_len_in(len: usize, value: bool, allocator: &BlockAllocator) -> Result<Self, Error> {
        let num_words = Self::num_words(len);
        let mut words = GrowableBuffer::with_capacity_in(num_words, allocator)?;
        words.resize(num_words, Self::fill(value))?;
        Ok(Self {
            words,
            len,
            version: 0,
        })
    }

    /// Creates a `BitVector` of `len` bits, all initialized to zero.
    pub fn zeroes(len: usize) -> Result<Self, Error> {
        Self::with_len(len, false)
    }

    /// Creates a `BitVector` of `len` bits, all initialized to one.
    pub fn ones(len: usize) -> Result<Self, Error> {
        Self::with_len(len, true)
    }

    /// Creates a `BitVector` holding the bits of `bytes`, 8 per byte.
    ///
    /// Bit 0 of each byte becomes the first of that byte's 8 bits, so byte `i` bit `j` lands at
    /// index `8 * i + j`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        Self::from_bytes_in(bytes, BlockAllocator::shared())
    }

    /// Same as [BitVector::from_bytes], renting words from `allocator`.
    pub fn from_bytes_in(bytes: &[u8], allocator: &BlockAllocator) -> Result<Self, Error> {
        let len = bytes
            .len()
            .checked_mul(8)
            .ok_or(Error::Exhausted(bytes.len()))?;
        let mut words = GrowableBuffer::with_capacity_in(Self::num_words(len), allocator)?;
        words.extend(bytes.chunks(WORD_BITS / 8).map(|chunk| {
            let mut word = [0u8; WORD_BITS / 8];
            word[..chunk.len()].copy_from_slice(chunk);
            Word::from_le_bytes(word)
        }))?;
        Ok(Self {
            words,
            len,
            version: 0,
        })
    }

    /// Creates a `BitVector` holding `bools`.
    pub fn from_bools(bools: &[bool]) -> Result<Self, Error> {
        let mut result = Self::zeroes(bools.len())?;
        let words = result.words.slice_mut();
        for (index, &bit) in bools.iter().enumerate() {
            if bit {
                words[Self::word_index(index)] |= Self::bit_mask(index);
            }
        }
        Ok(result)
    }

    /// Returns the number of bits in the vector.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the vector contains no bits.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the version, bumped on every write.
    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Returns true once the vector has been disposed.
    #[inline]
    pub fn is_disposed(&self) -> bool {
        self.words.is_disposed()
    }

    /// Gets the value of the bit at `index`.
    pub fn get(&self, index: usize) -> Result<bool, Error> {
        self.check_index(index)?;
        Ok(self.get_bit_unchecked(index))
    }

    /// Sets the bit at `index` to `value`.
    pub fn set(&mut self, index: usize, value: bool) -> Result<(), Error> {
        self.check_index(index)?;
        let mask = Self::bit_mask(index);
        let word = &mut self.words.slice_mut()[Self::word_index(index)];
        if value {
            *word |= mask;
        } else {
            *word &= !mask;
        }
        self.bump();
        Ok(())
    }

    /// Flips the bit at `index`.
    pub fn toggle(&mut self, index: usize) -> Result<(), Error> {
        self.check_index(index)?;
        self.words.slice_mut()[Self::word_index(index)] ^= Self::bit_mask(index);
        self.bump();
        Ok(())
    }

    /// Sets all bits to `value`.
    pub fn set_all(&mut self, value: bool) -> Result<(), Error> {
        self.ensure_live()?;
        self.words.slice_mut().fill(Self::fill(value));
        self.bump();
        Ok(())
    }

    /// Appends a bit to the end of the vector.
    pub fn push(&mut self, value: bool) -> Result<(), Error> {
        self.append(1, value)
    }

    /// Removes the last bit from the vector and returns it.
    ///
    /// Returns `None` if the vector is empty.
    pub fn pop(&mut self) -> Result<Option<bool>, Error> {
        self.ensure_live()?;
        if self.len == 0 {
            return Ok(None);
        }
        let value = self.get_bit_unchecked(self.len - 1);
        self.truncate_from_end(1)?;
        Ok(Some(value))
    }

    /// Appends `count` bits set to `value`.
    ///
    /// Storage is grown before any bit is written, so a failed append leaves the vector
    /// unchanged.
    pub fn append(&mut self, count: usize, value: bool) -> Result<(), Error> {
        self.ensure_live()?;
        if count == 0 {
            return Ok(());
        }
        let len = self
            .len
            .checked_add(count)
            .ok_or(Error::Exhausted(usize::MAX))?;
        let num_words = Self::num_words(len);
        self.words.ensure_capacity(num_words)?;

        // Fill the free bits of the partially used last word without touching the used ones
        let offset = Self::bit_offset(self.len);
        if offset != 0 {
            let end = (offset + count).min(WORD_BITS);
            let mask = Self::mask_from(offset) & Self::mask_over_first_n_bits(end);
            let word = &mut self.words.slice_mut()[Self::word_index(self.len)];
            if value {
                *word |= mask;
            } else {
                *word &= !mask;
            }
        }

        // Whole new words
        self.words.resize(num_words, Self::fill(value))?;
        self.len = len;
        self.bump();
        Ok(())
    }

    /// Removes `count` bits starting at `start`.
    ///
    /// Only the tail of the vector can be removed: `start + count` must equal the length.
    /// Removing any other range is [Error::NotSupported].
    pub fn remove_range(&mut self, start: usize, count: usize) -> Result<(), Error> {
        self.check_range(start, count)?;
        if count == 0 {
            return Ok(());
        }
        if start + count != self.len {
            return Err(Error::NotSupported("only the tail of a bit vector can be removed"));
        }
        self.words.truncate(Self::num_words(start))?;
        self.len = start;
        self.bump();
        Ok(())
    }

    /// Removes the last `count` bits.
    pub fn truncate_from_end(&mut self, count: usize) -> Result<(), Error> {
        self.ensure_live()?;
        if count > self.len {
            return Err(Error::OutOfRange {
                index: count,
                len: self.len,
            });
        }
        self.remove_range(self.len - count, count)
    }

    /// Grows or shrinks the vector at its tail to `len` bits, setting new bits to `value`.
    pub fn resize(&mut self, len: usize, value: bool) -> Result<(), Error> {
        self.ensure_live()?;
        if len >= self.len {
            self.append(len - self.len, value)
        } else {
            self.truncate_from_end(self.len - len)
        }
    }

    /// Returns the number of bits set to 1.
    pub fn count_ones(&self) -> Result<usize, Error> {
        self.ensure_live()?;
        let words = self.words.slice();
        let full = self.len / WORD_BITS;
        let mut count: usize = words[..full]
            .iter()
            .map(|word| word.count_ones() as usize)
            .sum();
        let remainder = Self::bit_offset(self.len);
        if remainder != 0 {
            count += (words[full] & Self::mask_over_first_n_bits(remainder)).count_ones() as usize;
        }
        Ok(count)
    }

    /// Returns the number of bits set to 0.
    pub fn count_zeros(&self) -> Result<usize, Error> {
        Ok(self.len - self.count_ones()?)
    }

    /// Performs a bitwise AND with another `BitVector`.
    pub fn and(&mut self, other: &BitVector) -> Result<(), Error> {
        self.binary_op(other, |a, b| a & b)
    }

    /// Performs a bitwise OR with another `BitVector`.
    pub fn or(&mut self, other: &BitVector) -> Result<(), Error> {
        self.binary_op(other, |a, b| a | b)
    }

    /// Performs a bitwise XOR with another `BitVector`.
    pub fn xor(&mut self, other: &BitVector) -> Result<(), Error> {
        self.binary_op(other, |a, b| a ^ b)
    }

    /// Flips all bits (1s become 0s and vice versa).
    pub fn not(&mut self) -> Result<(), Error> {
        self.ensure_live()?;
        for word in self.words.slice_mut() {
            *word = !*word;
        }
        self.bump();
        Ok(())
    }

    /// Returns the index of the first bit equal to `value` in `[start, start + count)`.
    pub fn index_of(
        &self,
        value: bool,
        start: usize,
        count: usize,
    ) -> Result<Option<usize>, Error> {
        self.check_range(start, count)?;
        if count == 0 {
            return Ok(None);
        }
        let last = start + count - 1;
        let (first_word, first_bit) = (Self::word_index(start), Self::bit_offset(start));
        let (last_word, last_bit) = (Self::word_index(last), Self::bit_offset(last));
        let head_mask = Self::mask_from(first_bit);
        let tail_mask = Self::mask_over_first_n_bits(last_bit + 1);

        // Start and end share a word
        if first_word == last_word {
            let word = self.search_word(first_word, value) & head_mask & tail_mask;
            return Ok(Self::lowest(first_word, word));
        }

        // Partially covered start word
        let word = self.search_word(first_word, value) & head_mask;
        if let Some(index) = Self::lowest(first_word, word) {
            return Ok(Some(index));
        }

        // Interior words
        for index in first_word + 1..last_word {
            if let Some(found) = Self::lowest(index, self.search_word(index, value)) {
                return Ok(Some(found));
            }
        }

        // Partially covered end word
        let word = self.search_word(last_word, value) & tail_mask;
        Ok(Self::lowest(last_word, word))
    }

    /// Returns the index of the last bit equal to `value` in `[start, start + count)`.
    pub fn last_index_of(
        &self,
        value: bool,
        start: usize,
        count: usize,
    ) -> Result<Option<usize>, Error> {
        self.check_range(start, count)?;
        if count == 0 {
            return Ok(None);
        }
        let last = start + count - 1;
        let (first_word, first_bit) = (Self::word_index(start), Self::bit_offset(start));
        let (last_word, last_bit) = (Self::word_index(last), Self::bit_offset(last));
        let head_mask = Self::mask_from(first_bit);
        let tail_mask = Self::mask_over_first_n_bits(last_bit + 1);

        if first_word == last_word {
            let word = self.search_word(last_word, value) & head_mask & tail_mask;
            return Ok(Self::highest(last_word, word));
        }

        let word = self.search_word(last_word, value) & tail_mask;
        if let Some(index) = Self::highest(last_word, word) {
            return Ok(Some(index));
        }

        for index in (first_word + 1..last_word).rev() {
            if let Some(found) = Self::highest(index, self.search_word(index, value)) {
                return Ok(Some(found));
            }
        }

        let word = self.search_word(first_word, value) & head_mask;
        Ok(Self::highest(first_word, word))
    }

    /// Returns the bits packed into bytes, the inverse of [BitVector::from_bytes]. Bits past the
    /// end of the vector in the last byte are zero.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        self.ensure_live()?;
        let num_bytes = self.len.div_ceil(8);
        let mut bytes: Vec<u8> = self
            .words
            .iter()
            .flat_map(|word| word.to_le_bytes())
            .take(num_bytes)
            .collect();
        let remainder = self.len % 8;
        if remainder != 0 {
            if let Some(last) = bytes.last_mut() {
                *last &= (1u8 << remainder) - 1;
            }
        }
        Ok(bytes)
    }

    /// Creates an iterator over the bits.
    ///
    /// Unlike the other reads this does not report [Error::Disposed]: a disposed vector yields
    /// nothing.
    pub fn iter(&self) -> BitIterator<'_> {
        BitIterator { vec: self, pos: 0 }
    }

    /// Returns a [Cursor] positioned before the first bit.
    pub fn cursor(&self) -> Result<Cursor, Error> {
        Cursor::new(self)
    }

    /// Returns the bit under `cursor`.
    pub fn current(&self, cursor: &Cursor) -> Option<bool> {
        if !cursor.belongs_to(self) {
            return None;
        }
        cursor
            .position()
            .filter(|&index| index < self.len)
            .map(|index| self.get_bit_unchecked(index))
    }

    /// Returns an independent copy with its own storage.
    pub fn try_clone(&self) -> Result<Self, Error> {
        Ok(Self {
            words: self.words.try_clone()?,
            len: self.len,
            version: 0,
        })
    }

    /// Releases the underlying storage. Calling this more than once has no further effect.
    pub fn dispose(&mut self) {
        self.words.dispose();
        self.len = 0;
    }

    // ---------- Encoding ----------

    /// Returns the number of bytes [BitVector::write] produces.
    pub fn encode_size(&self) -> usize {
        LENGTH_PREFIX + Self::num_words(self.len) * (WORD_BITS / 8)
    }

    /// Writes the vector as its bit length followed by its words, all little-endian. Bits past
    /// the end of the vector are written as zero.
    pub fn write(&self, buf: &mut impl BufMut) -> Result<(), Error> {
        self.ensure_live()?;
        buf.put_u64_le(self.len as u64);
        let words = self.words.slice();
        for (index, &word) in words.iter().enumerate() {
            buf.put_u64_le(if index + 1 == words.len() {
                self.masked_last(word)
            } else {
                word
            });
        }
        Ok(())
    }

    /// Reads a vector written by [BitVector::write], accepting at most `max_len` bits.
    pub fn read(buf: &mut impl Buf, max_len: usize) -> Result<Self, Error> {
        if buf.remaining() < LENGTH_PREFIX {
            return Err(Error::Invalid("missing length"));
        }
        let len = usize::try_from(buf.get_u64_le()).map_err(|_| Error::Invalid("length overflow"))?;
        if len > max_len {
            return Err(Error::Invalid("length exceeds limit"));
        }
        let num_words = Self::num_words(len);
        if buf.remaining() / (WORD_BITS / 8) < num_words {
            return Err(Error::Invalid("truncated words"));
        }

        let mut words = GrowableBuffer::with_capacity(num_words)?;
        words.extend(std::iter::repeat_with(|| buf.get_u64_le()).take(num_words))?;
        let result = Self {
            words,
            len,
            version: 0,
        };

        // Ensure there were no trailing bits
        if let Some(&last) = result.words.slice().last() {
            if result.masked_last(last) != last {
                return Err(Error::Invalid("trailing bits"));
            }
        }
        Ok(result)
    }

    // ---------- Helper Functions ----------

    /// Calculates the word index for a given bit index.
    #[inline(always)]
    fn word_index(index: usize) -> usize {
        index / WORD_BITS
    }

    /// Calculates the bit offset within a word.
    #[inline(always)]
    fn bit_offset(index: usize) -> usize {
        index % WORD_BITS
    }

    /// Calculates the number of words needed to store `num_bits`.
    #[inline(always)]
    fn num_words(num_bits: usize) -> usize {
        num_bits.div_ceil(WORD_BITS)
    }

    /// Returns the single-bit mask for `index` within its word.
    #[inline(always)]
    fn bit_mask(index: usize) -> Word {
        1 << Self::bit_offset(index)
    }

    /// Creates a mask with the first `num_bits` bits set to 1.
    #[inline(always)]
    fn mask_over_first_n_bits(num_bits: usize) -> Word {
        match num_bits {
            WORD_BITS => FULL_WORD,
            n if n < WORD_BITS => (1 << n) - 1,
            _ => unreachable!("num_bits exceeds word size: {num_bits}"),
        }
    }

    /// Creates a mask with bits `offset..WORD_BITS` set to 1.
    #[inline(always)]
    fn mask_from(offset: usize) -> Word {
        debug_assert!(offset < WORD_BITS);
        FULL_WORD << offset
    }

    #[inline(always)]
    fn fill(value: bool) -> Word {
        if value {
            FULL_WORD
        } else {
            EMPTY_WORD
        }
    }

    /// Returns the word at `index`, inverted when searching for zeros so that the bits of
    /// interest are always ones.
    #[inline(always)]
    fn search_word(&self, index: usize, value: bool) -> Word {
        let word = self.words.slice()[index];
        if value {
            word
        } else {
            !word
        }
    }

    /// Returns the bit index of the lowest set bit of `word`, the `index`-th word.
    #[inline(always)]
    fn lowest(index: usize, word: Word) -> Option<usize> {
        (word != 0).then(|| index * WORD_BITS + word.trailing_zeros() as usize)
    }

    /// Returns the bit index of the highest set bit of `word`, the `index`-th word.
    #[inline(always)]
    fn highest(index: usize, word: Word) -> Option<usize> {
        (word != 0).then(|| index * WORD_BITS + (WORD_BITS - 1 - word.leading_zeros() as usize))
    }

    /// Clears the bits of the last word that lie past the end of the vector.
    #[inline(always)]
    fn masked_last(&self, word: Word) -> Word {
        match Self::bit_offset(self.len) {
            0 => word,
            remainder => word & Self::mask_over_first_n_bits(remainder),
        }
    }

    #[inline(always)]
    fn get_bit_unchecked(&self, index: usize) -> bool {
        (self.words.slice()[Self::word_index(index)] & Self::bit_mask(index)) != 0
    }

    #[inline]
    fn ensure_live(&self) -> Result<(), Error> {
        if self.words.is_disposed() {
            return Err(Error::Disposed);
        }
        Ok(())
    }

    /// Checks that `index` addresses a bit of the vector.
    #[inline]
    fn check_index(&self, index: usize) -> Result<(), Error> {
        self.ensure_live()?;
        if index >= self.len {
            return Err(Error::OutOfRange {
                index,
                len: self.len,
            });
        }
        Ok(())
    }

    /// Checks that `[start, start + count)` lies within the vector.
    #[inline]
    fn check_range(&self, start: usize, count: usize) -> Result<(), Error> {
        self.ensure_live()?;
        if start > self.len {
            return Err(Error::OutOfRange {
                index: start,
                len: self.len,
            });
        }
        if count > self.len - start {
            return Err(Error::OutOfRange {
                index: start.saturating_add(count),
                len: self.len,
            });
        }
        Ok(())
    }

    #[inline]
    fn bump(&mut self) {
        self.version = self.version.wrapping_add(1);
    }

    /// Helper for binary operations (AND, OR, XOR)
    fn binary_op<F: Fn(Word, Word) -> Word>(
        &mut self,
        other: &BitVector,
        op: F,
    ) -> Result<(), Error> {
        self.ensure_live()?;
        other.ensure_live()?;
        if self.len != other.len {
            return Err(Error::SizeMismatch(self.len, other.len));
        }
        for (a, b) in self.words.slice_mut().iter_mut().zip(other.words.slice()) {
            *a = op(*a, *b);
        }
        self.bump();
        Ok(())
    }
}

impl Versioned for BitVector {
    fn id(&self) -> u64 {
        // The word buffer is owned exclusively, so its id is unique to this vector.
        self.words.id()
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn len(&self) -> usize {
        self.len
    }

    fn is_disposed(&self) -> bool {
        self.words.is_disposed()
    }
}

impl Default for BitVector {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for BitVector {
    fn eq(&self, other: &Self) -> bool {
        if self.len != other.len || self.is_disposed() != other.is_disposed() {
            return false;
        }
        let (a, b) = (self.words.slice(), other.words.slice());
        let Some((&a_last, a_full)) = a.split_last() else {
            return true;
        };
        let Some((&b_last, b_full)) = b.split_last() else {
            return true;
        };
        a_full == b_full && self.masked_last(a_last) == other.masked_last(b_last)
    }
}

impl Eq for BitVector {}

impl fmt::Debug for BitVector {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        // For very large BitVectors, only show a preview
        const MAX_DISPLAY: usize = 64;
        const HALF_DISPLAY: usize = MAX_DISPLAY / 2;

        // Closure for writing a bit
        let write_bit = |formatter: &mut Formatter<'_>, index: usize| -> core::fmt::Result {
            formatter.write_char(if self.get_bit_unchecked(index) {
                '1'
            } else {
                '0'
            })
        };

        f.write_str("BitVector[")?;
        if self.len <= MAX_DISPLAY {
            for i in 0..self.len {
                write_bit(f, i)?;
            }
        } else {
            for i in 0..HALF_DISPLAY {
                write_bit(f, i)?;
            }

            f.write_str("...")?;

            for i in (self.len - HALF_DISPLAY)..self.len {
                write_bit(f, i)?;
            }
        }
        f.write_str("]")
    }
}

impl Index<usize> for BitVector {
    type Output = bool;

    /// Allows accessing bits using the `[]` operator.
    ///
    /// Panics if out of bounds.
    #[inline]
    fn index(&self, index: usize) -> &Self::Output {
        assert!(index < self.len, "Index out of bounds");
        if self.get_bit_unchecked(index) {
            &true
        } else {
            &false
        }
    }
}

impl From<BitVector> for Vec<bool> {
    fn from(bv: BitVector) -> Self {
        bv.iter().collect()
    }
}

// ---------- Iterator ----------

/// Iterator over bits in a BitVector
pub struct BitIterator<'a> {
    /// Reference to the BitVector being iterated over
    vec: &'a BitVector,

    /// Current position in the BitVector (0-indexed)
    pos: usize,
}

impl Iterator for BitIterator<'_> {
    type Item = bool;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.vec.len() {
            return None;
        }

        let bit = self.vec.get_bit_unchecked(self.pos);
        self.pos += 1;
        Some(bit)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.vec.len() - self.pos;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for BitIterator<'_> {}

impl<'a> IntoIterator for &'a BitVector {
    type Item = bool;
    type IntoIter = BitIterator<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use prometheus_client::registry::Registry;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use std::num::NonZeroUsize;
    use tidepool_allocator::AllocatorConfig;

    fn test_allocator() -> BlockAllocator {
        let mut registry = Registry::default();
        BlockAllocator::new(
            AllocatorConfig {
                min_size: NonZeroUsize::new(8).unwrap(),
                max_size: NonZeroUsize::new(1 << 16).unwrap(),
                max_per_class: NonZeroUsize::new(4).unwrap(),
                prefill: false,
                alignment: NonZeroUsize::new(8).unwrap(),
            },
            &mut registry,
        )
    }

    /// Sets every bit past the end of the vector in its last word.
    fn dirty_trailing_bits(bv: &mut BitVector) {
        let remainder = BitVector::bit_offset(bv.len());
        if remainder != 0 {
            if let Some(last) = bv.words.slice_mut().last_mut() {
                *last |= !BitVector::mask_over_first_n_bits(remainder);
            }
        }
    }

    #[test]
    fn test_constructors() {
        // Test new()
        let bv = BitVector::new();
        assert_eq!(bv.len(), 0);
        assert!(bv.is_empty());
        assert_eq!(bv.words.len(), 0);

        // Test zeroes()
        let bv = BitVector::zeroes(100).unwrap();
        assert_eq!(bv.len(), 100);
        assert_eq!(bv.words.len(), 2);
        assert_eq!(bv.count_zeros().unwrap(), 100);
        for i in 0..100 {
            assert!(!bv.get(i).unwrap());
        }

        // Test ones()
        let bv = BitVector::ones(100).unwrap();
        assert_eq!(bv.count_ones().unwrap(), 100);
        for i in 0..100 {
            assert!(bv.get(i).unwrap());
        }

        // Test from_bools()
        let bv = BitVector::from_bools(&[true, false, true, false, true]).unwrap();
        assert_eq!(bv.len(), 5);
        assert_eq!(bv.count_ones().unwrap(), 3);

        // Test with_len_in()
        let allocator = test_allocator();
        let bv = BitVector::with_len_in(130, true, &allocator).unwrap();
        assert_eq!(bv.len(), 130);
        assert_eq!(bv.count_ones().unwrap(), 130);
        assert_eq!(allocator.allocated(32), 1);

        // Test Default trait
        let bv: BitVector = Default::default();
        assert!(bv.is_empty());
    }

    #[test]
    fn test_scenario_set_search_and() {
        let mut bv = BitVector::zeroes(10).unwrap();
        bv.set(3, true).unwrap();
        bv.set(7, true).unwrap();
        assert_eq!(bv.index_of(true, 0, 10).unwrap(), Some(3));
        assert_eq!(bv.index_of(true, 4, 6).unwrap(), Some(7));
        assert_eq!(bv.count_ones().unwrap(), 2);

        let zeros = BitVector::zeroes(10).unwrap();
        bv.and(&zeros).unwrap();
        assert_eq!(bv, zeros);
        assert_eq!(bv.count_ones().unwrap(), 0);
    }

    #[test]
    fn test_from_bytes() {
        // Bit 0 is the lowest order bit of the byte
        let bv = BitVector::from_bytes(&[0b1011_0000]).unwrap();
        let bits: Vec<bool> = bv.iter().collect();
        assert_eq!(
            bits,
            vec![false, false, false, false, true, true, false, true]
        );

        // Multiple words
        let bytes: Vec<u8> = (0..20).collect();
        let bv = BitVector::from_bytes(&bytes).unwrap();
        assert_eq!(bv.len(), 160);
        assert_eq!(bv.words.len(), 3);
        for (i, byte) in bytes.iter().enumerate() {
            for j in 0..8 {
                assert_eq!(bv.get(i * 8 + j).unwrap(), (byte >> j) & 1 == 1);
            }
        }
        assert_eq!(bv.to_bytes().unwrap(), bytes);

        // Empty
        let bv = BitVector::from_bytes(&[]).unwrap();
        assert!(bv.is_empty());
    }

    #[test]
    fn test_set_get_toggle() {
        let mut bv = BitVector::zeroes(200).unwrap();
        for i in [0, 1, 63, 64, 65, 127, 128, 199] {
            let before: Vec<bool> = bv.iter().collect();
            bv.set(i, true).unwrap();
            assert!(bv.get(i).unwrap());
            for (j, &bit) in before.iter().enumerate() {
                if j != i {
                    assert_eq!(bv.get(j).unwrap(), bit);
                }
            }
        }
        assert_eq!(bv.count_ones().unwrap(), 8);

        bv.toggle(64).unwrap();
        assert!(!bv.get(64).unwrap());
        bv.toggle(64).unwrap();
        assert!(bv.get(64).unwrap());

        bv.set(64, false).unwrap();
        assert!(!bv[64]);
        assert!(bv[63]);
    }

    #[test]
    fn test_out_of_range() {
        let mut bv = BitVector::zeroes(10).unwrap();
        let err = Error::OutOfRange { index: 10, len: 10 };
        assert_eq!(bv.get(10).unwrap_err(), err);
        assert_eq!(bv.set(10, true).unwrap_err(), err);
        assert_eq!(bv.toggle(10).unwrap_err(), err);
        assert!(matches!(
            bv.index_of(true, 11, 0),
            Err(Error::OutOfRange { .. })
        ));
        assert!(matches!(
            bv.index_of(true, 5, 6),
            Err(Error::OutOfRange { .. })
        ));
        assert!(matches!(
            bv.truncate_from_end(11),
            Err(Error::OutOfRange { .. })
        ));

        // Empty ranges at the end are fine
        assert_eq!(bv.index_of(true, 10, 0).unwrap(), None);
        assert_eq!(bv.version(), 0);
    }

    #[test]
    #[should_panic(expected = "Index out of bounds")]
    fn test_index_out_of_bounds() {
        let bv = BitVector::zeroes(10).unwrap();
        let _ = bv[10];
    }

    #[test]
    fn test_count_operations() {
        // Test case 1: empty
        let bv = BitVector::new();
        assert_eq!(bv.count_ones().unwrap(), 0);
        assert_eq!(bv.count_zeros().unwrap(), 0);

        // Test case 2: exact word boundary
        let bv = BitVector::ones(128).unwrap();
        assert_eq!(bv.count_ones().unwrap(), 128);

        // Test case 3: partial word ignores trailing bits
        let mut bv = BitVector::zeroes(70).unwrap();
        dirty_trailing_bits(&mut bv);
        assert_eq!(bv.count_ones().unwrap(), 0);
        assert_eq!(bv.count_zeros().unwrap(), 70);

        // Test case 4: mixed
        let bv = BitVector::from_bools(&[true, true, false, true]).unwrap();
        assert_eq!(bv.count_ones().unwrap(), 3);
        assert_eq!(bv.count_zeros().unwrap(), 1);
    }

    #[test]
    fn test_set_all_and_not() {
        let mut bv = BitVector::zeroes(70).unwrap();
        bv.set_all(true).unwrap();
        assert_eq!(bv.count_ones().unwrap(), 70);
        bv.set_all(false).unwrap();
        assert_eq!(bv.count_ones().unwrap(), 0);

        bv.set(5, true).unwrap();
        bv.not().unwrap();
        assert_eq!(bv.count_ones().unwrap(), 69);
        assert!(!bv.get(5).unwrap());

        // Not on an all-ones vector leaves garbage only past the end
        let mut bv = BitVector::ones(70).unwrap();
        bv.not().unwrap();
        assert_eq!(bv, BitVector::zeroes(70).unwrap());
        assert_eq!(bv.index_of(true, 0, 70).unwrap(), None);
    }

    #[test]
    fn test_bitwise_operations() {
        let a = BitVector::from_bools(&[true, true, false, false, true]).unwrap();
        let b = BitVector::from_bools(&[true, false, true, false, false]).unwrap();

        let mut and = a.try_clone().unwrap();
        and.and(&b).unwrap();
        assert_eq!(
            and,
            BitVector::from_bools(&[true, false, false, false, false]).unwrap()
        );

        let mut or = a.try_clone().unwrap();
        or.or(&b).unwrap();
        assert_eq!(
            or,
            BitVector::from_bools(&[true, true, true, false, true]).unwrap()
        );

        let mut xor = a.try_clone().unwrap();
        xor.xor(&b).unwrap();
        assert_eq!(
            xor,
            BitVector::from_bools(&[false, true, true, false, true]).unwrap()
        );

        // Length mismatch
        let mut short = BitVector::zeroes(4).unwrap();
        assert_eq!(short.and(&a).unwrap_err(), Error::SizeMismatch(4, 5));
        assert_eq!(short.or(&a).unwrap_err(), Error::SizeMismatch(4, 5));
        assert_eq!(short.xor(&a).unwrap_err(), Error::SizeMismatch(4, 5));
        assert_eq!(short.version(), 0);
    }

    #[test]
    fn test_algebraic_identities() {
        let mut rng = StdRng::seed_from_u64(0);
        for len in [1, 63, 64, 65, 200] {
            let bools: Vec<bool> = (0..len).map(|_| rng.gen()).collect();
            let a = BitVector::from_bools(&bools).unwrap();

            // A & A == A
            let mut result = a.try_clone().unwrap();
            result.and(&a).unwrap();
            assert_eq!(result, a);

            // A | !A == ones
            let mut inverted = a.try_clone().unwrap();
            inverted.not().unwrap();
            let mut result = a.try_clone().unwrap();
            result.or(&inverted).unwrap();
            assert_eq!(result, BitVector::ones(len).unwrap());
            assert_eq!(result.count_ones().unwrap(), len);

            // A ^ A == zeros
            let mut result = a.try_clone().unwrap();
            result.xor(&a).unwrap();
            assert_eq!(result, BitVector::zeroes(len).unwrap());
        }
    }

    #[test]
    fn test_index_of() {
        // Test case 1: nothing to find
        let bv = BitVector::zeroes(300).unwrap();
        assert_eq!(bv.index_of(true, 0, 300).unwrap(), None);
        assert_eq!(bv.index_of(false, 0, 300).unwrap(), Some(0));

        // Test case 2: single word range
        let bv = BitVector::from_bools(&[false, true, false, true]).unwrap();
        assert_eq!(bv.index_of(true, 0, 4).unwrap(), Some(1));
        assert_eq!(bv.index_of(true, 2, 2).unwrap(), Some(3));
        assert_eq!(bv.index_of(true, 2, 1).unwrap(), None);
        assert_eq!(bv.index_of(false, 1, 3).unwrap(), Some(2));

        // Test case 3: across words
        let mut bv = BitVector::zeroes(300).unwrap();
        bv.set(250, true).unwrap();
        assert_eq!(bv.index_of(true, 1, 299).unwrap(), Some(250));
        assert_eq!(bv.index_of(true, 64, 187).unwrap(), Some(250));
        assert_eq!(bv.index_of(true, 64, 186).unwrap(), None);
        assert_eq!(bv.index_of(true, 251, 49).unwrap(), None);

        // Test case 4: range ends at a word boundary
        bv.set(127, true).unwrap();
        assert_eq!(bv.index_of(true, 100, 28).unwrap(), Some(127));
        assert_eq!(bv.index_of(true, 100, 27).unwrap(), None);

        // Test case 5: searching for zeros ignores garbage past the end
        let mut bv = BitVector::ones(70).unwrap();
        bv.set_all(false).unwrap();
        bv.not().unwrap();
        assert_eq!(bv.index_of(false, 0, 70).unwrap(), None);
    }

    #[test]
    fn test_last_index_of() {
        let mut bv = BitVector::zeroes(300).unwrap();
        assert_eq!(bv.last_index_of(true, 0, 300).unwrap(), None);
        assert_eq!(bv.last_index_of(false, 0, 300).unwrap(), Some(299));

        bv.set(3, true).unwrap();
        bv.set(130, true).unwrap();
        assert_eq!(bv.last_index_of(true, 0, 300).unwrap(), Some(130));
        assert_eq!(bv.last_index_of(true, 0, 130).unwrap(), Some(3));
        assert_eq!(bv.last_index_of(true, 4, 126).unwrap(), None);
        assert_eq!(bv.last_index_of(true, 3, 1).unwrap(), Some(3));
        assert_eq!(bv.last_index_of(true, 0, 0).unwrap(), None);
    }

    #[test]
    fn test_search_matches_linear_scan() {
        let mut rng = StdRng::seed_from_u64(1);
        let bools: Vec<bool> = (0..500).map(|_| rng.gen_bool(0.05)).collect();
        let bv = BitVector::from_bools(&bools).unwrap();
        for _ in 0..1000 {
            let start = rng.gen_range(0..=bools.len());
            let count = rng.gen_range(0..=bools.len() - start);
            let value = rng.gen();
            let range = start..start + count;
            let first = range.clone().find(|&i| bools[i] == value);
            let last = range.rev().find(|&i| bools[i] == value);
            assert_eq!(bv.index_of(value, start, count).unwrap(), first);
            assert_eq!(bv.last_index_of(value, start, count).unwrap(), last);
        }
    }

    #[test]
    fn test_push_pop() {
        let mut bv = BitVector::new();
        assert_eq!(bv.pop().unwrap(), None);
        for i in 0..130 {
            bv.push(i % 3 == 0).unwrap();
        }
        assert_eq!(bv.len(), 130);
        assert_eq!(bv.words.len(), 3);
        for i in (0..130).rev() {
            assert_eq!(bv.pop().unwrap(), Some(i % 3 == 0));
        }
        assert!(bv.is_empty());
        assert_eq!(bv.words.len(), 0);
    }

    #[test]
    fn test_append() {
        // Test case 1: within a word
        let mut bv = BitVector::zeroes(3).unwrap();
        bv.append(4, true).unwrap();
        assert_eq!(bv.len(), 7);
        assert_eq!(bv.count_ones().unwrap(), 4);
        assert_eq!(bv.index_of(true, 0, 7).unwrap(), Some(3));

        // Test case 2: crossing into new words
        bv.append(200, true).unwrap();
        assert_eq!(bv.len(), 207);
        assert_eq!(bv.count_ones().unwrap(), 204);
        assert_eq!(bv.words.len(), 4);

        // Test case 3: appending zeros over garbage
        let mut bv = BitVector::ones(10).unwrap();
        dirty_trailing_bits(&mut bv);
        bv.append(60, false).unwrap();
        assert_eq!(bv.count_ones().unwrap(), 10);
        assert_eq!(bv.index_of(true, 10, 60).unwrap(), None);

        // Test case 4: appending nothing leaves the version alone
        let version = bv.version();
        bv.append(0, true).unwrap();
        assert_eq!(bv.version(), version);
    }

    #[test]
    fn test_append_then_truncate() {
        let mut rng = StdRng::seed_from_u64(2);
        for _ in 0..100 {
            let bools: Vec<bool> = (0..rng.gen_range(0..200)).map(|_| rng.gen()).collect();
            let mut bv = BitVector::from_bools(&bools).unwrap();
            let original = bv.try_clone().unwrap();

            let count = rng.gen_range(0..200);
            bv.append(count, rng.gen()).unwrap();
            assert_eq!(bv.len(), bools.len() + count);
            bv.truncate_from_end(count).unwrap();
            assert_eq!(bv, original);
            assert_eq!(Vec::<bool>::from(bv), bools);
        }
    }

    #[test]
    fn test_remove_range() {
        let mut bv = BitVector::ones(100).unwrap();

        // Only the tail can go
        assert!(matches!(
            bv.remove_range(10, 10),
            Err(Error::NotSupported(_))
        ));
        assert!(matches!(
            bv.remove_range(95, 10),
            Err(Error::OutOfRange { .. })
        ));
        assert_eq!(bv.len(), 100);
        assert_eq!(bv.version(), 0);

        // Empty ranges anywhere are accepted
        bv.remove_range(10, 0).unwrap();
        assert_eq!(bv.version(), 0);

        bv.remove_range(60, 40).unwrap();
        assert_eq!(bv.len(), 60);
        assert_eq!(bv.words.len(), 1);
        assert_eq!(bv.count_ones().unwrap(), 60);

        bv.remove_range(0, 60).unwrap();
        assert!(bv.is_empty());
    }

    #[test]
    fn test_resize() {
        let mut bv = BitVector::zeroes(10).unwrap();
        bv.resize(100, true).unwrap();
        assert_eq!(bv.len(), 100);
        assert_eq!(bv.count_ones().unwrap(), 90);
        bv.resize(5, true).unwrap();
        assert_eq!(bv.len(), 5);
        assert_eq!(bv.count_ones().unwrap(), 0);
        bv.resize(70, false).unwrap();
        assert_eq!(bv.count_ones().unwrap(), 0);
    }

    #[test]
    fn test_exhausted_append_leaves_vector_unchanged() {
        let allocator = test_allocator();
        let mut bv = BitVector::with_len_in(100, true, &allocator).unwrap();
        let version = bv.version();

        // The new length is not representable
        assert_eq!(
            bv.append(usize::MAX, true).unwrap_err(),
            Error::Exhausted(usize::MAX)
        );
        assert_eq!(bv.len(), 100);
        assert_eq!(bv.count_ones().unwrap(), 100);
        assert_eq!(bv.version(), version);
        assert_eq!(allocator.allocated(16), 1);
    }

    #[test]
    fn test_version_bumps_on_every_write() {
        let mut bv = BitVector::zeroes(10).unwrap();
        let other = BitVector::ones(10).unwrap();
        assert_eq!(bv.version(), 0);

        bv.set(0, true).unwrap();
        assert_eq!(bv.version(), 1);
        bv.set(0, true).unwrap();
        assert_eq!(bv.version(), 2);
        bv.toggle(1).unwrap();
        bv.set_all(false).unwrap();
        bv.push(true).unwrap();
        bv.pop().unwrap();
        bv.and(&other).unwrap();
        bv.or(&other).unwrap();
        bv.xor(&other).unwrap();
        bv.not().unwrap();
        assert_eq!(bv.version(), 10);

        // Reads leave the version alone
        bv.get(0).unwrap();
        bv.count_ones().unwrap();
        bv.index_of(true, 0, 10).unwrap();
        bv.to_bytes().unwrap();
        assert_eq!(bv.version(), 10);
    }

    #[test]
    fn test_equality_ignores_trailing_bits() {
        let mut a = BitVector::from_bools(&[true, false, true]).unwrap();
        let b = BitVector::from_bools(&[true, false, true]).unwrap();
        assert_eq!(a, b);

        dirty_trailing_bits(&mut a);
        assert_eq!(a, b);

        // A real difference is still seen
        a.set(1, true).unwrap();
        assert_ne!(a, b);

        // Length differences too
        assert_ne!(
            BitVector::zeroes(3).unwrap(),
            BitVector::zeroes(4).unwrap()
        );
        assert_eq!(BitVector::new(), BitVector::zeroes(0).unwrap());
    }

    #[test]
    fn test_iterator() {
        let bools = [true, false, false, true, true];
        let bv = BitVector::from_bools(&bools).unwrap();
        let mut iter = bv.iter();
        assert_eq!(iter.len(), 5);
        assert_eq!(iter.next(), Some(true));
        assert_eq!(iter.size_hint(), (4, Some(4)));

        let collected: Vec<bool> = (&bv).into_iter().collect();
        assert_eq!(collected, bools);

        assert_eq!(BitVector::new().iter().next(), None);
    }

    #[test]
    fn test_to_bytes_masks_trailing_bits() {
        let mut bv = BitVector::ones(12).unwrap();
        dirty_trailing_bits(&mut bv);
        assert_eq!(bv.to_bytes().unwrap(), vec![0xFF, 0x0F]);
        assert_eq!(BitVector::new().to_bytes().unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_encoding_roundtrip() {
        for len in [0, 1, 63, 64, 65, 1000] {
            let mut bv = BitVector::ones(len).unwrap();
            dirty_trailing_bits(&mut bv);

            let mut buf = BytesMut::new();
            bv.write(&mut buf).unwrap();
            assert_eq!(buf.len(), bv.encode_size());

            let decoded = BitVector::read(&mut buf.as_ref(), len).unwrap();
            assert_eq!(decoded, bv);
            assert_eq!(decoded.len(), len);
        }
    }

    #[test]
    fn test_encoding_errors() {
        let bv = BitVector::ones(70).unwrap();
        let mut buf = BytesMut::new();
        bv.write(&mut buf).unwrap();

        // Length over the limit
        assert_eq!(
            BitVector::read(&mut buf.as_ref(), 69).unwrap_err(),
            Error::Invalid("length exceeds limit")
        );

        // Truncated
        assert_eq!(
            BitVector::read(&mut &buf[..buf.len() - 1], 70).unwrap_err(),
            Error::Invalid("truncated words")
        );
        assert_eq!(
            BitVector::read(&mut &buf[..4], 70).unwrap_err(),
            Error::Invalid("missing length")
        );

        // Non-zero trailing bits
        let mut corrupt = buf.to_vec();
        let last = corrupt.len() - 1;
        corrupt[last] |= 0x80;
        assert_eq!(
            BitVector::read(&mut corrupt.as_slice(), 70).unwrap_err(),
            Error::Invalid("trailing bits")
        );
    }

    #[test]
    fn test_debug_formatting() {
        // Test case 1: empty
        assert_eq!(format!("{:?}", BitVector::new()), "BitVector[]");

        // Test case 2: small
        let bv = BitVector::from_bools(&[true, false, true, false, true]).unwrap();
        assert_eq!(format!("{:?}", bv), "BitVector[10101]");

        // Test case 3: at the display limit
        let pattern: Vec<bool> = (0..64).map(|i| i % 2 == 0).collect();
        let bv = BitVector::from_bools(&pattern).unwrap();
        assert_eq!(format!("{:?}", bv), format!("BitVector[{}]", "10".repeat(32)));

        // Test case 4: preview
        let pattern: Vec<bool> = (0..100).map(|i| i % 2 == 0).collect();
        let bv = BitVector::from_bools(&pattern).unwrap();
        let half = "10".repeat(16);
        assert_eq!(format!("{:?}", bv), format!("BitVector[{half}...{half}]"));
    }

    #[test]
    fn test_clone_is_independent() {
        let allocator = test_allocator();
        let original = BitVector::with_len_in(100, false, &allocator).unwrap();
        let mut copy = original.try_clone().unwrap();
        copy.set(50, true).unwrap();
        assert!(!original.get(50).unwrap());
        assert_eq!(copy.count_ones().unwrap(), 1);
        assert_eq!(allocator.allocated(16), 2);
    }

    #[test]
    fn test_dispose() {
        let allocator = test_allocator();
        let mut bv = BitVector::with_len_in(100, true, &allocator).unwrap();
        assert_eq!(allocator.available(16), 0);

        bv.dispose();
        assert!(bv.is_disposed());
        assert_eq!(allocator.available(16), 1);

        // Idempotent
        bv.dispose();
        assert_eq!(allocator.available(16), 1);

        assert_eq!(bv.get(0).unwrap_err(), Error::Disposed);
        assert_eq!(bv.push(true).unwrap_err(), Error::Disposed);
        assert_eq!(bv.not().unwrap_err(), Error::Disposed);
        assert_eq!(bv.index_of(true, 0, 0).unwrap_err(), Error::Disposed);
        assert_eq!(bv.cursor().unwrap_err(), Error::Disposed);
        assert_eq!(bv.to_bytes().unwrap_err(), Error::Disposed);
        assert_eq!(bv.count_ones().unwrap_err(), Error::Disposed);
        assert_eq!(bv.count_zeros().unwrap_err(), Error::Disposed);
        assert!(bv.iter().next().is_none());

        // A disposed vector never equals a live one, even an empty one
        assert_ne!(bv, BitVector::new());
        let mut other_disposed = BitVector::ones(10).unwrap();
        other_disposed.dispose();
        assert_eq!(bv, other_disposed);

        let mut other = BitVector::new();
        assert_eq!(other.and(&bv).unwrap_err(), Error::Disposed);
    }

    #[test]
    fn test_drop_returns_storage() {
        let allocator = test_allocator();
        {
            let _bv = BitVector::with_len_in(100, true, &allocator).unwrap();
        }
        assert_eq!(allocator.available(16), 1);
    }

    #[test]
    fn test_random_operations_match_model() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut bv = BitVector::new();
        let mut model: Vec<bool> = Vec::new();
        for _ in 0..5_000 {
            match rng.gen_range(0..7) {
                0 => {
                    let value = rng.gen();
                    bv.push(value).unwrap();
                    model.push(value);
                }
                1 => assert_eq!(bv.pop().unwrap(), model.pop()),
                2 if !model.is_empty() => {
                    let index = rng.gen_range(0..model.len());
                    let value = rng.gen();
                    bv.set(index, value).unwrap();
                    model[index] = value;
                }
                3 if !model.is_empty() => {
                    let index = rng.gen_range(0..model.len());
                    bv.toggle(index).unwrap();
                    model[index] = !model[index];
                }
                4 => {
                    let count = rng.gen_range(0..100);
                    let value = rng.gen();
                    bv.append(count, value).unwrap();
                    model.extend(std::iter::repeat(value).take(count));
                }
                5 => {
                    let count = rng.gen_range(0..=model.len().min(100));
                    bv.truncate_from_end(count).unwrap();
                    model.truncate(model.len() - count);
                }
                6 => {
                    bv.not().unwrap();
                    model.iter_mut().for_each(|bit| *bit = !*bit);
                }
                _ => {}
            }
            assert_eq!(bv.len(), model.len());
            assert_eq!(bv.count_ones().unwrap(), model.iter().filter(|&&bit| bit).count());
        }
        assert_eq!(bv.iter().collect::<Vec<_>>(), model);
    }
}
