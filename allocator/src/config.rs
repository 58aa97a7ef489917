use crate::NZUsize;
use std::num::NonZeroUsize;

/// Returns the system page size.
///
/// On Unix systems, queries the actual page size via `sysconf`.
/// On other systems, defaults to 4KB.
#[cfg(unix)]
pub fn page_size() -> usize {
    // SAFETY: sysconf is safe to call.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size <= 0 {
        4096
    } else {
        size as usize
    }
}

#[cfg(not(unix))]
pub fn page_size() -> usize {
    4096
}

/// Returns the cache line size for the current architecture.
///
/// Uses 128 bytes for x86_64 and aarch64 to account for adjacent-line prefetching and 64 bytes
/// everywhere else.
pub const fn cache_line_size() -> usize {
    cfg_if::cfg_if! {
        if #[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))] {
            128
        } else {
            64
        }
    }
}

/// Configuration for a [crate::BlockAllocator].
#[derive(Debug, Clone)]
pub struct AllocatorConfig {
    /// Smallest block handed out by the pool. Must be >= alignment and a power of two.
    pub min_size: NonZeroUsize,
    /// Largest pooled block. Must be a power of two and >= min_size.
    pub max_size: NonZeroUsize,
    /// Maximum number of blocks retained per size class.
    pub max_per_class: NonZeroUsize,
    /// Whether to allocate every block up front.
    pub prefill: bool,
    /// Alignment of every pooled block. Must be a power of two.
    pub alignment: NonZeroUsize,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self::for_small_blocks()
    }
}

impl AllocatorConfig {
    /// Preset for in-memory collections: cache-line aligned, cache_line_size to 1MB blocks, 64
    /// per class, not prefilled.
    pub const fn for_small_blocks() -> Self {
        let cache_line = NZUsize!(cache_line_size());
        Self {
            min_size: cache_line,
            max_size: NZUsize!(1024 * 1024),
            max_per_class: NZUsize!(64),
            prefill: false,
            alignment: cache_line,
        }
    }

    /// Preset for large, long-lived buffers: page aligned, page_size to 64MB blocks, 8 per
    /// class, not prefilled.
    pub fn for_large_blocks() -> Self {
        let page = NZUsize!(page_size());
        Self {
            min_size: page,
            max_size: NZUsize!(64 * 1024 * 1024),
            max_per_class: NZUsize!(8),
            prefill: false,
            alignment: page,
        }
    }

    /// Validates the configuration, panicking on invalid values.
    ///
    /// # Panics
    ///
    /// - `alignment` is not a power of two
    /// - `min_size` is not a power of two
    /// - `max_size` is not a power of two
    /// - `max_size` exceeds `isize::MAX`
    /// - `min_size < alignment`
    /// - `max_size < min_size`
    pub fn validate(&self) {
        assert!(
            self.alignment.is_power_of_two(),
            "alignment must be a power of two"
        );
        assert!(
            self.min_size.is_power_of_two(),
            "min_size must be a power of two"
        );
        assert!(
            self.max_size.is_power_of_two(),
            "max_size must be a power of two"
        );
        assert!(
            self.max_size.get() <= isize::MAX as usize,
            "max_size must not exceed isize::MAX"
        );
        assert!(
            self.min_size >= self.alignment,
            "min_size ({}) must be >= alignment ({})",
            self.min_size,
            self.alignment
        );
        assert!(
            self.max_size >= self.min_size,
            "max_size must be >= min_size"
        );
    }

    /// Returns the number of size classes.
    pub(crate) fn num_classes(&self) -> usize {
        if self.max_size < self.min_size {
            return 0;
        }
        // Classes are: min_size, min_size*2, min_size*4, ..., max_size
        (self.max_size.get() / self.min_size.get()).trailing_zeros() as usize + 1
    }

    /// Returns the size class that serves a request of `size` bytes, if any.
    pub(crate) fn class_index(&self, size: usize) -> Option<usize> {
        if size > self.max_size.get() {
            return None;
        }
        if size <= self.min_size.get() {
            return Some(0);
        }
        let size_class = size.next_power_of_two();
        let index = (size_class / self.min_size.get()).trailing_zeros() as usize;
        (index < self.num_classes()).then_some(index)
    }

    /// Returns the block size of a class.
    pub(crate) const fn class_size(&self, index: usize) -> usize {
        self.min_size.get() << index
    }
}
