//! Size-class block pool.
//!
//! # Thread Safety
//!
//! [BlockAllocator] is `Send + Sync` and is shared process-wide through
//! [BlockAllocator::shared]. Renting and returning are lock-free: each size class keeps its
//! freelist in a bounded [crossbeam_queue::ArrayQueue] and its counters in atomics.
//!
//! # Pool Lifecycle
//!
//! Blocks hold a weak reference to the pool that lent them. A block returned after its pool is
//! gone is deallocated directly, so a pool can be dropped while its blocks are still in use.
//!
//! # Size Classes
//!
//! Blocks are organized into power-of-two size classes from `min_size` to `max_size`. With
//! `min_size = 128` and `max_size = 1024`:
//! - Class 0: 128 bytes
//! - Class 1: 256 bytes
//! - Class 2: 512 bytes
//! - Class 3: 1024 bytes
//!
//! Requests are rounded up to the next size class, so a rented block is usually larger than
//! requested. Callers should size their data structures by [Block::capacity], not by the request.

use crate::{AllocatorConfig, Error};
use crossbeam_queue::ArrayQueue;
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, gauge::Gauge},
    registry::Registry,
};
use std::{
    alloc::{alloc, dealloc, handle_alloc_error, Layout},
    mem::ManuallyDrop,
    ptr::NonNull,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, OnceLock, Weak,
    },
};
use tracing::debug;

/// Label for allocator metrics, identifying the size class.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct SizeClassLabel {
    size_class: u64,
}

/// Metrics for the block allocator.
struct Metrics {
    /// Number of blocks currently rented out of the pool.
    allocated: Family<SizeClassLabel, Gauge>,
    /// Number of blocks waiting in a freelist.
    available: Family<SizeClassLabel, Gauge>,
    /// Total number of pooled rents.
    rents_total: Family<SizeClassLabel, Counter>,
    /// Total number of rents that found their class exhausted.
    exhausted_total: Family<SizeClassLabel, Counter>,
    /// Total number of requests larger than the largest class.
    oversized_total: Counter,
    /// Total number of blocks allocated outside the pool.
    untracked_total: Counter,
}

impl Metrics {
    fn new(registry: &mut Registry) -> Self {
        let metrics = Self {
            allocated: Family::default(),
            available: Family::default(),
            rents_total: Family::default(),
            exhausted_total: Family::default(),
            oversized_total: Counter::default(),
            untracked_total: Counter::default(),
        };

        registry.register(
            "block_allocator_allocated",
            "Number of blocks currently rented from the pool",
            metrics.allocated.clone(),
        );
        registry.register(
            "block_allocator_available",
            "Number of blocks available in the pool",
            metrics.available.clone(),
        );
        registry.register(
            "block_allocator_rents",
            "Total number of blocks rented from the pool",
            metrics.rents_total.clone(),
        );
        registry.register(
            "block_allocator_exhausted",
            "Total number of rents that found their size class exhausted",
            metrics.exhausted_total.clone(),
        );
        registry.register(
            "block_allocator_oversized",
            "Total number of rents exceeding the largest size class",
            metrics.oversized_total.clone(),
        );
        registry.register(
            "block_allocator_untracked",
            "Total number of blocks allocated outside the pool",
            metrics.untracked_total.clone(),
        );

        metrics
    }
}

/// Owned, aligned memory.
///
/// A zero-sized layout never touches the system allocator: the pointer is dangling (but aligned)
/// and nothing is deallocated on drop.
struct AlignedMemory {
    ptr: NonNull<u8>,
    layout: Layout,
}

// SAFETY: AlignedMemory owns its memory and can be sent between threads.
unsafe impl Send for AlignedMemory {}
// SAFETY: AlignedMemory has no interior mutability.
unsafe impl Sync for AlignedMemory {}

impl AlignedMemory {
    fn new(size: usize, align: usize) -> Result<Self, Error> {
        let layout =
            Layout::from_size_align(size, align).map_err(|_| Error::InvalidLayout { size, align })?;
        if size == 0 {
            return Ok(Self::dangling(layout));
        }

        // SAFETY: layout has non-zero size.
        let ptr = unsafe { alloc(layout) };
        let Some(ptr) = NonNull::new(ptr) else {
            handle_alloc_error(layout);
        };
        Ok(Self { ptr, layout })
    }

    /// Returns zero-sized memory whose pointer satisfies the alignment of `layout`.
    const fn dangling(layout: Layout) -> Self {
        // SAFETY: a layout's alignment is a non-zero power of two.
        let ptr = unsafe { NonNull::new_unchecked(layout.align() as *mut u8) };
        Self { ptr, layout }
    }

    #[inline]
    const fn size(&self) -> usize {
        self.layout.size()
    }
}

impl Drop for AlignedMemory {
    fn drop(&mut self) {
        if self.layout.size() == 0 {
            return;
        }
        // SAFETY: ptr was allocated with this layout.
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

/// Per-size-class state.
///
/// The freelist stores `Option<AlignedMemory>` where:
/// - `Some(memory)` = a reusable block
/// - `None` = an available slot for creating a new block
struct SizeClass {
    size: usize,
    alignment: usize,
    freelist: ArrayQueue<Option<AlignedMemory>>,
    /// Number of blocks currently rented out.
    allocated: AtomicUsize,
    /// Number of freelist entries holding a reusable block.
    reusable: AtomicUsize,
}

impl SizeClass {
    fn new(size: usize, alignment: usize, max_blocks: usize, prefill: bool) -> Result<Self, Error> {
        let freelist = ArrayQueue::new(max_blocks);
        for _ in 0..max_blocks {
            let entry = if prefill {
                Some(AlignedMemory::new(size, alignment)?)
            } else {
                None
            };
            let _ = freelist.push(entry);
        }
        Ok(Self {
            size,
            alignment,
            freelist,
            allocated: AtomicUsize::new(0),
            reusable: AtomicUsize::new(if prefill { max_blocks } else { 0 }),
        })
    }

    fn label(&self) -> SizeClassLabel {
        SizeClassLabel {
            size_class: self.size as u64,
        }
    }
}

struct AllocatorInner {
    config: AllocatorConfig,
    classes: Vec<SizeClass>,
    metrics: Metrics,
}

impl AllocatorInner {
    /// Take a block from the given size class. Returns `Ok(None)` if the class is exhausted.
    fn take(&self, class_index: usize) -> Result<Option<AlignedMemory>, Error> {
        let class = &self.classes[class_index];
        let label = class.label();

        let memory = match class.freelist.pop() {
            Some(Some(memory)) => {
                class.reusable.fetch_sub(1, Ordering::Relaxed);
                self.metrics.available.get_or_create(&label).dec();
                memory
            }
            Some(None) => match AlignedMemory::new(class.size, class.alignment) {
                Ok(memory) => memory,
                Err(err) => {
                    // Give the slot back so the class does not shrink.
                    let _ = class.freelist.push(None);
                    return Err(err);
                }
            },
            None => {
                self.metrics.exhausted_total.get_or_create(&label).inc();
                return Ok(None);
            }
        };

        class.allocated.fetch_add(1, Ordering::Relaxed);
        self.metrics.rents_total.get_or_create(&label).inc();
        self.metrics.allocated.get_or_create(&label).inc();
        Ok(Some(memory))
    }

    /// Return a block to its size class.
    fn give_back(&self, memory: AlignedMemory) {
        let Some(class_index) = self.config.class_index(memory.size()) else {
            return;
        };
        let class = &self.classes[class_index];
        let label = class.label();

        class.allocated.fetch_sub(1, Ordering::Relaxed);
        self.metrics.allocated.get_or_create(&label).dec();
        match class.freelist.push(Some(memory)) {
            Ok(()) => {
                class.reusable.fetch_add(1, Ordering::Relaxed);
                self.metrics.available.get_or_create(&label).inc();
            }
            Err(_memory) => {
                debug!(size = class.size, "freelist full, dropping block");
            }
        }
    }
}

/// A contiguous, aligned region of memory lent by a [BlockAllocator].
///
/// The contents of a freshly rented block are **uninitialized**. Dropping a block returns it to
/// the pool that lent it (without clearing it); use [BlockAllocator::release] to clear it first.
pub struct Block {
    memory: ManuallyDrop<AlignedMemory>,
    pool: Weak<AllocatorInner>,
}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Block")
            .field("capacity", &self.capacity())
            .field("alignment", &self.alignment())
            .field("tracked", &self.is_tracked())
            .finish()
    }
}

impl Block {
    const fn new(memory: AlignedMemory, pool: Weak<AllocatorInner>) -> Self {
        Self {
            memory: ManuallyDrop::new(memory),
            pool,
        }
    }

    /// Returns a zero-capacity block suitably aligned for `T`.
    ///
    /// The empty block never allocates and is never pooled. It stands in for storage wherever a
    /// collection has nothing to hold.
    pub fn empty<T>() -> Self {
        // SAFETY: size 0 never overflows and `align_of` is always a power of two.
        let layout = unsafe { Layout::from_size_align_unchecked(0, std::mem::align_of::<T>()) };
        Self::new(AlignedMemory::dangling(layout), Weak::new())
    }

    /// Returns the size of the block in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.memory.size()
    }

    /// Returns the alignment of the block's base pointer.
    #[inline]
    pub fn alignment(&self) -> usize {
        self.memory.layout.align()
    }

    /// Returns a raw pointer to the start of the block.
    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.memory.ptr.as_ptr()
    }

    /// Returns `true` if the block will be returned to a pool when released.
    #[inline]
    pub fn is_tracked(&self) -> bool {
        self.pool.strong_count() > 0
    }

    /// Overwrite every byte of the block with zero.
    fn zero(&mut self) {
        if self.capacity() == 0 {
            return;
        }
        // SAFETY: the block owns `capacity` writable bytes.
        unsafe { self.as_ptr().write_bytes(0, self.capacity()) };
    }
}

impl Drop for Block {
    fn drop(&mut self) {
        // SAFETY: Drop is only called once and `memory` is not used afterwards.
        let memory = unsafe { ManuallyDrop::take(&mut self.memory) };
        if let Some(pool) = self.pool.upgrade() {
            pool.give_back(memory);
        }
        // else: memory is dropped here, which deallocates it
    }
}

/// A pool of reusable, aligned memory blocks.
///
/// Cloning a [BlockAllocator] is cheap and yields a handle to the same pool.
#[derive(Clone)]
pub struct BlockAllocator {
    inner: Arc<AllocatorInner>,
}

impl std::fmt::Debug for BlockAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockAllocator")
            .field("config", &self.inner.config)
            .field("num_classes", &self.inner.classes.len())
            .finish()
    }
}

static SHARED: OnceLock<BlockAllocator> = OnceLock::new();

impl BlockAllocator {
    /// Creates a new allocator with the given configuration, registering its metrics.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid or if prefilling fails.
    pub fn new(config: AllocatorConfig, registry: &mut Registry) -> Self {
        config.validate();
        let metrics = Metrics::new(registry);

        let mut classes = Vec::with_capacity(config.num_classes());
        for i in 0..config.num_classes() {
            let class = SizeClass::new(
                config.class_size(i),
                config.alignment.get(),
                config.max_per_class.get(),
                config.prefill,
            )
            .unwrap_or_else(|err| panic!("failed to prefill size class {i}: {err}"));
            if config.prefill {
                metrics
                    .available
                    .get_or_create(&class.label())
                    .set(class.freelist.len() as i64);
            }
            classes.push(class);
        }

        Self {
            inner: Arc::new(AllocatorInner {
                config,
                classes,
                metrics,
            }),
        }
    }

    /// Returns the process-wide allocator, creating it with [AllocatorConfig::default] on first
    /// use. Its metrics are registered into a private registry.
    pub fn shared() -> &'static BlockAllocator {
        SHARED.get_or_init(|| {
            let mut registry = Registry::default();
            Self::new(AllocatorConfig::default(), &mut registry)
        })
    }

    /// Rents a block of at least `min_size` bytes whose base pointer is aligned to `align`.
    ///
    /// A request for zero bytes yields an empty block without allocating. Requests the pool
    /// cannot serve fall back to an untracked allocation of exactly `min_size` bytes.
    ///
    /// # Errors
    ///
    /// - [Error::InvalidLayout]: `align` is not a power of two or `min_size` rounded up to
    ///   `align` overflows `isize`
    pub fn rent(&self, min_size: usize, align: usize) -> Result<Block, Error> {
        if !align.is_power_of_two() {
            return Err(Error::InvalidLayout {
                size: min_size,
                align,
            });
        }
        if min_size == 0 {
            let memory = AlignedMemory::new(0, align)?;
            return Ok(Block::new(memory, Weak::new()));
        }

        if align <= self.inner.config.alignment.get() {
            match self.inner.config.class_index(min_size) {
                Some(index) => {
                    if let Some(memory) = self.inner.take(index)? {
                        return Ok(Block::new(memory, Arc::downgrade(&self.inner)));
                    }
                    debug!(min_size, "size class exhausted, allocating untracked block");
                }
                None => {
                    self.inner.metrics.oversized_total.inc();
                    debug!(min_size, "oversized request, allocating untracked block");
                }
            }
        } else {
            debug!(min_size, align, "over-aligned request, allocating untracked block");
        }

        let memory = AlignedMemory::new(min_size, align)?;
        self.inner.metrics.untracked_total.inc();
        Ok(Block::new(memory, Weak::new()))
    }

    /// Rents a pooled block of at least `min_size` bytes, without falling back to an untracked
    /// allocation.
    ///
    /// # Errors
    ///
    /// - [Error::Oversized]: `min_size` exceeds `max_size`
    /// - [Error::Exhausted]: the size class has no free block and no free slot
    pub fn try_rent(&self, min_size: usize) -> Result<Block, Error> {
        let Some(index) = self.inner.config.class_index(min_size) else {
            self.inner.metrics.oversized_total.inc();
            return Err(Error::Oversized(min_size));
        };
        let memory = self
            .inner
            .take(index)?
            .ok_or(Error::Exhausted(self.inner.config.class_size(index)))?;
        Ok(Block::new(memory, Arc::downgrade(&self.inner)))
    }

    /// Returns a block to the pool that lent it.
    ///
    /// `clear` must be `true` when the block held values that own other resources, so that no
    /// stale bytes of them survive in the freelist.
    pub fn release(&self, mut block: Block, clear: bool) {
        if clear {
            block.zero();
        }
        drop(block);
    }

    /// Returns the allocator configuration.
    pub fn config(&self) -> &AllocatorConfig {
        &self.inner.config
    }

    /// Returns the number of blocks of `size_class` bytes currently rented out.
    pub fn allocated(&self, size_class: usize) -> usize {
        self.inner
            .config
            .class_index(size_class)
            .map(|i| self.inner.classes[i].allocated.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Returns the number of blocks of `size_class` bytes waiting in the freelist.
    pub fn available(&self, size_class: usize) -> usize {
        self.inner
            .config
            .class_index(size_class)
            .map(|i| self.inner.classes[i].reusable.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}
