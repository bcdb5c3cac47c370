//! Correlation id allocation.
//!
//! Every packed request takes its `sync` from a [`SyncAllocator`]. The
//! process-wide allocator returned by [`SyncAllocator::global`] is shared by
//! all connections; tests and embedders can pass their own instance to
//! [`Packer::with_allocator`](super::Packer::with_allocator) for
//! deterministic ids.

use std::sync::atomic::{AtomicU32, Ordering};

static GLOBAL: SyncAllocator = SyncAllocator::new(1);

/// Monotonically increasing `sync` id source.
///
/// Ids are unique until the 32-bit counter wraps around.
#[derive(Debug)]
pub struct SyncAllocator {
    next: AtomicU32,
}

impl SyncAllocator {
    /// Create an allocator whose first id is `start`.
    pub const fn new(start: u32) -> Self {
        Self {
            next: AtomicU32::new(start),
        }
    }

    /// The process-wide allocator, starting at 1.
    pub fn global() -> &'static SyncAllocator {
        &GLOBAL
    }

    /// Take the next id.
    #[inline]
    pub fn allocate(&self) -> u32 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// The id the next call to [`allocate`](Self::allocate) will return.
    #[inline]
    pub fn peek(&self) -> u32 {
        self.next.load(Ordering::Relaxed)
    }
}

impl Default for SyncAllocator {
    fn default() -> Self {
        Self::new(1)
    }
}
