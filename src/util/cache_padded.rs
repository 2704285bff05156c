//! Cache line padding to prevent false sharing.

use std::fmt;
use std::ops::Deref;

/// Size of a cache line on most modern CPUs
pub const CACHE_LINE_SIZE: usize = 64;

/// A value padded to the size of a cache line.
///
/// Used for counters hammered by every worker, such as the batch claim
/// counter of a CPU kernel dispatch.
#[repr(align(64))]
#[derive(Default)]
pub struct CachePadded<T> {
    value: T,
}

impl<T> CachePadded<T> {
    pub const fn new(value: T) -> Self {
        Self { value }
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T> Deref for CachePadded<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: fmt::Debug> fmt::Debug for CachePadded<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CachePadded").field(&self.value).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{align_of, size_of};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_cache_padded_alignment() {
        assert_eq!(align_of::<CachePadded<AtomicUsize>>(), CACHE_LINE_SIZE);
        assert!(size_of::<CachePadded<AtomicUsize>>() >= CACHE_LINE_SIZE);
    }

    #[test]
    fn test_cache_padded_deref() {
        let padded = CachePadded::new(AtomicUsize::new(3));
        padded.fetch_add(1, Ordering::Relaxed);
        assert_eq!(padded.into_inner().into_inner(), 4);
    }
}
