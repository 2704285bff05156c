//! Address-space markers for kernel signatures and the pointers a CPU kernel
//! receives for them.

use bytemuck::Pod;
use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;

/// Read-write buffer argument.
#[derive(Debug)]
pub struct Global<T>(PhantomData<fn() -> T>);

/// Read-only buffer argument.
#[derive(Debug)]
pub struct Constant<T>(PhantomData<fn() -> T>);

/// Work-group memory of `N` elements, allocated by the device per group.
#[derive(Debug)]
pub struct Local<T, const N: usize>(PhantomData<fn() -> T>);

/// Base pointer and byte length of a locked buffer.
#[doc(hidden)]
#[derive(Debug, Clone, Copy)]
pub struct RawSlice {
    pub(crate) ptr: *mut u8,
    pub(crate) len: usize,
}

// Only built while the storage is read-locked for the whole dispatch.
unsafe impl Send for RawSlice {}
unsafe impl Sync for RawSlice {}

impl RawSlice {
    pub(crate) const EMPTY: RawSlice = RawSlice {
        ptr: std::ptr::null_mut(),
        len: 0,
    };

    fn elements<T>(self) -> usize {
        self.len / std::mem::size_of::<T>()
    }
}

/// Buffer shared by every work item of a launch.
///
/// Items may write any element, so access is unsafe: the kernel must make
/// sure no two items touch the same element while one of them writes.
pub struct GlobalPtr<'a, T> {
    ptr: *mut T,
    len: usize,
    _marker: PhantomData<&'a [Cell<T>]>,
}

unsafe impl<T: Send + Sync> Send for GlobalPtr<'_, T> {}
unsafe impl<T: Send + Sync> Sync for GlobalPtr<'_, T> {}

impl<T> Clone for GlobalPtr<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for GlobalPtr<'_, T> {}

impl<'a, T: Pod> GlobalPtr<'a, T> {
    pub(crate) fn from_raw(raw: RawSlice) -> Self {
        Self {
            ptr: raw.ptr.cast(),
            len: raw.elements::<T>(),
            _marker: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// # Safety
    /// No other item may write element `index` concurrently.
    ///
    /// # Panics
    /// If `index` is out of bounds.
    pub unsafe fn unsafe_index(&self, index: usize) -> &'a T {
        assert!(index < self.len, "index {} out of bounds {}", index, self.len);
        &*self.ptr.add(index)
    }

    /// # Safety
    /// No other item may access element `index` concurrently.
    ///
    /// # Panics
    /// If `index` is out of bounds.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn unsafe_index_mut(&self, index: usize) -> &'a mut T {
        assert!(index < self.len, "index {} out of bounds {}", index, self.len);
        &mut *self.ptr.add(index)
    }
}

impl<T> fmt::Debug for GlobalPtr<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalPtr").field("len", &self.len).finish()
    }
}

/// Read-only view of a constant buffer.
pub struct ConstantPtr<'a, T> {
    slice: &'a [T],
}

impl<T> Clone for ConstantPtr<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ConstantPtr<'_, T> {}

impl<'a, T: Pod> ConstantPtr<'a, T> {
    /// The storage must stay read-locked, and must not be bound as a global
    /// argument of the same launch, for `'a`.
    pub(crate) unsafe fn from_raw(raw: RawSlice) -> Self {
        let slice = if raw.ptr.is_null() {
            &[]
        } else {
            std::slice::from_raw_parts(raw.ptr.cast::<T>(), raw.elements::<T>())
        };
        Self { slice }
    }
}

impl<T> Deref for ConstantPtr<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.slice
    }
}

impl<T> fmt::Debug for ConstantPtr<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstantPtr")
            .field("len", &self.slice.len())
            .finish()
    }
}

/// Work-group memory. Zeroed at the start of every group.
pub struct LocalPtr<'a, T> {
    cells: &'a [Cell<T>],
}

impl<T> Clone for LocalPtr<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for LocalPtr<'_, T> {}

impl<'a, T: Pod> LocalPtr<'a, T> {
    pub(crate) fn new(cells: &'a [Cell<T>]) -> Self {
        Self { cells }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn get(&self, index: usize) -> T {
        self.cells[index].get()
    }

    pub fn set(&self, index: usize, value: T) {
        self.cells[index].set(value);
    }
}

impl<T> fmt::Debug for LocalPtr<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalPtr")
            .field("len", &self.cells.len())
            .finish()
    }
}
