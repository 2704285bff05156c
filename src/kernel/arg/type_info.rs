//! Per-type classification of kernel arguments.

use super::address_space::{Constant, ConstantPtr, Global, GlobalPtr, Local, LocalPtr, RawSlice};
use crate::buffer::storage::SharedStorage;
use crate::buffer::Buffer;
use bytemuck::{Pod, Zeroable};
use std::cell::Cell;
use std::fmt;
use std::mem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressSpace {
    Global,
    Local,
    Constant,
    /// Plain-old-data passed by value.
    Private,
}

/// Classification of one argument type plus the layout of its cached value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelArgTypeInfo {
    address_space: AddressSpace,
    value_size: usize,
    value_align: usize,
}

impl KernelArgTypeInfo {
    pub const fn new(address_space: AddressSpace, value_size: usize, value_align: usize) -> Self {
        Self {
            address_space,
            value_size,
            value_align,
        }
    }

    /// Info for an argument whose cached value is a `V`.
    pub const fn of<V>(address_space: AddressSpace) -> Self {
        Self::new(address_space, mem::size_of::<V>(), mem::align_of::<V>())
    }

    pub const fn address_space(&self) -> AddressSpace {
        self.address_space
    }

    pub const fn is_global(&self) -> bool {
        matches!(self.address_space, AddressSpace::Global)
    }

    pub const fn is_local(&self) -> bool {
        matches!(self.address_space, AddressSpace::Local)
    }

    pub const fn is_constant(&self) -> bool {
        matches!(self.address_space, AddressSpace::Constant)
    }

    pub const fn is_pod(&self) -> bool {
        matches!(self.address_space, AddressSpace::Private)
    }

    pub const fn is_buffer(&self) -> bool {
        self.is_global() || self.is_constant()
    }

    /// Supplied by the host at launch. Local memory is not.
    pub const fn is_parameter(&self) -> bool {
        self.is_buffer() || self.is_pod()
    }

    pub const fn value_size(&self) -> usize {
        self.value_size
    }

    pub const fn value_align(&self) -> usize {
        self.value_align
    }
}

/// Buffer bound to a launch.
#[doc(hidden)]
pub struct BoundBuffer {
    pub(crate) storage: SharedStorage,
    pub(crate) read_only: bool,
    pub(crate) mapped: bool,
    pub(crate) id: i64,
}

impl fmt::Debug for BoundBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundBuffer")
            .field("id", &self.id)
            .field("read_only", &self.read_only)
            .field("mapped", &self.mapped)
            .finish()
    }
}

/// Cached value of a buffer argument.
///
/// Two values are equal when they name the same allocation at the same
/// generation, so a resize between launches counts as a change.
pub struct BufferRef<T: Pod> {
    buffer: Option<Buffer<T>>,
    generation: u64,
}

impl<T: Pod> BufferRef<T> {
    pub fn new(buffer: &Buffer<T>) -> Self {
        Self {
            buffer: Some(buffer.clone()),
            generation: buffer.generation(),
        }
    }

    pub fn buffer(&self) -> Option<&Buffer<T>> {
        self.buffer.as_ref()
    }

    fn bind(&self, read_only: bool) -> Option<BoundBuffer> {
        self.buffer.as_ref().map(|buffer| BoundBuffer {
            storage: buffer.shared_storage().clone(),
            read_only,
            mapped: buffer.is_mapped(),
            id: buffer.id().id(),
        })
    }
}

impl<T: Pod> Default for BufferRef<T> {
    fn default() -> Self {
        Self {
            buffer: None,
            generation: 0,
        }
    }
}

impl<T: Pod> Clone for BufferRef<T> {
    fn clone(&self) -> Self {
        Self {
            buffer: self.buffer.clone(),
            generation: self.generation,
        }
    }
}

impl<T: Pod> PartialEq for BufferRef<T> {
    fn eq(&self, other: &Self) -> bool {
        let same = match (&self.buffer, &other.buffer) {
            (Some(a), Some(b)) => a.ptr_eq(b),
            (None, None) => true,
            _ => false,
        };
        same && self.generation == other.generation
    }
}

impl<T: Pod> fmt::Debug for BufferRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferRef")
            .field("buffer", &self.buffer.as_ref().map(|b| b.id().id()))
            .field("generation", &self.generation)
            .finish()
    }
}

/// A type usable as one kernel parameter.
///
/// Implemented for the address-space markers and, through
/// [`pod_kernel_arg!`](crate::pod_kernel_arg), for plain-old-data types.
/// Methods marked hidden are launch plumbing.
pub trait KernelArg: 'static {
    const TYPE_INFO: KernelArgTypeInfo;

    /// Host-side value kept in the argument cache.
    type Value: Clone + PartialEq + 'static;
    /// What the caller passes at launch.
    type Input<'a>;
    /// What a CPU kernel receives.
    type Param<'a>: Copy;
    #[doc(hidden)]
    type Prepared: Copy + Send + Sync + 'static;
    #[doc(hidden)]
    type Scratch: 'static;

    fn empty_value() -> Self::Value;

    fn store(input: Self::Input<'_>) -> Self::Value;

    #[doc(hidden)]
    fn bound_buffer(_value: &Self::Value) -> Option<BoundBuffer> {
        None
    }

    #[doc(hidden)]
    fn prepare(value: &Self::Value, slices: &[RawSlice], buffer_offset: usize) -> Self::Prepared;

    #[doc(hidden)]
    fn new_scratch() -> Self::Scratch;

    #[doc(hidden)]
    fn reset_scratch(_scratch: &Self::Scratch) {}

    /// # Safety
    /// `prepared` must come from storages that stay read-locked while the
    /// returned parameter lives.
    #[doc(hidden)]
    unsafe fn param<'a>(prepared: Self::Prepared, scratch: &'a Self::Scratch) -> Self::Param<'a>;

    #[doc(hidden)]
    fn write_pod(_value: &Self::Value, _out: &mut Vec<u8>) {}
}

impl<T: Pod> KernelArg for Global<T> {
    const TYPE_INFO: KernelArgTypeInfo = KernelArgTypeInfo::of::<BufferRef<T>>(AddressSpace::Global);

    type Value = BufferRef<T>;
    type Input<'a> = &'a Buffer<T>;
    type Param<'a> = GlobalPtr<'a, T>;
    type Prepared = RawSlice;
    type Scratch = ();

    fn empty_value() -> BufferRef<T> {
        BufferRef::default()
    }

    fn store(input: &Buffer<T>) -> BufferRef<T> {
        BufferRef::new(input)
    }

    fn bound_buffer(value: &BufferRef<T>) -> Option<BoundBuffer> {
        value.bind(false)
    }

    fn prepare(_value: &BufferRef<T>, slices: &[RawSlice], buffer_offset: usize) -> RawSlice {
        slices.get(buffer_offset).copied().unwrap_or(RawSlice::EMPTY)
    }

    fn new_scratch() {}

    unsafe fn param<'a>(prepared: RawSlice, _scratch: &'a ()) -> GlobalPtr<'a, T> {
        GlobalPtr::from_raw(prepared)
    }
}

impl<T: Pod> KernelArg for Constant<T> {
    const TYPE_INFO: KernelArgTypeInfo = KernelArgTypeInfo::of::<BufferRef<T>>(AddressSpace::Constant);

    type Value = BufferRef<T>;
    type Input<'a> = &'a Buffer<T>;
    type Param<'a> = ConstantPtr<'a, T>;
    type Prepared = RawSlice;
    type Scratch = ();

    fn empty_value() -> BufferRef<T> {
        BufferRef::default()
    }

    fn store(input: &Buffer<T>) -> BufferRef<T> {
        BufferRef::new(input)
    }

    fn bound_buffer(value: &BufferRef<T>) -> Option<BoundBuffer> {
        value.bind(true)
    }

    fn prepare(_value: &BufferRef<T>, slices: &[RawSlice], buffer_offset: usize) -> RawSlice {
        slices.get(buffer_offset).copied().unwrap_or(RawSlice::EMPTY)
    }

    fn new_scratch() {}

    unsafe fn param<'a>(prepared: RawSlice, _scratch: &'a ()) -> ConstantPtr<'a, T> {
        ConstantPtr::from_raw(prepared)
    }
}

impl<T: Pod, const N: usize> KernelArg for Local<T, N> {
    const TYPE_INFO: KernelArgTypeInfo = KernelArgTypeInfo::of::<()>(AddressSpace::Local);

    type Value = ();
    type Input<'a> = ();
    type Param<'a> = LocalPtr<'a, T>;
    type Prepared = ();
    type Scratch = Box<[Cell<T>]>;

    fn empty_value() {}

    fn store(_input: ()) {}

    fn prepare(_value: &(), _slices: &[RawSlice], _buffer_offset: usize) {}

    fn new_scratch() -> Box<[Cell<T>]> {
        (0..N).map(|_| Cell::new(T::zeroed())).collect()
    }

    fn reset_scratch(scratch: &Box<[Cell<T>]>) {
        for cell in scratch.iter() {
            cell.set(T::zeroed());
        }
    }

    unsafe fn param<'a>(_prepared: (), scratch: &'a Box<[Cell<T>]>) -> LocalPtr<'a, T> {
        LocalPtr::new(scratch)
    }
}

/// Append `bytes` to a POD block, aligned to at least four bytes.
#[doc(hidden)]
pub fn write_pod_bytes(out: &mut Vec<u8>, bytes: &[u8], align: usize) {
    let align = align.max(4);
    let start = out.len().div_ceil(align) * align;
    out.resize(start, 0);
    out.extend_from_slice(bytes);
}

/// Implement [`KernelArg`] for plain-old-data types passed by value.
///
/// The type must be `bytemuck::Pod + PartialEq + Send + Sync`; anything else
/// fails to compile.
///
/// ```ignore
/// #[derive(Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
/// #[repr(C)]
/// struct Params { scale: f32, bias: f32 }
///
/// zivc_rs::pod_kernel_arg!(Params);
/// ```
#[macro_export]
macro_rules! pod_kernel_arg {
    ($($t:ty),+ $(,)?) => {$(
        const _: () = {
            const fn assert_pod<
                T: $crate::__private::bytemuck::Pod + ::core::cmp::PartialEq + ::core::marker::Send + ::core::marker::Sync,
            >() {
            }
            assert_pod::<$t>();
        };

        impl $crate::kernel::arg::KernelArg for $t {
            const TYPE_INFO: $crate::kernel::arg::KernelArgTypeInfo =
                $crate::kernel::arg::KernelArgTypeInfo::of::<$t>($crate::kernel::arg::AddressSpace::Private);

            type Value = $t;
            type Input<'a> = $t;
            type Param<'a> = $t;
            type Prepared = $t;
            type Scratch = ();

            fn empty_value() -> $t {
                $crate::__private::bytemuck::Zeroable::zeroed()
            }

            fn store(input: $t) -> $t {
                input
            }

            fn prepare(value: &$t, _slices: &[$crate::kernel::arg::RawSlice], _buffer_offset: usize) -> $t {
                *value
            }

            fn new_scratch() {}

            unsafe fn param<'a>(prepared: $t, _scratch: &'a ()) -> $t {
                prepared
            }

            fn write_pod(value: &$t, out: &mut ::std::vec::Vec<u8>) {
                $crate::kernel::arg::write_pod_bytes(
                    out,
                    $crate::__private::bytemuck::bytes_of(value),
                    ::core::mem::align_of::<$t>(),
                );
            }
        }
    )+};
}

pod_kernel_arg!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64);
pod_kernel_arg!([u32; 2], [u32; 4], [i32; 2], [i32; 4], [f32; 2], [f32; 4]);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(<Global<f32> as KernelArg>::TYPE_INFO.is_global());
        assert!(<Global<f32> as KernelArg>::TYPE_INFO.is_buffer());
        assert!(<Constant<u8> as KernelArg>::TYPE_INFO.is_constant());
        assert!(<Constant<u8> as KernelArg>::TYPE_INFO.is_parameter());

        let local = <Local<f32, 16> as KernelArg>::TYPE_INFO;
        assert!(local.is_local());
        assert!(!local.is_parameter());
        assert_eq!(local.value_size(), 0);

        let pod = <u64 as KernelArg>::TYPE_INFO;
        assert!(pod.is_pod());
        assert!(!pod.is_buffer());
        assert_eq!(pod.value_size(), 8);
        assert_eq!(pod.value_align(), mem::align_of::<u64>());
    }

    #[test]
    fn test_write_pod_bytes_aligns_to_four() {
        let mut out = Vec::new();
        write_pod_bytes(&mut out, &[1], 1);
        write_pod_bytes(&mut out, &[2, 0], 2);
        write_pod_bytes(&mut out, &[3; 8], 8);
        assert_eq!(out.len(), 16);
        assert_eq!(out[0], 1);
        assert_eq!(out[4], 2);
        assert_eq!(&out[8..], &[3; 8]);
    }

    #[test]
    fn test_local_scratch_is_reset() {
        let scratch = <Local<u32, 4> as KernelArg>::new_scratch();
        assert_eq!(scratch.len(), 4);
        scratch[2].set(9);
        <Local<u32, 4> as KernelArg>::reset_scratch(&scratch);
        assert!(scratch.iter().all(|c| c.get() == 0));
    }
}
