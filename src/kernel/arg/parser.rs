//! Signatures: tuples of [`KernelArg`] types, parsed at compile time.

use super::address_space::RawSlice;
use super::info::{count_buffers, count_locals, count_pods, parse_args, KernelArgInfo};
use super::type_info::{BoundBuffer, KernelArg};

/// The ordered parameter list of a kernel.
///
/// Implemented for tuples of one to twelve [`KernelArg`] types, e.g.
/// `(Constant<f32>, Global<f32>, f32)`. Everything is resolved per
/// signature at compile time.
pub trait KernelSignature: 'static {
    const ARGS: &'static [KernelArgInfo];
    const NUM_OF_ARGS: usize = Self::ARGS.len();
    const NUM_OF_BUFFERS: usize = count_buffers(Self::ARGS);
    const NUM_OF_LOCALS: usize = count_locals(Self::ARGS);
    const NUM_OF_PODS: usize = count_pods(Self::ARGS);
    const NUM_OF_PARAMETERS: usize = Self::NUM_OF_BUFFERS + Self::NUM_OF_PODS;

    type Values: Clone + PartialEq + 'static;
    /// Launch inputs: `&Buffer<T>` for buffers, the value for PODs and `()`
    /// for local memory.
    type Inputs<'a>;
    type Params<'a>: Copy;
    #[doc(hidden)]
    type Prepared: Copy + Send + Sync + 'static;
    #[doc(hidden)]
    type Scratch: 'static;

    fn empty_values() -> Self::Values;

    fn store(inputs: Self::Inputs<'_>) -> Self::Values;

    fn arg_info(index: usize) -> Option<&'static KernelArgInfo> {
        Self::ARGS.get(index)
    }

    /// Buffers in declaration order.
    #[doc(hidden)]
    fn bound_buffers(values: &Self::Values) -> Vec<BoundBuffer>;

    #[doc(hidden)]
    fn prepare(values: &Self::Values, slices: &[RawSlice]) -> Self::Prepared;

    #[doc(hidden)]
    fn new_scratch() -> Self::Scratch;

    #[doc(hidden)]
    fn reset_scratch(scratch: &Self::Scratch);

    /// # Safety
    /// See [`KernelArg::param`].
    #[doc(hidden)]
    unsafe fn params<'a>(prepared: Self::Prepared, scratch: &'a Self::Scratch) -> Self::Params<'a>;

    #[doc(hidden)]
    fn write_pods(values: &Self::Values, out: &mut Vec<u8>);
}

/// Compile-time access to argument `K` of a signature. Indices past the end
/// have no impl.
pub trait ArgAt<const K: usize>: KernelSignature {
    type Arg: KernelArg;

    fn get(values: &Self::Values) -> &<Self::Arg as KernelArg>::Value;

    fn get_mut(values: &mut Self::Values) -> &mut <Self::Arg as KernelArg>::Value;
}

macro_rules! impl_arg_at {
    ($all:tt; $($A:ident $i:tt),+) => {
        $( impl_arg_at!(@one $all; $A $i); )+
    };
    (@one ($($T:ident),+); $A:ident $i:tt) => {
        impl<$($T: KernelArg),+> ArgAt<$i> for ($($T,)+) {
            type Arg = $A;

            fn get(values: &Self::Values) -> &<$A as KernelArg>::Value {
                &values.$i
            }

            fn get_mut(values: &mut Self::Values) -> &mut <$A as KernelArg>::Value {
                &mut values.$i
            }
        }
    };
}

macro_rules! impl_kernel_signature {
    ($($A:ident $i:tt),+) => {
        impl<$($A: KernelArg),+> KernelSignature for ($($A,)+) {
            const ARGS: &'static [KernelArgInfo] =
                &parse_args([$(<$A as KernelArg>::TYPE_INFO),+]);

            type Values = ($(<$A as KernelArg>::Value,)+);
            type Inputs<'a> = ($(<$A as KernelArg>::Input<'a>,)+);
            type Params<'a> = ($(<$A as KernelArg>::Param<'a>,)+);
            type Prepared = ($(<$A as KernelArg>::Prepared,)+);
            type Scratch = ($(<$A as KernelArg>::Scratch,)+);

            fn empty_values() -> Self::Values {
                ($(<$A as KernelArg>::empty_value(),)+)
            }

            fn store(inputs: Self::Inputs<'_>) -> Self::Values {
                ($(<$A as KernelArg>::store(inputs.$i),)+)
            }

            fn bound_buffers(values: &Self::Values) -> Vec<BoundBuffer> {
                let mut list = Vec::with_capacity(Self::NUM_OF_BUFFERS);
                $(
                    if let Some(bound) = <$A as KernelArg>::bound_buffer(&values.$i) {
                        list.push(bound);
                    }
                )+
                list
            }

            fn prepare(values: &Self::Values, slices: &[RawSlice]) -> Self::Prepared {
                ($(<$A as KernelArg>::prepare(&values.$i, slices, Self::ARGS[$i].buffer_offset()),)+)
            }

            fn new_scratch() -> Self::Scratch {
                ($(<$A as KernelArg>::new_scratch(),)+)
            }

            fn reset_scratch(scratch: &Self::Scratch) {
                $( <$A as KernelArg>::reset_scratch(&scratch.$i); )+
            }

            unsafe fn params<'a>(prepared: Self::Prepared, scratch: &'a Self::Scratch) -> Self::Params<'a> {
                ($(<$A as KernelArg>::param(prepared.$i, &scratch.$i),)+)
            }

            fn write_pods(values: &Self::Values, out: &mut Vec<u8>) {
                $( <$A as KernelArg>::write_pod(&values.$i, out); )+
            }
        }

        impl_arg_at!(($($A),+); $($A $i),+);
    };
}

impl_kernel_signature!(A0 0);
impl_kernel_signature!(A0 0, A1 1);
impl_kernel_signature!(A0 0, A1 1, A2 2);
impl_kernel_signature!(A0 0, A1 1, A2 2, A3 3);
impl_kernel_signature!(A0 0, A1 1, A2 2, A3 3, A4 4);
impl_kernel_signature!(A0 0, A1 1, A2 2, A3 3, A4 4, A5 5);
impl_kernel_signature!(A0 0, A1 1, A2 2, A3 3, A4 4, A5 5, A6 6);
impl_kernel_signature!(A0 0, A1 1, A2 2, A3 3, A4 4, A5 5, A6 6, A7 7);
impl_kernel_signature!(A0 0, A1 1, A2 2, A3 3, A4 4, A5 5, A6 6, A7 7, A8 8);
impl_kernel_signature!(A0 0, A1 1, A2 2, A3 3, A4 4, A5 5, A6 6, A7 7, A8 8, A9 9);
impl_kernel_signature!(A0 0, A1 1, A2 2, A3 3, A4 4, A5 5, A6 6, A7 7, A8 8, A9 9, A10 10);
impl_kernel_signature!(A0 0, A1 1, A2 2, A3 3, A4 4, A5 5, A6 6, A7 7, A8 8, A9 9, A10 10, A11 11);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::arg::{Constant, Global, Local};

    type Saxpy = (Constant<f32>, Global<f32>, f32);
    type Mixed = (Global<i32>, Local<f32, 64>, u8, Constant<u16>, Local<u32, 8>, u64);

    #[test]
    fn test_counts() {
        assert_eq!(Saxpy::NUM_OF_ARGS, 3);
        assert_eq!(Saxpy::NUM_OF_BUFFERS, 2);
        assert_eq!(Saxpy::NUM_OF_PODS, 1);
        assert_eq!(Saxpy::NUM_OF_LOCALS, 0);
        assert_eq!(Saxpy::NUM_OF_PARAMETERS, 3);

        assert_eq!(Mixed::NUM_OF_ARGS, 6);
        assert_eq!(Mixed::NUM_OF_BUFFERS, 2);
        assert_eq!(Mixed::NUM_OF_LOCALS, 2);
        assert_eq!(Mixed::NUM_OF_PODS, 2);
        assert_eq!(Mixed::NUM_OF_PARAMETERS, 4);
    }

    #[test]
    fn test_arg_info() {
        let info = Mixed::arg_info(4).unwrap();
        assert!(info.is_local());
        assert_eq!(info.local_offset(), 1);

        let info = Mixed::arg_info(3).unwrap();
        assert!(info.is_constant());
        assert_eq!(info.buffer_offset(), 1);

        let info = Mixed::arg_info(5).unwrap();
        assert_eq!(info.pod_offset(), 1);

        assert!(Mixed::arg_info(6).is_none());
    }

    #[test]
    fn test_arg_at_resolves_types() {
        fn arg_type<S: ArgAt<K>, const K: usize>() -> &'static str {
            std::any::type_name::<<S as ArgAt<K>>::Arg>()
        }
        assert_eq!(arg_type::<Saxpy, 2>(), "f32");
        assert!(arg_type::<Mixed, 1>().contains("Local"));
    }

    #[test]
    fn test_write_pods_skips_buffers() {
        let mut values = <(Global<f32>, u8, u32)>::empty_values();
        values.1 = 7;
        values.2 = 0x0102_0304;
        let mut out = Vec::new();
        <(Global<f32>, u8, u32)>::write_pods(&values, &mut out);
        assert_eq!(out.len(), 8);
        assert_eq!(out[0], 7);
        assert_eq!(&out[4..], &0x0102_0304u32.to_ne_bytes());
    }
}
