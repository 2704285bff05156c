//! Compile-time kernel-argument engine.
//!
//! A kernel signature is a tuple of argument types. Each element is an
//! address-space marker ([`Global`], [`Constant`], [`Local`]) or a
//! plain-old-data type. From the tuple alone the engine derives, without any
//! runtime reflection:
//!
//! * the classification and category offsets of every argument
//!   ([`KernelSignature::ARGS`]),
//! * a cache holding the host value of every argument between launches
//!   ([`KernelArgCache`]),
//! * the parameter tuple a CPU kernel receives.
//!
//! ```ignore
//! use zivc_rs::kernel::arg::{Constant, Global, KernelSignature};
//!
//! type Saxpy = (Constant<f32>, Global<f32>, f32);
//! assert_eq!(Saxpy::NUM_OF_BUFFERS, 2);
//! assert_eq!(Saxpy::NUM_OF_PODS, 1);
//! ```

mod address_space;
mod cache;
mod info;
mod parser;
mod type_info;

pub use address_space::{Constant, ConstantPtr, Global, GlobalPtr, Local, LocalPtr, RawSlice};
pub use cache::KernelArgCache;
pub use info::{count_buffers, count_locals, count_pods, parse_args, planned_size, KernelArgInfo};
pub use parser::{ArgAt, KernelSignature};
pub use type_info::{write_pod_bytes, AddressSpace, BoundBuffer, BufferRef, KernelArg, KernelArgTypeInfo};
