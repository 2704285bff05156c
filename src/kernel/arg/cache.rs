//! Values of a kernel's arguments, kept between launches.

use super::info::planned_size;
use super::parser::{ArgAt, KernelSignature};
use super::type_info::KernelArg;
use std::fmt;
use std::mem;

type ValueAt<S, const K: usize> = <<S as ArgAt<K>>::Arg as KernelArg>::Value;

/// Packed store of one value per argument of `S`.
///
/// Indexing is checked at compile time: `get::<K>()` only exists when `S`
/// has an argument `K`. Local arguments occupy a zero-sized slot.
pub struct KernelArgCache<S: KernelSignature> {
    values: S::Values,
}

impl<S: KernelSignature> KernelArgCache<S> {
    /// Bytes the nest-or-append layout plan needs for `S`.
    pub const PLANNED_SIZE: usize = planned_size(S::ARGS);

    const SIZE_CHECK: () = assert!(
        mem::size_of::<S::Values>() <= Self::PLANNED_SIZE,
        "argument cache is larger than its layout plan"
    );

    pub fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::SIZE_CHECK;
        Self {
            values: S::empty_values(),
        }
    }

    pub fn size_in_bytes() -> usize {
        mem::size_of::<S::Values>()
    }

    pub fn get<const K: usize>(&self) -> &ValueAt<S, K>
    where
        S: ArgAt<K>,
    {
        <S as ArgAt<K>>::get(&self.values)
    }

    pub fn set<const K: usize>(&mut self, value: ValueAt<S, K>)
    where
        S: ArgAt<K>,
    {
        *<S as ArgAt<K>>::get_mut(&mut self.values) = value;
    }

    pub fn values(&self) -> &S::Values {
        &self.values
    }

    /// Replace every value; returns whether anything changed.
    pub fn update(&mut self, values: S::Values) -> bool {
        if self.values == values {
            return false;
        }
        self.values = values;
        true
    }
}

impl<S: KernelSignature> Default for KernelArgCache<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: KernelSignature> Clone for KernelArgCache<S> {
    fn clone(&self) -> Self {
        Self {
            values: self.values.clone(),
        }
    }
}

impl<S: KernelSignature> PartialEq for KernelArgCache<S> {
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values
    }
}

impl<S: KernelSignature> fmt::Debug for KernelArgCache<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelArgCache")
            .field("args", &S::NUM_OF_ARGS)
            .field("size", &Self::size_in_bytes())
            .field("planned_size", &Self::PLANNED_SIZE)
            .finish()
    }
}
