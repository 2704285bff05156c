//! Position-aware argument info derived from a signature at compile time.

use super::type_info::{AddressSpace, KernelArgTypeInfo};

/// One argument of a signature: its declared position plus its position
/// among arguments of the same category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelArgInfo {
    index: usize,
    type_info: KernelArgTypeInfo,
    local_offset: usize,
    pod_offset: usize,
    buffer_offset: usize,
}

impl KernelArgInfo {
    const EMPTY: KernelArgInfo = KernelArgInfo {
        index: 0,
        type_info: KernelArgTypeInfo::new(AddressSpace::Private, 0, 1),
        local_offset: 0,
        pod_offset: 0,
        buffer_offset: 0,
    };

    pub const fn index(&self) -> usize {
        self.index
    }

    pub const fn type_info(&self) -> &KernelArgTypeInfo {
        &self.type_info
    }

    pub const fn is_global(&self) -> bool {
        self.type_info.is_global()
    }

    pub const fn is_local(&self) -> bool {
        self.type_info.is_local()
    }

    pub const fn is_constant(&self) -> bool {
        self.type_info.is_constant()
    }

    pub const fn is_pod(&self) -> bool {
        self.type_info.is_pod()
    }

    pub const fn is_buffer(&self) -> bool {
        self.type_info.is_buffer()
    }

    pub const fn is_parameter(&self) -> bool {
        self.type_info.is_parameter()
    }

    /// Position among local arguments.
    pub const fn local_offset(&self) -> usize {
        self.local_offset
    }

    /// Position among POD arguments.
    pub const fn pod_offset(&self) -> usize {
        self.pod_offset
    }

    /// Position among buffer arguments, global and constant alike.
    pub const fn buffer_offset(&self) -> usize {
        self.buffer_offset
    }
}

/// Number each argument within its category, in declaration order.
pub const fn parse_args<const N: usize>(types: [KernelArgTypeInfo; N]) -> [KernelArgInfo; N] {
    let mut out = [KernelArgInfo::EMPTY; N];
    let mut locals = 0;
    let mut pods = 0;
    let mut buffers = 0;

    let mut i = 0;
    while i < N {
        let type_info = types[i];
        out[i] = KernelArgInfo {
            index: i,
            type_info,
            local_offset: locals,
            pod_offset: pods,
            buffer_offset: buffers,
        };
        if type_info.is_local() {
            locals += 1;
        } else if type_info.is_buffer() {
            buffers += 1;
        } else {
            pods += 1;
        }
        i += 1;
    }
    out
}

pub const fn count_buffers(args: &[KernelArgInfo]) -> usize {
    let mut n = 0;
    let mut i = 0;
    while i < args.len() {
        if args[i].is_buffer() {
            n += 1;
        }
        i += 1;
    }
    n
}

pub const fn count_locals(args: &[KernelArgInfo]) -> usize {
    let mut n = 0;
    let mut i = 0;
    while i < args.len() {
        if args[i].is_local() {
            n += 1;
        }
        i += 1;
    }
    n
}

pub const fn count_pods(args: &[KernelArgInfo]) -> usize {
    let mut n = 0;
    let mut i = 0;
    while i < args.len() {
        if args[i].is_pod() {
            n += 1;
        }
        i += 1;
    }
    n
}

const fn align_up(n: usize, align: usize) -> usize {
    n.div_ceil(align) * align
}

/// Size of the packed value aggregate.
///
/// Walks the arguments in order. A value whose alignment does not exceed
/// the aggregate's and that fits in the aggregate's tail padding is nested
/// there; otherwise it is appended after the aggregate. Local arguments
/// carry no value and are skipped.
pub const fn planned_size(args: &[KernelArgInfo]) -> usize {
    let mut size = 0;
    let mut align = 1;
    let mut end = 0;

    let mut i = 0;
    while i < args.len() {
        let info = args[i].type_info();
        let value_size = info.value_size();
        if !info.is_local() && value_size > 0 {
            let value_align = info.value_align();
            let nested = align_up(end, value_align);
            if value_align <= align && nested + value_size <= size {
                end = nested + value_size;
            } else {
                end = align_up(size, value_align) + value_size;
                if value_align > align {
                    align = value_align;
                }
                size = align_up(end, align);
            }
        }
        i += 1;
    }
    size
}

#[cfg(test)]
mod tests {
    use super::*;

    const GLOBAL: KernelArgTypeInfo = KernelArgTypeInfo::new(AddressSpace::Global, 16, 8);
    const LOCAL: KernelArgTypeInfo = KernelArgTypeInfo::new(AddressSpace::Local, 0, 1);
    const CONSTANT: KernelArgTypeInfo = KernelArgTypeInfo::new(AddressSpace::Constant, 16, 8);

    const fn pod(size: usize) -> KernelArgTypeInfo {
        KernelArgTypeInfo::new(AddressSpace::Private, size, size)
    }

    #[test]
    fn test_category_offsets() {
        const ARGS: [KernelArgInfo; 6] =
            parse_args([GLOBAL, pod(4), LOCAL, CONSTANT, LOCAL, pod(8)]);

        assert_eq!(ARGS[3].index(), 3);
        assert_eq!(ARGS[3].buffer_offset(), 1);
        assert_eq!(ARGS[4].local_offset(), 1);
        assert_eq!(ARGS[5].pod_offset(), 1);
        assert_eq!(ARGS[1].pod_offset(), 0);

        assert_eq!(count_buffers(&ARGS), 2);
        assert_eq!(count_locals(&ARGS), 2);
        assert_eq!(count_pods(&ARGS), 2);
    }

    #[test]
    fn test_planned_size_nests_into_padding() {
        // u64 then u8: the u16 fits behind the u8 inside the 16-byte aggregate
        let args = parse_args([pod(8), pod(1), pod(2)]);
        assert_eq!(planned_size(&args), 16);

        // u8 then u64: nothing to reclaim
        let args = parse_args([pod(1), pod(8)]);
        assert_eq!(planned_size(&args), 16);

        let args = parse_args([pod(1), pod(1), pod(1)]);
        assert_eq!(planned_size(&args), 3);
    }

    #[test]
    fn test_planned_size_skips_locals() {
        let args = parse_args([LOCAL, pod(4), LOCAL]);
        assert_eq!(planned_size(&args), 4);
        let args = parse_args([LOCAL]);
        assert_eq!(planned_size(&args), 0);
    }

    #[test]
    fn test_planned_size_mixed() {
        let args = parse_args([GLOBAL, pod(1), GLOBAL, pod(8)]);
        assert_eq!(planned_size(&args), 48);
    }
}
