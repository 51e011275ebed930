//! Default in-memory counter reset.
//!
//! Used when an export table does not ship its own reset routine.
//!
//! Besides the counters and the bitmap, the reset clears the hit counts of the
//! value-profile nodes hanging off each `__llvm_profile_data` record. The
//! record layout differs between runtime ABIs, see [`ProfileDataLlvm17`] and
//! [`ProfileDataLlvm19`].

use std::mem::size_of;

use tracing::debug;

use super::abi::BYTE_COVERAGE_MASK;
use super::binary::{CounterRegions, SymbolRange};

/// Fill value for the counters region of a runtime with the given raw version.
///
/// Single-byte coverage encodes "not executed" as `0xFF`.
pub const fn counter_fill(version: u64) -> u8
{
    if version & BYTE_COVERAGE_MASK != 0 { 0xFF } else { 0 }
}

/// One recorded value of a value-profiling site.
#[repr(C)]
#[derive(Debug)]
pub struct ValueProfNode
{
    pub value: u64,
    pub count: u64,
    pub next: *mut ValueProfNode,
}

/// `__llvm_profile_data` record of the LLVM 17 runtime.
#[repr(C, align(8))]
#[derive(Debug, Clone, Copy)]
pub struct ProfileDataLlvm17
{
    pub name_ref: u64,
    pub func_hash: u64,
    pub counter_ptr: *const u8,
    pub function_pointer: *const u8,
    /// One list head per value site, or null when nothing was profiled.
    pub values: *const *mut ValueProfNode,
    pub num_counters: u32,
    pub num_value_sites: [u16; 2],
}

/// `__llvm_profile_data` record of the LLVM 19 runtime.
#[repr(C, align(8))]
#[derive(Debug, Clone, Copy)]
pub struct ProfileDataLlvm19
{
    pub name_ref: u64,
    pub func_hash: u64,
    pub counter_ptr: *const u8,
    pub bitmap_ptr: *const u8,
    pub function_pointer: *const u8,
    /// One list head per value site, or null when nothing was profiled.
    pub values: *const *mut ValueProfNode,
    pub num_counters: u32,
    pub num_value_sites: [u16; 3],
    pub num_bitmap_bytes: u32,
}

/// Access to the value-profile sites of a data record.
pub trait ProfileDataRecord: Copy
{
    fn values(&self) -> *const *mut ValueProfNode;

    /// Total number of value sites over all value kinds.
    fn value_sites(&self) -> usize;
}

impl ProfileDataRecord for ProfileDataLlvm17
{
    fn values(&self) -> *const *mut ValueProfNode
    {
        self.values
    }

    fn value_sites(&self) -> usize
    {
        self.num_value_sites.iter().map(|&sites| usize::from(sites)).sum()
    }
}

impl ProfileDataRecord for ProfileDataLlvm19
{
    fn values(&self) -> *const *mut ValueProfNode
    {
        self.values
    }

    fn value_sites(&self) -> usize
    {
        self.num_value_sites.iter().map(|&sites| usize::from(sites)).sum()
    }
}

/// Reset every region in `regions` to its "never executed" state.
///
/// The record layout of the data region follows the variant: `Counters`
/// holds [`ProfileDataLlvm17`] records, `CountersAndBitmap` holds
/// [`ProfileDataLlvm19`] records. The records themselves are not rewritten,
/// only the counts of their value-profile nodes.
pub fn reset_regions(version: u64, regions: &CounterRegions)
{
    let fill = counter_fill(version);
    fill_range(regions.counters(), fill);
    let nodes = match regions {
        CounterRegions::Counters { data, .. } => clear_value_profiles::<ProfileDataLlvm17>(*data),
        CounterRegions::CountersAndBitmap { data, bitmap, .. } => {
            fill_range(*bitmap, 0);
            clear_value_profiles::<ProfileDataLlvm19>(*data)
        }
    };
    debug!(
        counters = regions.counters().len(),
        bitmap = regions.bitmap().map_or(0, |bitmap| bitmap.len()),
        value_nodes = nodes,
        fill,
        "reset counter regions"
    );
}

/// Zero the count of every value-profile node reachable from `data`.
///
/// A trailing partial record is ignored. Returns the number of nodes cleared.
pub fn clear_value_profiles<R: ProfileDataRecord>(data: SymbolRange) -> usize
{
    let (begin, _) = data.bounds();
    let records = data.len() / size_of::<R>();
    let mut cleared = 0;
    for index in 0..records {
        // SAFETY: the record lies within the data region described by the
        // `SymbolRange` contract. The runtime does not guarantee alignment of
        // the section start, hence the unaligned read.
        let record = unsafe { begin.add(index * size_of::<R>()).cast::<R>().read_unaligned() };
        let values = record.values();
        if values.is_null() {
            continue;
        }
        for site in 0..record.value_sites() {
            // SAFETY: a non-null `values` points at one list head per value
            // site, and every list is null-terminated.
            let mut node = unsafe { *values.add(site) };
            while !node.is_null() {
                unsafe {
                    (*node).count = 0;
                    node = (*node).next;
                }
                cleared += 1;
            }
        }
    }
    cleared
}

fn fill_range(range: SymbolRange, value: u8)
{
    let (begin, _) = range.bounds();
    let len = range.len();
    if len == 0 {
        return;
    }
    // SAFETY: `SymbolRange::new` requires the bounds to describe one writable
    // region, and `len` is derived from those bounds.
    unsafe { std::ptr::write_bytes(begin.cast_mut(), value, len) }
}

#[cfg(test)]
mod tests
{
    use super::*;

    macro_rules! static_region {
        ($storage:ident, $begin:ident, $end:ident, $len:expr, $init:expr) => {
            static mut $storage: [u8; $len] = [$init; $len];

            unsafe extern "C" fn $begin() -> *const u8
            {
                std::ptr::addr_of!($storage).cast()
            }

            unsafe extern "C" fn $end() -> *const u8
            {
                std::ptr::addr_of!($storage).cast::<u8>().wrapping_add($len)
            }
        };
    }

    fn snapshot(range: SymbolRange) -> Vec<u8>
    {
        let (begin, _) = range.bounds();
        unsafe { std::slice::from_raw_parts(begin, range.len()).to_vec() }
    }

    #[test]
    fn test_counter_fill_follows_byte_coverage_bit()
    {
        assert_eq!(counter_fill(9), 0);
        assert_eq!(counter_fill(9 | BYTE_COVERAGE_MASK), 0xFF);
    }

    #[test]
    fn test_reset_zeroes_counters_and_bitmap()
    {
        static_region!(COUNTERS_A, counters_begin, counters_end, 32, 7);
        static_region!(DATA_A, data_begin, data_end, 8, 3);
        static_region!(BITMAP_A, bitmap_begin, bitmap_end, 4, 0xAA);

        let regions = unsafe {
            CounterRegions::CountersAndBitmap {
                counters: SymbolRange::new(counters_begin, counters_end),
                data: SymbolRange::new(data_begin, data_end),
                bitmap: SymbolRange::new(bitmap_begin, bitmap_end),
            }
        };
        reset_regions(10, &regions);

        assert_eq!(snapshot(regions.counters()), vec![0; 32]);
        assert_eq!(snapshot(regions.bitmap().unwrap()), vec![0; 4]);
        assert_eq!(snapshot(regions.data()), vec![3; 8], "data records are not rewritten");
    }

    /// Three nodes on two sites: `site0 -> [a, b]`, `site1 -> [c]`.
    fn value_sites() -> (&'static mut [ValueProfNode; 3], *const *mut ValueProfNode)
    {
        let nodes: &'static mut [ValueProfNode; 3] = Box::leak(Box::new([
            ValueProfNode { value: 0x1000, count: 5, next: std::ptr::null_mut() },
            ValueProfNode { value: 0x2000, count: 7, next: std::ptr::null_mut() },
            ValueProfNode { value: 0x3000, count: 9, next: std::ptr::null_mut() },
        ]));
        nodes[0].next = std::ptr::addr_of_mut!(nodes[1]);
        let heads: &'static [*mut ValueProfNode; 2] =
            Box::leak(Box::new([std::ptr::addr_of_mut!(nodes[0]), std::ptr::addr_of_mut!(nodes[2])]));
        (nodes, heads.as_ptr())
    }

    #[test]
    fn test_profile_data_layouts()
    {
        assert_eq!(size_of::<ProfileDataLlvm17>(), 48);
        assert_eq!(size_of::<ProfileDataLlvm19>(), 64);
    }

    #[test]
    fn test_reset_clears_value_profile_counts_llvm19()
    {
        static_region!(COUNTERS_D, counters_begin, counters_end, 8, 1);
        static_region!(BITMAP_D, bitmap_begin, bitmap_end, 2, 0xFF);
        static mut DATA_D: [ProfileDataLlvm19; 2] = [ProfileDataLlvm19 {
            name_ref: 1,
            func_hash: 2,
            counter_ptr: std::ptr::null(),
            bitmap_ptr: std::ptr::null(),
            function_pointer: std::ptr::null(),
            values: std::ptr::null(),
            num_counters: 1,
            num_value_sites: [0; 3],
            num_bitmap_bytes: 0,
        }; 2];

        unsafe extern "C" fn data_begin() -> *const u8
        {
            std::ptr::addr_of!(DATA_D).cast()
        }

        unsafe extern "C" fn data_end() -> *const u8
        {
            std::ptr::addr_of!(DATA_D).cast::<u8>().wrapping_add(size_of::<[ProfileDataLlvm19; 2]>())
        }

        let (nodes, heads) = value_sites();
        unsafe {
            // Second record profiles one indirect call site and one memop site.
            let record = &mut *std::ptr::addr_of_mut!(DATA_D[1]);
            record.values = heads;
            record.num_value_sites = [1, 1, 0];
        }

        let regions = unsafe {
            CounterRegions::CountersAndBitmap {
                counters: SymbolRange::new(counters_begin, counters_end),
                data: SymbolRange::new(data_begin, data_end),
                bitmap: SymbolRange::new(bitmap_begin, bitmap_end),
            }
        };
        reset_regions(10, &regions);

        assert!(nodes.iter().all(|node| node.count == 0));
        assert_eq!(nodes.iter().map(|node| node.value).collect::<Vec<_>>(), vec![0x1000, 0x2000, 0x3000]);
        assert_eq!(snapshot(regions.counters()), vec![0; 8]);
        assert_eq!(snapshot(regions.bitmap().unwrap()), vec![0; 2]);
        let record = unsafe { *std::ptr::addr_of!(DATA_D[1]) };
        assert_eq!(record.values, heads);
        assert_eq!(record.num_counters, 1);
    }

    #[test]
    fn test_reset_clears_value_profile_counts_llvm17()
    {
        static_region!(COUNTERS_E, counters_begin, counters_end, 8, 1);
        static mut DATA_E: [ProfileDataLlvm17; 1] = [ProfileDataLlvm17 {
            name_ref: 1,
            func_hash: 2,
            counter_ptr: std::ptr::null(),
            function_pointer: std::ptr::null(),
            values: std::ptr::null(),
            num_counters: 1,
            num_value_sites: [0; 2],
        }];

        unsafe extern "C" fn data_begin() -> *const u8
        {
            std::ptr::addr_of!(DATA_E).cast()
        }

        unsafe extern "C" fn data_end() -> *const u8
        {
            std::ptr::addr_of!(DATA_E).cast::<u8>().wrapping_add(size_of::<[ProfileDataLlvm17; 1]>())
        }

        let (nodes, heads) = value_sites();
        unsafe {
            let record = &mut *std::ptr::addr_of_mut!(DATA_E[0]);
            record.values = heads;
            record.num_value_sites = [1, 1];
        }

        let regions = unsafe {
            CounterRegions::Counters {
                counters: SymbolRange::new(counters_begin, counters_end),
                data: SymbolRange::new(data_begin, data_end),
            }
        };
        reset_regions(10, &regions);

        assert!(nodes.iter().all(|node| node.count == 0));
        assert_eq!(snapshot(regions.counters()), vec![0; 8]);
    }

    #[test]
    fn test_value_profiles_skip_records_without_sites()
    {
        static_region!(DATA_F, data_begin, data_end, 100, 0);

        // Two zeroed LLVM 17 records with null value pointers plus a partial tail.
        let data = unsafe { SymbolRange::new(data_begin, data_end) };
        assert_eq!(clear_value_profiles::<ProfileDataLlvm17>(data), 0);
        assert_eq!(snapshot(data), vec![0; 100]);
    }

    #[test]
    fn test_reset_fills_byte_counters_with_ff()
    {
        static_region!(COUNTERS_B, counters_begin, counters_end, 16, 0);
        static_region!(DATA_B, data_begin, data_end, 8, 0);

        let regions = unsafe {
            CounterRegions::Counters {
                counters: SymbolRange::new(counters_begin, counters_end),
                data: SymbolRange::new(data_begin, data_end),
            }
        };
        reset_regions(10 | BYTE_COVERAGE_MASK, &regions);

        assert_eq!(snapshot(regions.counters()), vec![0xFF; 16]);
    }

    #[test]
    fn test_reset_empty_region_is_noop()
    {
        static_region!(EMPTY_C, empty_begin, empty_end, 0, 0);
        static_region!(DATA_C, data_begin, data_end, 1, 0);

        let regions = unsafe {
            CounterRegions::Counters {
                counters: SymbolRange::new(empty_begin, empty_end),
                data: SymbolRange::new(data_begin, data_end),
            }
        };
        assert!(regions.counters().is_empty());
        reset_regions(0, &regions);
    }
}
