//! # Instrumented Binaries
//!
//! A resolved handle per loaded image that carries the profile runtime.
//!
//! Every image compiled with coverage instrumentation embeds its own copy of
//! the profile runtime: its own counters, its own output-file state and its
//! own write routine. An [`InstrumentedBinary`] holds the entry points of one
//! such copy so the session can flush, redirect and reset it.
//!
//! ## Pointer ranges
//!
//! The counters, data and bitmap regions are exposed by the runtime through
//! accessor functions (`__llvm_profile_begin_counters` and friends). A
//! [`SymbolRange`] stores the pair of accessors. It is a non-owning view into
//! the image's static memory and stays valid as long as the image is loaded.

use std::ffi::{c_int, c_uint};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::abi::RuntimeAbi;
use crate::decoder::CoverageExports;
use crate::error::{CoverageError, Result};

/// `__llvm_profile_initialize`: re-read the profile path and reopen the output file.
pub type InitializeFn = unsafe extern "C" fn();
/// `__llvm_profile_write_file`: serialize counters, returns 0 on success.
pub type WriteFileFn = unsafe extern "C" fn() -> c_int;
/// `__llvm_profile_set_page_size`: a page size of 0 turns continuous mode off.
pub type SetPageSizeFn = unsafe extern "C" fn(c_uint);
/// `__llvm_profile_get_version`: raw profile version including variant bits.
pub type GetVersionFn = unsafe extern "C" fn() -> u64;
/// `__llvm_profile_{begin,end}_*`: bound of one runtime region.
pub type RegionBoundFn = unsafe extern "C" fn() -> *const u8;

/// Begin/end accessor pair of one runtime memory region.
#[derive(Debug, Clone, Copy)]
pub struct SymbolRange
{
    begin: RegionBoundFn,
    end: RegionBoundFn,
}

impl SymbolRange
{
    /// Create a range from its accessor functions.
    ///
    /// # Safety
    ///
    /// Both functions must be callable without arguments for as long as the
    /// range is used and must return bounds of one writable region with
    /// `begin <= end`.
    pub const unsafe fn new(begin: RegionBoundFn, end: RegionBoundFn) -> Self
    {
        SymbolRange { begin, end }
    }

    /// Current `(begin, end)` pointers of the region.
    pub fn bounds(&self) -> (*const u8, *const u8)
    {
        // SAFETY: guaranteed by the contract of `SymbolRange::new`.
        unsafe { ((self.begin)(), (self.end)()) }
    }

    /// Size of the region in bytes (0 for inverted bounds).
    pub fn len(&self) -> usize
    {
        let (begin, end) = self.bounds();
        (end as usize).saturating_sub(begin as usize)
    }

    pub fn is_empty(&self) -> bool
    {
        self.len() == 0
    }

    pub(crate) fn accessors(&self) -> (RegionBoundFn, RegionBoundFn)
    {
        (self.begin, self.end)
    }
}

/// Profile runtime entry points of one image.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeEntryPoints
{
    pub initialize: InitializeFn,
    pub write_file: WriteFileFn,
    pub set_page_size: SetPageSizeFn,
    /// Only exported by newer runtimes
    pub get_version: Option<GetVersionFn>,
}

/// Counter regions of a binary as required by one runtime ABI
///
/// Each variant carries exactly the ranges its ABI resets. Building the
/// variant fails when the binary cannot provide them.
#[derive(Debug, Clone, Copy)]
pub enum CounterRegions
{
    Counters
    {
        counters: SymbolRange,
        data: SymbolRange,
    },
    CountersAndBitmap
    {
        counters: SymbolRange,
        data: SymbolRange,
        bitmap: SymbolRange,
    },
}

impl CounterRegions
{
    pub fn counters(&self) -> SymbolRange
    {
        match self {
            CounterRegions::Counters { counters, .. } | CounterRegions::CountersAndBitmap { counters, .. } => *counters,
        }
    }

    pub fn data(&self) -> SymbolRange
    {
        match self {
            CounterRegions::Counters { data, .. } | CounterRegions::CountersAndBitmap { data, .. } => *data,
        }
    }

    pub fn bitmap(&self) -> Option<SymbolRange>
    {
        match self {
            CounterRegions::Counters { .. } => None,
            CounterRegions::CountersAndBitmap { bitmap, .. } => Some(*bitmap),
        }
    }
}

/// Resolved handle to the profile runtime embedded in one loaded image
///
/// Immutable once resolved. See [`crate::symbols::resolve_binaries`] for how
/// handles are discovered in the current process.
#[derive(Debug, Clone)]
pub struct InstrumentedBinary
{
    name: String,
    path: PathBuf,
    entry_points: RuntimeEntryPoints,
    counters: SymbolRange,
    data: SymbolRange,
    bitmap: Option<SymbolRange>,
}

impl InstrumentedBinary
{
    /// Assemble a handle from already resolved parts.
    ///
    /// # Safety
    ///
    /// Every function in `entry_points` must be a valid profile runtime entry
    /// point with the documented signature, and the ranges must satisfy the
    /// contract of [`SymbolRange::new`], for the whole lifetime of the handle.
    pub unsafe fn from_raw_parts(
        path: impl Into<PathBuf>,
        entry_points: RuntimeEntryPoints,
        counters: SymbolRange,
        data: SymbolRange,
        bitmap: Option<SymbolRange>,
    ) -> Self
    {
        let path = path.into();
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            name,
            path,
            entry_points,
            counters,
            data,
            bitmap,
        }
    }

    pub fn name(&self) -> &str
    {
        &self.name
    }

    pub fn path(&self) -> &Path
    {
        &self.path
    }

    pub fn has_bitmap(&self) -> bool
    {
        self.bitmap.is_some()
    }

    /// Re-read the profile path variable and reopen the output file.
    pub fn initialize_profile_file(&self)
    {
        // SAFETY: guaranteed by the contract of `from_raw_parts`.
        unsafe { (self.entry_points.initialize)() }
    }

    /// Set the runtime page size. `0` disables continuous mode.
    pub fn set_page_size(&self, size: u32)
    {
        // SAFETY: guaranteed by the contract of `from_raw_parts`.
        unsafe { (self.entry_points.set_page_size)(size) }
    }

    /// Flush in-memory counters to the current output file.
    ///
    /// Returns `false` when the runtime reported a failure.
    pub fn write(&self) -> bool
    {
        // SAFETY: guaranteed by the contract of `from_raw_parts`.
        unsafe { (self.entry_points.write_file)() == 0 }
    }

    /// Raw profile version, when the runtime exports it.
    pub fn profile_version(&self) -> Option<u64>
    {
        // SAFETY: guaranteed by the contract of `from_raw_parts`.
        self.entry_points.get_version.map(|get_version| unsafe { get_version() })
    }

    /// Regions `abi` resets for this binary.
    ///
    /// Only the presence of the bitmap accessors is checked. A runtime built
    /// without MC/DC instrumentation exports them with `begin == end`, and
    /// that empty range is accepted.
    ///
    /// ## Errors
    ///
    /// - `MissingRequiredCapability`: the ABI needs a bitmap range this binary lacks
    pub fn counter_regions(&self, abi: RuntimeAbi) -> Result<CounterRegions>
    {
        if !abi.requires_bitmap() {
            return Ok(CounterRegions::Counters {
                counters: self.counters,
                data: self.data,
            });
        }

        let bitmap = self.bitmap.ok_or_else(|| CoverageError::MissingRequiredCapability {
            binary: self.name.clone(),
            capability: "bitmap range",
        })?;
        Ok(CounterRegions::CountersAndBitmap {
            counters: self.counters,
            data: self.data,
            bitmap,
        })
    }
}

/// Operations applied to every binary of a session.
pub trait BinarySet
{
    /// Flush all binaries. Returns the number of binaries whose write failed.
    fn write_all(&self) -> usize;

    /// Make every binary reopen its output file from the profile variable.
    fn initialize_all(&self);

    /// Turn continuous mode off on every binary.
    fn disable_continuous_mode(&self);

    /// Reset every binary's in-memory counters.
    ///
    /// All binaries are checked for the regions `abi` needs before any of
    /// them is touched, so a missing capability never leaves a half-reset set.
    fn reset_all(&self, exports: &dyn CoverageExports, abi: RuntimeAbi) -> Result<()>;
}

impl BinarySet for [InstrumentedBinary]
{
    fn write_all(&self) -> usize
    {
        let mut failures = 0;
        for binary in self {
            if !binary.write() {
                warn!(binary = %binary.name(), "profile runtime failed to write counters");
                failures += 1;
            }
        }
        failures
    }

    fn initialize_all(&self)
    {
        for binary in self {
            binary.initialize_profile_file();
        }
    }

    fn disable_continuous_mode(&self)
    {
        for binary in self {
            debug!(binary = %binary.name(), "disabling continuous mode");
            binary.set_page_size(0);
        }
    }

    fn reset_all(&self, exports: &dyn CoverageExports, abi: RuntimeAbi) -> Result<()>
    {
        let regions = self
            .iter()
            .map(|binary| binary.counter_regions(abi).map(|regions| (binary, regions)))
            .collect::<Result<Vec<_>>>()?;

        for (binary, regions) in regions {
            let version = binary.profile_version().unwrap_or(0);
            exports
                .reset_counters(version, &regions)
                .map_err(|message| CoverageError::CounterResetFailed {
                    binary: binary.name().to_string(),
                    message,
                })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    static mut STORAGE: [u8; 16] = [0; 16];

    unsafe extern "C" fn noop() {}

    unsafe extern "C" fn write_ok() -> c_int
    {
        0
    }

    unsafe extern "C" fn set_page_size(_: c_uint) {}

    unsafe extern "C" fn region_begin() -> *const u8
    {
        std::ptr::addr_of!(STORAGE).cast()
    }

    unsafe extern "C" fn region_end() -> *const u8
    {
        std::ptr::addr_of!(STORAGE).cast::<u8>().wrapping_add(16)
    }

    fn binary(bitmap: Option<SymbolRange>) -> InstrumentedBinary
    {
        let entry_points = RuntimeEntryPoints {
            initialize: noop,
            write_file: write_ok,
            set_page_size,
            get_version: None,
        };
        unsafe {
            InstrumentedBinary::from_raw_parts(
                "/lib/libempty.so",
                entry_points,
                SymbolRange::new(region_begin, region_end),
                SymbolRange::new(region_begin, region_end),
                bitmap,
            )
        }
    }

    #[test]
    fn test_empty_bitmap_range_satisfies_llvm19()
    {
        // Both accessors return the start of the storage.
        let empty = unsafe { SymbolRange::new(region_begin, region_begin) };
        let regions = binary(Some(empty)).counter_regions(RuntimeAbi::Llvm19).unwrap();
        assert!(regions.bitmap().unwrap().is_empty());
        assert_eq!(regions.counters().len(), 16);
    }

    #[test]
    fn test_absent_bitmap_fails_llvm19_only()
    {
        let binary = binary(None);
        let err = binary.counter_regions(RuntimeAbi::Llvm19).unwrap_err();
        assert!(matches!(
            err,
            CoverageError::MissingRequiredCapability { capability: "bitmap range", .. }
        ));
        let regions = binary.counter_regions(RuntimeAbi::Llvm17).unwrap();
        assert!(regions.bitmap().is_none());
        assert_eq!(binary.name(), "libempty.so");
    }
}
