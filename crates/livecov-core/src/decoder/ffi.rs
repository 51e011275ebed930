//! # Backend FFI
//!
//! C layout of a coverage backend's export table and its adapter to
//! [`CoverageExports`] / [`CoverageProcessor`].
//!
//! ## Result convention
//!
//! Every fallible entry point returns an `is_error` flag next to a union of
//! the payload and an error string. When the flag is set the string is always
//! non-null and owned by the backend until handed back through
//! `release_string`. A set flag with a null string is a broken backend and
//! panics.
//!
//! ## Ownership
//!
//! Memory allocated by the backend (file lists, strings, parsers) is always
//! released by the backend through the matching table entry, never by Rust.

use std::any::Any;
use std::ffi::{c_char, c_uint, CStr, CString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use libloading::Library;
use tracing::debug;

use super::{BoundaryRecord, CoverageExports, CoverageProcessor, RawFileCoverage};
use crate::error::{CoverageError, Result};
use crate::runtime::abi::RuntimeAbi;
use crate::runtime::binary::{CounterRegions, RegionBoundFn};

/// Name of the export table every backend defines.
pub const GENERIC_TABLE_SYMBOL: &str = "coverage_parser_library_instance";

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct CBoundaryRecord
{
    pub line: c_uint,
    pub column: c_uint,
    pub count: u64,
    pub has_count: bool,
    pub is_region_entry: bool,
    pub is_gap_region: bool,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct CFileCoverage
{
    pub name: *const c_char,
    pub records: *const CBoundaryRecord,
    pub records_count: usize,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct CFileCoverageList
{
    pub files: *const CFileCoverage,
    pub files_count: usize,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union CFilesPayload
{
    pub files: CFileCoverageList,
    pub error: *const c_char,
}

#[repr(C)]
pub struct CFilesResult
{
    pub is_error: bool,
    pub payload: CFilesPayload,
}

pub type CoveredFilesFn = unsafe extern "C" fn(parser: *const CCoverageParser, artifact: *const c_char) -> CFilesResult;
pub type DestroyFn = unsafe extern "C" fn(parser: *mut CCoverageParser);

/// Parser vtable allocated by the backend.
#[repr(C)]
pub struct CCoverageParser
{
    pub covered_files: Option<CoveredFilesFn>,
    pub destroy: Option<DestroyFn>,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union CParserPayload
{
    pub parser: *mut CCoverageParser,
    pub error: *const c_char,
}

#[repr(C)]
pub struct CParserResult
{
    pub is_error: bool,
    pub payload: CParserPayload,
}

/// Outcome of a call without a payload. `error` is null on success.
#[repr(C)]
pub struct CStatus
{
    pub is_error: bool,
    pub error: *const c_char,
}

pub type CreateParserFn = unsafe extern "C" fn(binaries: *const *const c_char, count: u32) -> CParserResult;
pub type ResetCountersFn = unsafe extern "C" fn(
    version: u64,
    counters_begin: RegionBoundFn,
    counters_end: RegionBoundFn,
    data_begin: RegionBoundFn,
    data_end: RegionBoundFn,
    bitmap_begin: Option<RegionBoundFn>,
    bitmap_end: Option<RegionBoundFn>,
) -> CStatus;
pub type ReleaseFilesFn = unsafe extern "C" fn(files: CFileCoverageList);
pub type ReleaseStringFn = unsafe extern "C" fn(string: *const c_char);

/// Export table a backend library defines under [`GENERIC_TABLE_SYMBOL`].
///
/// `reset_counters` may be null, in which case the built-in reset is used.
#[repr(C)]
pub struct CCoverageParserLibrary
{
    pub llvm_version: *const c_char,
    pub create_parser: Option<CreateParserFn>,
    pub reset_counters: Option<ResetCountersFn>,
    pub release_files: Option<ReleaseFilesFn>,
    pub release_string: Option<ReleaseStringFn>,
}

/// Take ownership of a backend error string and hand it back.
///
/// # Panics
///
/// When `error` is null: the backend set the error flag without a message.
unsafe fn take_error(error: *const c_char, release: ReleaseStringFn) -> String
{
    assert!(!error.is_null(), "coverage backend set the error flag without an error message");
    let message = CStr::from_ptr(error).to_string_lossy().into_owned();
    release(error);
    message
}

/// [`CoverageExports`] over a C export table
///
/// Holds `owner` (typically the loaded library) for as long as the table is
/// in use, so the table's code stays mapped.
pub struct NativeExports
{
    abi: RuntimeAbi,
    runtime_version: String,
    create_parser: CreateParserFn,
    reset_counters: Option<ResetCountersFn>,
    release_files: ReleaseFilesFn,
    release_string: ReleaseStringFn,
    _owner: Box<dyn Any + Send + Sync>,
}

impl NativeExports
{
    /// Adapt the export table at `table`.
    ///
    /// ## Errors
    ///
    /// - `SymbolResolutionFailed`: the table pointer or a required entry is null
    ///
    /// # Safety
    ///
    /// `table` must point to a valid [`CCoverageParserLibrary`] whose entries
    /// stay callable for as long as `owner` is alive.
    pub unsafe fn from_raw(
        abi: RuntimeAbi,
        table: *const CCoverageParserLibrary,
        owner: Box<dyn Any + Send + Sync>,
    ) -> Result<Self>
    {
        let table = table
            .as_ref()
            .ok_or_else(|| CoverageError::SymbolResolutionFailed("export table is null".to_string()))?;

        let missing = |entry: &str| CoverageError::SymbolResolutionFailed(format!("export table has no {entry}"));
        let create_parser = table.create_parser.ok_or_else(|| missing("create_parser"))?;
        let release_files = table.release_files.ok_or_else(|| missing("release_files"))?;
        let release_string = table.release_string.ok_or_else(|| missing("release_string"))?;
        let runtime_version = if table.llvm_version.is_null() {
            String::new()
        } else {
            CStr::from_ptr(table.llvm_version).to_string_lossy().into_owned()
        };

        debug!(%abi, version = %runtime_version, "adapted native export table");
        Ok(Self {
            abi,
            runtime_version,
            create_parser,
            reset_counters: table.reset_counters,
            release_files,
            release_string,
            _owner: owner,
        })
    }

    /// Load a backend library from `path` and adapt its export table.
    ///
    /// The ABI-specific table symbol is tried before the generic one.
    ///
    /// ## Errors
    ///
    /// - `BackendUnavailable`: the library could not be loaded
    /// - `SymbolResolutionFailed`: no export table symbol, or an incomplete table
    pub fn load(path: &Path, abi: RuntimeAbi) -> Result<Self>
    {
        // SAFETY: backends are plain C libraries without load-time side
        // effects beyond static initialization.
        let library = unsafe { Library::new(path) }
            .map_err(|err| CoverageError::BackendUnavailable(format!("{}: {err}", path.display())))?;
        debug!(path = %path.display(), "opened coverage backend");

        // SAFETY: both names are reserved for the backend's export table.
        let table = unsafe {
            table_symbol(&library, &abi.export_table_symbol())
                .or_else(|_| table_symbol(&library, GENERIC_TABLE_SYMBOL))
        }
        .map_err(|err| {
            CoverageError::SymbolResolutionFailed(format!("{} exports no coverage table: {err}", path.display()))
        })?;

        // SAFETY: the library moves into the exports, so the table outlives
        // every use.
        unsafe { Self::from_raw(abi, table, Box::new(library)) }
    }
}

impl fmt::Debug for NativeExports
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("NativeExports")
            .field("abi", &self.abi)
            .field("runtime_version", &self.runtime_version)
            .field("native_reset", &self.reset_counters.is_some())
            .finish_non_exhaustive()
    }
}

impl CoverageExports for NativeExports
{
    fn abi(&self) -> RuntimeAbi
    {
        self.abi
    }

    fn runtime_version(&self) -> String
    {
        self.runtime_version.clone()
    }

    fn create_processor(&self, binaries: &[PathBuf]) -> std::result::Result<Box<dyn CoverageProcessor>, String>
    {
        let paths = binaries
            .iter()
            .map(|path| c_path(path))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let pointers: Vec<*const c_char> = paths.iter().map(|path| path.as_ptr()).collect();
        let count = u32::try_from(pointers.len()).map_err(|_| "too many binaries".to_string())?;

        // SAFETY: `pointers` holds `count` valid C strings kept alive by `paths`.
        let result = unsafe { (self.create_parser)(pointers.as_ptr(), count) };
        if result.is_error {
            // SAFETY: the error arm of the union is active when the flag is set.
            return Err(unsafe { take_error(result.payload.error, self.release_string) });
        }

        // SAFETY: the parser arm of the union is active when the flag is clear.
        let parser = NonNull::new(unsafe { result.payload.parser })
            .ok_or_else(|| "coverage backend returned a null parser".to_string())?;
        // SAFETY: a non-null parser from `create_parser` points to a live vtable.
        let vtable = unsafe { parser.as_ref() };
        let (Some(covered_files), Some(destroy)) = (vtable.covered_files, vtable.destroy) else {
            return Err("coverage backend returned an incomplete parser".to_string());
        };

        Ok(Box::new(NativeProcessor {
            parser,
            covered_files,
            destroy,
            release_files: self.release_files,
            release_string: self.release_string,
        }))
    }

    fn reset_counters(&self, version: u64, regions: &CounterRegions) -> std::result::Result<(), String>
    {
        let Some(reset) = self.reset_counters else {
            crate::runtime::counters::reset_regions(version, regions);
            return Ok(());
        };

        let (counters_begin, counters_end) = regions.counters().accessors();
        let (data_begin, data_end) = regions.data().accessors();
        let bitmap = regions.bitmap().map(|bitmap| bitmap.accessors());

        // SAFETY: every accessor comes from a resolved `SymbolRange`.
        let status = unsafe {
            reset(
                version,
                counters_begin,
                counters_end,
                data_begin,
                data_end,
                bitmap.map(|(begin, _)| begin),
                bitmap.map(|(_, end)| end),
            )
        };
        if status.is_error {
            // SAFETY: a set flag carries a backend-owned error string.
            return Err(unsafe { take_error(status.error, self.release_string) });
        }
        Ok(())
    }
}

/// Backend parser bound to one set of binaries.
struct NativeProcessor
{
    parser: NonNull<CCoverageParser>,
    covered_files: CoveredFilesFn,
    destroy: DestroyFn,
    release_files: ReleaseFilesFn,
    release_string: ReleaseStringFn,
}

// SAFETY: the parser is only read through `covered_files`, which backends
// implement without mutating shared state, and destroyed once on drop.
unsafe impl Send for NativeProcessor {}
unsafe impl Sync for NativeProcessor {}

impl CoverageProcessor for NativeProcessor
{
    fn covered_files(&self, artifact: &Path) -> std::result::Result<Vec<RawFileCoverage>, String>
    {
        let artifact = c_path(artifact)?;

        // SAFETY: the parser is live until drop and `artifact` is a C string.
        let result = unsafe { (self.covered_files)(self.parser.as_ptr(), artifact.as_ptr()) };
        if result.is_error {
            // SAFETY: the error arm of the union is active when the flag is set.
            return Err(unsafe { take_error(result.payload.error, self.release_string) });
        }

        // SAFETY: the files arm is active when the flag is clear. The list is
        // copied out before being released.
        unsafe {
            let list = result.payload.files;
            let files = copy_files(&list);
            (self.release_files)(list);
            Ok(files)
        }
    }
}

impl Drop for NativeProcessor
{
    fn drop(&mut self)
    {
        // SAFETY: the parser came from `create_parser` and is destroyed once.
        unsafe { (self.destroy)(self.parser.as_ptr()) }
    }
}

unsafe fn slice_or_empty<'a, T>(data: *const T, len: usize) -> &'a [T]
{
    if data.is_null() || len == 0 {
        &[]
    } else {
        std::slice::from_raw_parts(data, len)
    }
}

unsafe fn copy_files(list: &CFileCoverageList) -> Vec<RawFileCoverage>
{
    slice_or_empty(list.files, list.files_count)
        .iter()
        .map(|file| RawFileCoverage {
            name: if file.name.is_null() {
                String::new()
            } else {
                CStr::from_ptr(file.name).to_string_lossy().into_owned()
            },
            records: slice_or_empty(file.records, file.records_count)
                .iter()
                .map(|record| BoundaryRecord {
                    line: record.line,
                    column: record.column,
                    count: record.count,
                    has_count: record.has_count,
                    is_region_entry: record.is_region_entry,
                    is_gap_region: record.is_gap_region,
                })
                .collect(),
        })
        .collect()
}

/// `path` as a C string for the backend, which expects UTF-8.
fn c_path(path: &Path) -> std::result::Result<CString, String>
{
    let utf8 = path
        .to_str()
        .ok_or_else(|| format!("{} is not valid UTF-8", path.display()))?;
    CString::new(utf8).map_err(|err| err.to_string())
}

/// Address of the export table `name` in `library`.
///
/// # Safety
///
/// `name` must denote a [`CCoverageParserLibrary`] if the library defines it.
unsafe fn table_symbol(
    library: &Library,
    name: &str,
) -> std::result::Result<*const CCoverageParserLibrary, libloading::Error>
{
    let symbol: libloading::Symbol<*const CCoverageParserLibrary> = library.get(name.as_bytes())?;
    Ok(*symbol)
}
