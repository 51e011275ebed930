//! Fake profile runtime and backend shared by the integration tests.
//!
//! The runtime keeps three 64-bit counters in a static array, one per marker
//! function below, and writes them to the path published in
//! [`PROFILE_VAR`] as `index count` lines. The backend reads those lines back
//! and reports each counter as a region of `fake_module.rs`.

#![allow(dead_code)]

use std::ffi::{c_int, c_uint};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use livecov_core::decoder::{BoundaryRecord, CoverageExports, CoverageProcessor, RawFileCoverage};
use livecov_core::runtime::{CounterRegions, InstrumentedBinary, RuntimeAbi, RuntimeEntryPoints, SymbolRange};
use livecov_core::types::Location;

pub const PROFILE_VAR: &str = "LIVECOV_FAKE_PROFILE_FILE";
pub const SOURCE_FILE: &str = "fake_module.rs";

/// Source line each counter's region starts at. Regions span two lines.
pub const COUNTER_LINES: [u32; 3] = [10, 20, 30];

static COUNTERS: [AtomicU64; 3] = [AtomicU64::new(0), AtomicU64::new(0), AtomicU64::new(0)];
static DATA: [AtomicU64; 2] = [AtomicU64::new(0), AtomicU64::new(0)];
static BITMAP: [AtomicU8; 4] = [AtomicU8::new(0), AtomicU8::new(0), AtomicU8::new(0), AtomicU8::new(0)];

static OUTPUT: Mutex<Option<PathBuf>> = Mutex::new(None);
static PAGE_SIZE: AtomicU32 = AtomicU32::new(4096);
static WRITES: AtomicUsize = AtomicUsize::new(0);

/// The fake runtime is process-wide, so tests touching it run one at a time.
static TEST_LOCK: Mutex<()> = Mutex::new(());

pub fn serial() -> MutexGuard<'static, ()>
{
    TEST_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Put the fake runtime back into its initial state.
pub fn reset_runtime()
{
    for counter in &COUNTERS {
        counter.store(0, Ordering::SeqCst);
    }
    for byte in &BITMAP {
        byte.store(0xAA, Ordering::SeqCst);
    }
    *OUTPUT.lock().unwrap_or_else(PoisonError::into_inner) = None;
    PAGE_SIZE.store(4096, Ordering::SeqCst);
    WRITES.store(0, Ordering::SeqCst);
}

#[inline(never)]
pub fn test123()
{
    COUNTERS[0].fetch_add(1, Ordering::SeqCst);
    test456();
}

#[inline(never)]
pub fn test456()
{
    COUNTERS[1].fetch_add(1, Ordering::SeqCst);
}

#[inline(never)]
pub fn never_called()
{
    COUNTERS[2].fetch_add(1, Ordering::SeqCst);
}

pub fn counter(index: usize) -> u64
{
    COUNTERS[index].load(Ordering::SeqCst)
}

pub fn bitmap() -> Vec<u8>
{
    BITMAP.iter().map(|byte| byte.load(Ordering::SeqCst)).collect()
}

pub fn page_size() -> u32
{
    PAGE_SIZE.load(Ordering::SeqCst)
}

pub fn writes() -> usize
{
    WRITES.load(Ordering::SeqCst)
}

pub fn output() -> Option<PathBuf>
{
    OUTPUT.lock().unwrap_or_else(PoisonError::into_inner).clone()
}

unsafe extern "C" fn initialize()
{
    let path = std::env::var(PROFILE_VAR).ok().map(|path| PathBuf::from(path.replace("%m", "fake")));
    *OUTPUT.lock().unwrap_or_else(PoisonError::into_inner) = path;
}

unsafe extern "C" fn write_file() -> c_int
{
    let Some(path) = output() else {
        return -1;
    };
    let body: String = COUNTERS
        .iter()
        .enumerate()
        .map(|(index, counter)| format!("{index} {}\n", counter.load(Ordering::SeqCst)))
        .collect();
    WRITES.fetch_add(1, Ordering::SeqCst);
    match fs::write(path, body) {
        Ok(()) => 0,
        Err(_) => -1,
    }
}

unsafe extern "C" fn set_page_size(size: c_uint)
{
    PAGE_SIZE.store(size, Ordering::SeqCst);
}

unsafe extern "C" fn get_version() -> u64
{
    10
}

unsafe extern "C" fn begin_counters() -> *const u8
{
    COUNTERS.as_ptr().cast()
}

unsafe extern "C" fn end_counters() -> *const u8
{
    COUNTERS.as_ptr().add(COUNTERS.len()).cast()
}

unsafe extern "C" fn begin_data() -> *const u8
{
    DATA.as_ptr().cast()
}

unsafe extern "C" fn end_data() -> *const u8
{
    DATA.as_ptr().add(DATA.len()).cast()
}

unsafe extern "C" fn begin_bitmap() -> *const u8
{
    BITMAP.as_ptr().cast()
}

unsafe extern "C" fn end_bitmap() -> *const u8
{
    BITMAP.as_ptr().add(BITMAP.len()).cast()
}

/// Handle to the fake runtime, with or without the bitmap range.
pub fn fake_binary(with_bitmap: bool) -> InstrumentedBinary
{
    fake_binary_at("/fake/libfake.so", with_bitmap)
}

pub fn fake_binary_at(path: &str, with_bitmap: bool) -> InstrumentedBinary
{
    let entry_points = RuntimeEntryPoints {
        initialize,
        write_file,
        set_page_size,
        get_version: Some(get_version),
    };
    // SAFETY: every accessor returns bounds of a static array, which is
    // writable through its atomics.
    unsafe {
        InstrumentedBinary::from_raw_parts(
            path,
            entry_points,
            SymbolRange::new(begin_counters, end_counters),
            SymbolRange::new(begin_data, end_data),
            with_bitmap.then(|| SymbolRange::new(begin_bitmap, end_bitmap)),
        )
    }
}

/// Location the backend reports for counter `index`.
pub fn counter_location(index: usize) -> Location
{
    let line = COUNTER_LINES[index];
    Location::new(line, 1, line + 2, 1)
}

/// Backend that decodes the fake runtime's output format.
pub struct FakeExports
{
    pub abi: RuntimeAbi,
}

impl CoverageExports for FakeExports
{
    fn abi(&self) -> RuntimeAbi
    {
        self.abi
    }

    fn runtime_version(&self) -> String
    {
        format!("{}.1.0-fake", self.abi.llvm_major())
    }

    fn create_processor(&self, binaries: &[PathBuf]) -> Result<Box<dyn CoverageProcessor>, String>
    {
        if binaries.iter().any(|binary| binary.ends_with("unmapped.so")) {
            return Err("no coverage mapping in unmapped.so".to_string());
        }
        Ok(Box::new(FakeProcessor))
    }
}

/// Backend whose counter reset always fails.
pub struct FailingResetExports
{
    pub abi: RuntimeAbi,
}

impl CoverageExports for FailingResetExports
{
    fn abi(&self) -> RuntimeAbi
    {
        self.abi
    }

    fn runtime_version(&self) -> String
    {
        format!("{}.1.0-fake", self.abi.llvm_major())
    }

    fn create_processor(&self, binaries: &[PathBuf]) -> Result<Box<dyn CoverageProcessor>, String>
    {
        FakeExports { abi: self.abi }.create_processor(binaries)
    }

    fn reset_counters(&self, _version: u64, _regions: &CounterRegions) -> Result<(), String>
    {
        Err("reset refused".to_string())
    }
}

struct FakeProcessor;

impl CoverageProcessor for FakeProcessor
{
    fn covered_files(&self, artifact: &Path) -> Result<Vec<RawFileCoverage>, String>
    {
        let body = fs::read_to_string(artifact).map_err(|err| format!("{}: {err}", artifact.display()))?;
        let mut records = Vec::new();
        for line in body.lines() {
            let (index, count) = line
                .split_once(' ')
                .ok_or_else(|| format!("malformed record: {line}"))?;
            let index: usize = index.parse().map_err(|_| format!("malformed index: {line}"))?;
            let count: u64 = count.parse().map_err(|_| format!("malformed count: {line}"))?;
            let start = *COUNTER_LINES.get(index).ok_or_else(|| format!("unknown counter {index}"))?;
            records.push(BoundaryRecord::entry(start, 1, count));
            records.push(BoundaryRecord::end(start + 2, 1));
        }
        Ok(vec![RawFileCoverage {
            name: SOURCE_FILE.to_string(),
            records,
        }])
    }
}
