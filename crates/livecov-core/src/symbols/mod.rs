//! # Symbol Resolution
//!
//! Discovers which loaded images carry an instrumentation runtime and resolves
//! its entry points.
//!
//! ## How it works
//!
//! 1. [`loaded_images`] asks the platform loader for every mapped image and
//!    its slide (`dl_iterate_phdr` on ELF targets, the dyld image list on macOS)
//! 2. [`SymbolTable::load`] parses each image from disk with the `object`
//!    crate and looks up the profile runtime symbols
//! 3. Images that export every required symbol become an [`InstrumentedBinary`]
//!
//! Images without the runtime, or that cannot be read back from disk (vdso,
//! shared cache members), are skipped.
//!
//! ## Example
//!
//! ```rust,no_run
//! use livecov_core::symbols;
//!
//! for binary in symbols::resolve_binaries() {
//!     println!("{} ({})", binary.name(), binary.path().display());
//! }
//! ```

pub mod image;
pub mod table;

pub use image::{loaded_images, LoadedImage};
pub use table::SymbolTable;
use tracing::debug;

use crate::runtime::binary::{
    GetVersionFn, InitializeFn, InstrumentedBinary, RegionBoundFn, RuntimeEntryPoints, SetPageSizeFn, SymbolRange,
    WriteFileFn,
};

pub const INITIALIZE: &str = "__llvm_profile_initialize";
pub const WRITE_FILE: &str = "__llvm_profile_write_file";
pub const SET_PAGE_SIZE: &str = "__llvm_profile_set_page_size";
pub const GET_VERSION: &str = "__llvm_profile_get_version";
pub const BEGIN_COUNTERS: &str = "__llvm_profile_begin_counters";
pub const END_COUNTERS: &str = "__llvm_profile_end_counters";
pub const BEGIN_DATA: &str = "__llvm_profile_begin_data";
pub const END_DATA: &str = "__llvm_profile_end_data";
pub const BEGIN_BITMAP: &str = "__llvm_profile_begin_bitmap";
pub const END_BITMAP: &str = "__llvm_profile_end_bitmap";

/// Symbols an image must export to be treated as instrumented.
pub const REQUIRED_SYMBOLS: [&str; 7] = [
    INITIALIZE,
    WRITE_FILE,
    SET_PAGE_SIZE,
    BEGIN_COUNTERS,
    END_COUNTERS,
    BEGIN_DATA,
    END_DATA,
];

/// Symbols picked up when present.
pub const OPTIONAL_SYMBOLS: [&str; 3] = [GET_VERSION, BEGIN_BITMAP, END_BITMAP];

/// Resolve every instrumented image loaded into the current process.
pub fn resolve_binaries() -> Vec<InstrumentedBinary>
{
    let binaries: Vec<_> = loaded_images().iter().filter_map(resolve_image).collect();
    debug!(count = binaries.len(), "resolved instrumented binaries");
    binaries
}

/// Resolve the profile runtime of one loaded image.
///
/// Returns `None` when the image is not relocated, cannot be read or lacks a
/// required symbol.
pub fn resolve_image(image: &LoadedImage) -> Option<InstrumentedBinary>
{
    // Unslid images are system images mapped at their link address.
    if image.slide == 0 || !table::is_on_disk(&image.path) {
        return None;
    }

    let wanted: Vec<&str> = REQUIRED_SYMBOLS.iter().chain(OPTIONAL_SYMBOLS.iter()).copied().collect();
    let table = match SymbolTable::load(image, &wanted) {
        Ok(table) => table,
        Err(err) => {
            debug!(image = %image.path.display(), error = %err, "skipping unreadable image");
            return None;
        }
    };

    if let Some(missing) = REQUIRED_SYMBOLS.iter().find(|name| table.address(name).is_none()) {
        if !table.is_empty() {
            debug!(image = %image.path.display(), symbol = *missing, "image has a partial profile runtime");
        }
        return None;
    }

    // SAFETY: every address below was resolved from the image's own symbol
    // table for a function with the matching profile runtime signature, and
    // loaded images stay mapped for the lifetime of the process.
    let binary = unsafe { binary_from_table(image, &table)? };
    debug!(
        binary = %binary.name(),
        bitmap = binary.has_bitmap(),
        "resolved profile runtime"
    );
    Some(binary)
}

unsafe fn binary_from_table(image: &LoadedImage, table: &SymbolTable) -> Option<InstrumentedBinary>
{
    let entry_points = RuntimeEntryPoints {
        initialize: function::<InitializeFn>(table, INITIALIZE)?,
        write_file: function::<WriteFileFn>(table, WRITE_FILE)?,
        set_page_size: function::<SetPageSizeFn>(table, SET_PAGE_SIZE)?,
        get_version: function::<GetVersionFn>(table, GET_VERSION),
    };
    let counters = range(table, BEGIN_COUNTERS, END_COUNTERS)?;
    let data = range(table, BEGIN_DATA, END_DATA)?;
    let bitmap = range(table, BEGIN_BITMAP, END_BITMAP);

    Some(InstrumentedBinary::from_raw_parts(
        image.path.clone(),
        entry_points,
        counters,
        data,
        bitmap,
    ))
}

unsafe fn range(table: &SymbolTable, begin: &str, end: &str) -> Option<SymbolRange>
{
    Some(SymbolRange::new(
        function::<RegionBoundFn>(table, begin)?,
        function::<RegionBoundFn>(table, end)?,
    ))
}

/// Reinterpret a resolved address as a function pointer of type `F`.
unsafe fn function<F: Copy>(table: &SymbolTable, name: &str) -> Option<F>
{
    let address = usize::try_from(table.address(name)?).ok()?;
    if address == 0 {
        return None;
    }
    debug_assert_eq!(std::mem::size_of::<F>(), std::mem::size_of::<usize>());
    Some(std::mem::transmute_copy::<usize, F>(&address))
}
