//! # Coverage Decoder
//!
//! Turns a closed window artifact into a [`CoverageInfo`] snapshot.
//!
//! Decoding the raw profile format is delegated to a native backend built
//! against one specific LLVM version. The backend is reached through two
//! traits:
//!
//! - [`CoverageExports`]: the versioned export table of a backend (create a
//!   processor, reset counters)
//! - [`CoverageProcessor`]: a backend object bound to a set of binaries that
//!   resolves artifacts into raw per-file boundary records
//!
//! [`ffi::NativeExports`] adapts a C export table to these traits, and
//! [`registry::acquire`] shares one export handle per ABI across sessions.
//! Tests substitute their own implementations.
//!
//! ## Thread Safety
//!
//! [`CoverageDecoder`] is `Sync`. Decoding distinct artifacts from many threads
//! at once is supported: decoding reads files and touches no process state.

pub mod ffi;
pub mod registry;
pub mod segments;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use segments::{reconstruct, BoundaryRecord};
use tracing::debug;

use crate::error::{CoverageError, Result};
use crate::runtime::abi::RuntimeAbi;
use crate::runtime::binary::CounterRegions;
use crate::runtime::counters;
use crate::types::{CoverageInfo, FileCoverage};

/// Boundary records of one source file, straight from the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFileCoverage
{
    pub name: String,
    pub records: Vec<BoundaryRecord>,
}

impl RawFileCoverage
{
    /// Reconstruct the file's segment map.
    pub fn into_file_coverage(self) -> FileCoverage
    {
        FileCoverage {
            segments: reconstruct(&self.records),
            name: self.name,
        }
    }
}

/// A backend object bound to one set of instrumented binaries.
pub trait CoverageProcessor: Send + Sync
{
    /// Resolve the counters stored in `artifact` against the binaries'
    /// coverage mappings.
    fn covered_files(&self, artifact: &Path) -> std::result::Result<Vec<RawFileCoverage>, String>;
}

/// Export table of a coverage backend for one runtime ABI.
pub trait CoverageExports: Send + Sync
{
    /// ABI the backend was built for.
    fn abi(&self) -> RuntimeAbi;

    /// Version string of the LLVM libraries the backend links.
    fn runtime_version(&self) -> String;

    /// Create a processor for the given binaries.
    fn create_processor(&self, binaries: &[PathBuf]) -> std::result::Result<Box<dyn CoverageProcessor>, String>;

    /// Reset the in-memory counters of one binary.
    ///
    /// The default fills the counters with the "never executed" value for
    /// `version` and clears the bitmap.
    fn reset_counters(&self, version: u64, regions: &CounterRegions) -> std::result::Result<(), String>
    {
        counters::reset_regions(version, regions);
        Ok(())
    }
}

/// Decoder bound to the binaries of one session.
pub struct CoverageDecoder
{
    // Dropped before `exports`: a native processor must not outlive its table.
    processor: Box<dyn CoverageProcessor>,
    exports: Arc<dyn CoverageExports>,
    binaries: Vec<PathBuf>,
}

impl CoverageDecoder
{
    /// Create the backend processor for `binaries`.
    ///
    /// ## Errors
    ///
    /// - `ProcessorInitFailed`: the backend refused to create a processor
    pub fn new(exports: Arc<dyn CoverageExports>, binaries: Vec<PathBuf>) -> Result<Self>
    {
        let processor = exports
            .create_processor(&binaries)
            .map_err(CoverageError::ProcessorInitFailed)?;
        debug!(
            abi = %exports.abi(),
            binaries = binaries.len(),
            "created coverage processor"
        );
        Ok(Self {
            processor,
            exports,
            binaries,
        })
    }

    /// Decode one artifact into a snapshot.
    ///
    /// ## Errors
    ///
    /// - `DecodeFailed`: the backend reported an error for this artifact
    pub fn decode(&self, artifact: &Path) -> Result<CoverageInfo>
    {
        let files = self
            .processor
            .covered_files(artifact)
            .map_err(CoverageError::DecodeFailed)?;
        Ok(files.into_iter().map(RawFileCoverage::into_file_coverage).collect())
    }

    pub fn runtime_version(&self) -> String
    {
        self.exports.runtime_version()
    }

    pub fn abi(&self) -> RuntimeAbi
    {
        self.exports.abi()
    }

    pub fn exports(&self) -> &Arc<dyn CoverageExports>
    {
        &self.exports
    }

    pub fn binaries(&self) -> &[PathBuf]
    {
        &self.binaries
    }
}

impl fmt::Debug for CoverageDecoder
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("CoverageDecoder")
            .field("abi", &self.exports.abi())
            .field("binaries", &self.binaries)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::types::Location;

    struct StaticProcessor;

    impl CoverageProcessor for StaticProcessor
    {
        fn covered_files(&self, artifact: &Path) -> std::result::Result<Vec<RawFileCoverage>, String>
        {
            if artifact.ends_with("broken.profraw") {
                return Err("malformed profile".to_string());
            }
            Ok(vec![RawFileCoverage {
                name: "src/lib.rs".to_string(),
                records: vec![BoundaryRecord::entry(1, 1, 2), BoundaryRecord::end(3, 1)],
            }])
        }
    }

    struct StaticExports
    {
        fail_create: bool,
    }

    impl CoverageExports for StaticExports
    {
        fn abi(&self) -> RuntimeAbi
        {
            RuntimeAbi::Llvm19
        }

        fn runtime_version(&self) -> String
        {
            "19.1.0".to_string()
        }

        fn create_processor(&self, _binaries: &[PathBuf]) -> std::result::Result<Box<dyn CoverageProcessor>, String>
        {
            if self.fail_create {
                Err("no coverage mapping".to_string())
            } else {
                Ok(Box::new(StaticProcessor))
            }
        }
    }

    fn assert_sync<T: Sync + Send>() {}

    #[test]
    fn test_decoder_is_sync()
    {
        assert_sync::<CoverageDecoder>();
    }

    #[test]
    fn test_decode_reconstructs_segments()
    {
        let decoder = CoverageDecoder::new(Arc::new(StaticExports { fail_create: false }), vec![]).unwrap();
        let info = decoder.decode(Path::new("/tmp/window.profraw")).unwrap();
        let file = info.file("src/lib.rs").unwrap();
        assert_eq!(file.segment(&Location::new(1, 1, 3, 1)).unwrap().count, 2);
        assert_eq!(decoder.runtime_version(), "19.1.0");
    }

    #[test]
    fn test_decode_failure_is_reported()
    {
        let decoder = CoverageDecoder::new(Arc::new(StaticExports { fail_create: false }), vec![]).unwrap();
        let err = decoder.decode(Path::new("/tmp/broken.profraw")).unwrap_err();
        assert!(matches!(err, CoverageError::DecodeFailed(message) if message == "malformed profile"));
    }

    #[test]
    fn test_processor_init_failure()
    {
        let err = CoverageDecoder::new(Arc::new(StaticExports { fail_create: true }), vec![]).unwrap_err();
        assert!(matches!(err, CoverageError::ProcessorInitFailed(_)));
    }
}
