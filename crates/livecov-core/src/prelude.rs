//! Common module for library exports

pub use crate::config::CollectorConfig;
pub use crate::decoder::{BoundaryRecord, CoverageDecoder, CoverageExports, CoverageProcessor, RawFileCoverage};
pub use crate::error::{CoverageError, Result};
pub use crate::runtime::{BinarySet, CounterRegions, InstrumentedBinary, RuntimeAbi, RuntimeEntryPoints, SymbolRange};
pub use crate::session::CoverageSession;
pub use crate::types::{CoverageInfo, CoverageSummary, FileCoverage, Location, Segment};
