//! # Types
//!
//! Value types produced by the decoder and consumed by callers.
//!
//! These types own no native resources, so they can be cloned, serialized and
//! sent across threads freely.

pub mod coverage;
pub mod location;

// Re-export all public types
pub use coverage::{CoverageInfo, CoverageSummary, FileCoverage, Segment};
pub use location::Location;
