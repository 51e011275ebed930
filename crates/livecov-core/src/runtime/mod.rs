//! # Profile Runtime
//!
//! Typed access to the LLVM profile runtime embedded in instrumented images.
//!
//! - [`abi`]: runtime ABI versions and the profile version bits
//! - [`binary`]: per-image handles and the operations applied to all of them
//! - [`counters`]: default in-memory counter reset

pub mod abi;
pub mod binary;
pub mod counters;

pub use abi::{RuntimeAbi, BYTE_COVERAGE_MASK};
pub use binary::{BinarySet, CounterRegions, InstrumentedBinary, RuntimeEntryPoints, SymbolRange};
