//! # livecov-core
//!
//! In-process source-coverage windows for programs built with LLVM
//! instrumentation.
//!
//! This crate provides:
//! - Discovery of every loaded image that embeds the profile runtime
//! - Windowed collection: rotate the profile output per window and reset
//!   in-memory counters so each window holds only its own executions
//! - Decoding of window artifacts through a versioned native backend
//! - A merge algebra over decoded snapshots
//!
//! ## Platform Support
//!
//! - **Linux / Android / FreeBSD**: images enumerated with `dl_iterate_phdr`
//! - **macOS**: images enumerated with the dyld image APIs
//! - **Other targets**: no images are found, sessions run with zero binaries
//!
//! ## Why unsafe code is needed
//!
//! The profile runtime is reached through raw function addresses resolved
//! from symbol tables, and the decoder backend through a C export table. Both
//! are wrapped in safe types whose constructors carry the `unsafe` contract.

#![allow(unsafe_code)] // Required for runtime entry points and the backend FFI

pub mod config;
pub mod decoder;
pub mod error;
pub mod prelude;
pub mod runtime;
pub mod session;
pub mod symbols;
pub mod types;

pub use config::CollectorConfig;
pub use decoder::{CoverageDecoder, CoverageExports, CoverageProcessor};
// Re-export commonly used types
pub use error::{CoverageError, Result};
pub use runtime::{InstrumentedBinary, RuntimeAbi};
pub use session::CoverageSession;
pub use types::{CoverageInfo, FileCoverage, Location, Segment};
