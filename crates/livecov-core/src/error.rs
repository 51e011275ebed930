//! # Error Types
//!
//! General error handling for coverage sessions and decoding.
//!
//! We use `thiserror` to automatically generate `Error` trait implementations
//! and nice error messages.

use thiserror::Error;

/// Main error type for coverage operations
///
/// Each variant corresponds to a specific way a coverage operation can fail.
///
/// ## Error Categories
///
/// 1. **Environment errors**: CoverageDisabled, InvalidConfig
/// 2. **Window protocol errors**: WindowAlreadyOpen, WindowNotOpen (recoverable, retry with corrected sequencing)
/// 3. **Capability errors**: MissingRequiredCapability, CounterResetFailed
/// 4. **Resolution errors**: SymbolResolutionFailed, BackendUnavailable, ProcessorInitFailed (fatal for a session)
/// 5. **Decoding errors**: DecodeFailed (per call, session state is untouched)
/// 6. **I/O errors**: Io, Json
///
/// Merging two snapshots never fails, so there is no merge variant.
#[derive(Error, Debug)]
pub enum CoverageError
{
    /// The profile path variable is not set in the process environment
    ///
    /// The instrumentation runtime only writes counters when it has an output
    /// path. Without one there is nothing to redirect, so every session
    /// operation refuses to run.
    ///
    /// ## Solution
    ///
    /// Run the program with the variable set, e.g. `LLVM_PROFILE_FILE=cov.profraw`.
    #[error("Coverage is disabled: {variable} is not set")]
    CoverageDisabled
    {
        /// Name of the environment variable that was consulted
        variable: String,
    },

    /// `start_gathering` was called while a window was already open
    ///
    /// The published profile path no longer equals the session's baseline
    /// path, which means a previous window was never stopped.
    #[error("Coverage window is already open")]
    WindowAlreadyOpen,

    /// `stop_gathering` was called without an open window
    #[error("Coverage window is not open")]
    WindowNotOpen,

    /// A binary lacks a capability the selected runtime ABI needs
    ///
    /// Example: resetting counters for a bitmap-aware runtime on a binary that
    /// exports no bitmap range. Resetting anyway would leave stale branch data
    /// in the next window.
    #[error("Binary {binary} is missing required capability: {capability}")]
    MissingRequiredCapability
    {
        /// Name of the binary image
        binary: String,
        /// Human-readable capability name (e.g. "bitmap range")
        capability: &'static str,
    },

    /// The runtime refused to reset a binary's in-memory counters
    #[error("Failed to reset counters for {binary}: {message}")]
    CounterResetFailed
    {
        /// Name of the binary image
        binary: String,
        /// Message reported by the reset routine
        message: String,
    },

    /// A required native entry point could not be found
    ///
    /// This is fatal and never retried.
    #[error("Symbol resolution failed: {0}")]
    SymbolResolutionFailed(String),

    /// The export table for a runtime ABI could not be obtained
    #[error("Coverage backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The native side failed to create a coverage processor for the binaries
    #[error("Failed to initialize coverage processor: {0}")]
    ProcessorInitFailed(String),

    /// The native decoder reported a structural or runtime failure
    #[error("Failed to decode coverage: {0}")]
    DecodeFailed(String),

    /// A configuration value could not be parsed
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error (reading images, scanning for the baseline artifact, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience type alias for `Result<T, CoverageError>`
///
/// ```rust
/// use livecov_core::error::Result;
/// fn foo() -> Result<()>
/// {
///     Ok(())
/// }
/// ```
pub type Result<T> = std::result::Result<T, CoverageError>;
