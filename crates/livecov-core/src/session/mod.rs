//! # Coverage Session
//!
//! Collects coverage for bounded windows of execution inside the running
//! process.
//!
//! ## How it works
//!
//! The profile runtime of every instrumented image accumulates counters in
//! memory and writes them to the path published in the profile variable. A
//! session rotates that path:
//!
//! 1. **Construction**: normalizes the requested path (see [`path::normalize`]),
//!    publishes it if it changed and flushes everything collected so far
//! 2. **`start_gathering`**: flushes, publishes a fresh window file in the
//!    temp directory and resets all in-memory counters
//! 3. **`stop_gathering`**: flushes into the window file, publishes the
//!    baseline path again and hands the window file to the caller
//!
//! ```text
//! Idle(baseline) --start--> Gathering(window) --stop--> Idle(baseline)
//! ```
//!
//! ## Concurrency
//!
//! The profile variable and the counters are process-wide. `start_gathering`
//! and `stop_gathering` take `&mut self`, which serializes them per session.
//! Two sessions in one process must be coordinated by the caller. Decoding
//! closed windows with [`CoverageSession::files_covered`] only needs `&self`
//! and can run from many threads.
//!
//! ## Example
//!
//! ```rust,no_run
//! use livecov_core::config::CollectorConfig;
//! use livecov_core::decoder::ffi::NativeExports;
//! use livecov_core::session::CoverageSession;
//! use std::sync::Arc;
//!
//! fn main() -> livecov_core::Result<()>
//! {
//!     let config = CollectorConfig::from_env()?;
//!     let mut session = CoverageSession::for_current_process(config, |abi| {
//!         Ok(Arc::new(NativeExports::load("libcoverage_backend.so".as_ref(), abi)?))
//!     })?;
//!
//!     session.start_gathering()?;
//!     // ... code under test ...
//!     let window = session.stop_gathering()?;
//!
//!     let coverage = session.files_covered(&window)?;
//!     println!("{coverage}");
//!     std::fs::remove_file(window)?;
//!     Ok(())
//! }
//! ```

pub mod baseline;
pub mod env;
pub mod path;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use self::env::ProfilePathCell;
use crate::config::CollectorConfig;
use crate::decoder::{registry, CoverageDecoder, CoverageExports};
use crate::error::{CoverageError, Result};
use crate::runtime::abi::RuntimeAbi;
use crate::runtime::binary::{BinarySet, InstrumentedBinary};
use crate::symbols;
use crate::types::CoverageInfo;

/// File name of the `index`-th window of process `pid`.
pub fn window_file_name(pid: u32, index: u64) -> String
{
    format!("code-coverage-{pid}-{index}.profraw")
}

/// Windowed coverage collector for the current process
pub struct CoverageSession
{
    cell: ProfilePathCell,
    baseline_path: String,
    temp_dir: PathBuf,
    runtime_abi: RuntimeAbi,
    binaries: Vec<InstrumentedBinary>,
    decoder: CoverageDecoder,
    baseline: Option<CoverageInfo>,
    window_counter: u64,
    process_id: u32,
}

impl CoverageSession
{
    /// Create a session for the path currently published in the profile variable.
    ///
    /// ## Errors
    ///
    /// - `CoverageDisabled`: the profile variable is unset
    /// - any error of [`CoverageSession::with_requested_path`]
    pub fn new(
        config: CollectorConfig,
        binaries: Vec<InstrumentedBinary>,
        exports: Arc<dyn CoverageExports>,
    ) -> Result<Self>
    {
        let requested = ProfilePathCell::new(config.profile_variable.clone()).current()?;
        Self::with_requested_path(config, &requested, binaries, exports)
    }

    /// Create a session for an explicit requested profile path.
    ///
    /// ## Errors
    ///
    /// - `InvalidConfig`: the temp directory is not valid UTF-8, so window
    ///   paths could not be read back from the profile variable
    /// - `ProcessorInitFailed`: the backend could not create a processor for `binaries`
    /// - `Io`: the temp directory could not be created
    pub fn with_requested_path(
        config: CollectorConfig,
        requested: &str,
        binaries: Vec<InstrumentedBinary>,
        exports: Arc<dyn CoverageExports>,
    ) -> Result<Self>
    {
        if config.temp_dir.to_str().is_none() {
            return Err(CoverageError::InvalidConfig(format!(
                "temp directory is not valid UTF-8: {}",
                config.temp_dir.display()
            )));
        }
        let paths = binaries.iter().map(|binary| binary.path().to_path_buf()).collect();
        let decoder = CoverageDecoder::new(exports, paths)?;
        fs::create_dir_all(&config.temp_dir)?;

        let normalized = path::normalize(requested);
        let mut session = Self {
            cell: ProfilePathCell::new(config.profile_variable),
            baseline_path: normalized.path,
            temp_dir: config.temp_dir,
            runtime_abi: config.runtime_abi,
            binaries,
            decoder,
            baseline: None,
            window_counter: 0,
            process_id: std::process::id(),
        };

        if normalized.changed {
            session.binaries.disable_continuous_mode();
        }
        let published = session.cell.current().ok();
        if normalized.changed || published.as_deref() != Some(session.baseline_path.as_str()) {
            session.set_active_path(Path::new(&session.baseline_path));
        }
        session.binaries.write_all();

        if config.load_baseline {
            session.baseline = session.load_baseline();
        }

        info!(
            path = %session.baseline_path,
            binaries = session.binaries.len(),
            abi = %session.runtime_abi,
            baseline = session.baseline.is_some(),
            "coverage session ready"
        );
        Ok(session)
    }

    /// Resolve the binaries of this process and share a backend for
    /// `config.runtime_abi`, loading it through `loader` when no session holds one.
    ///
    /// ## Errors
    ///
    /// - any error of `loader` or [`CoverageSession::new`]
    pub fn for_current_process<F>(config: CollectorConfig, loader: F) -> Result<Self>
    where
        F: FnOnce(RuntimeAbi) -> Result<Arc<dyn CoverageExports>>,
    {
        let binaries = symbols::resolve_binaries();
        let exports = registry::acquire(config.runtime_abi, loader)?;
        Self::new(config, binaries, exports)
    }

    fn load_baseline(&self) -> Option<CoverageInfo>
    {
        let artifact = match baseline::find_artifact(Path::new(&self.baseline_path)) {
            Ok(Some(artifact)) => artifact,
            Ok(None) => return None,
            Err(err) => {
                warn!(error = %err, "could not scan for a baseline artifact");
                return None;
            }
        };
        match self.decoder.decode(&artifact) {
            Ok(info) => {
                debug!(artifact = %artifact.display(), files = info.files.len(), "loaded baseline coverage");
                Some(info)
            }
            Err(err) => {
                warn!(artifact = %artifact.display(), error = %err, "ignoring undecodable baseline artifact");
                None
            }
        }
    }

    /// Open a window.
    ///
    /// ## Errors
    ///
    /// - `CoverageDisabled`: the profile variable was unset behind the session's back
    /// - `WindowAlreadyOpen`: the published path is not the baseline path
    /// - `MissingRequiredCapability`: a binary lacks a region the runtime ABI resets
    /// - `CounterResetFailed`: the backend failed to reset a binary; the
    ///   baseline path is published again and no window is open
    pub fn start_gathering(&mut self) -> Result<()>
    {
        if self.cell.current()? != self.baseline_path {
            return Err(CoverageError::WindowAlreadyOpen);
        }
        for binary in &self.binaries {
            binary.counter_regions(self.runtime_abi)?;
        }

        self.binaries.write_all();
        let window = self.temp_dir.join(window_file_name(self.process_id, self.window_counter));
        self.window_counter = self.window_counter.wrapping_add(1);
        self.set_active_path(&window);
        if let Err(err) = self.binaries.reset_all(self.decoder.exports().as_ref(), self.runtime_abi) {
            let baseline = PathBuf::from(&self.baseline_path);
            self.set_active_path(&baseline);
            warn!(window = %window.display(), error = %err, "counter reset failed, window discarded");
            return Err(err);
        }

        info!(window = %window.display(), "coverage window opened");
        Ok(())
    }

    /// Close the open window and return its artifact.
    ///
    /// The caller owns the returned file.
    ///
    /// ## Errors
    ///
    /// - `CoverageDisabled`: the profile variable was unset behind the session's back
    /// - `WindowNotOpen`: the published path is not a window file of this session
    pub fn stop_gathering(&mut self) -> Result<PathBuf>
    {
        let current = self.cell.current()?;
        if current == self.baseline_path || !Path::new(&current).starts_with(&self.temp_dir) {
            return Err(CoverageError::WindowNotOpen);
        }

        self.binaries.write_all();
        let baseline = PathBuf::from(&self.baseline_path);
        self.set_active_path(&baseline);

        info!(window = %current, "coverage window closed");
        Ok(PathBuf::from(current))
    }

    /// Decode a closed window, merged with the baseline when one was loaded.
    ///
    /// ## Errors
    ///
    /// - `DecodeFailed`: the backend could not decode `artifact`
    pub fn files_covered(&self, artifact: &Path) -> Result<CoverageInfo>
    {
        let covered = self.decoder.decode(artifact)?;
        Ok(match &self.baseline {
            Some(baseline) => baseline.merge(&covered),
            None => covered,
        })
    }

    /// Publish `path` and make every binary reopen its output file.
    pub fn set_active_path(&self, path: &Path)
    {
        self.cell.publish(path);
        self.binaries.initialize_all();
        debug!(path = %path.display(), "published profile path");
    }

    /// Path currently published in the profile variable.
    ///
    /// ## Errors
    ///
    /// - `CoverageDisabled`: the variable is unset
    pub fn current_path(&self) -> Result<String>
    {
        self.cell.current()
    }

    pub fn baseline_path(&self) -> &str
    {
        &self.baseline_path
    }

    pub fn temp_dir(&self) -> &Path
    {
        &self.temp_dir
    }

    pub fn binaries(&self) -> &[InstrumentedBinary]
    {
        &self.binaries
    }

    pub fn baseline(&self) -> Option<&CoverageInfo>
    {
        self.baseline.as_ref()
    }

    pub fn runtime_abi(&self) -> RuntimeAbi
    {
        self.runtime_abi
    }

    pub fn decoder(&self) -> &CoverageDecoder
    {
        &self.decoder
    }

    pub fn profile_variable(&self) -> &str
    {
        self.cell.name()
    }
}

impl Drop for CoverageSession
{
    fn drop(&mut self)
    {
        let failures = self.binaries.write_all();
        if failures > 0 {
            warn!(failures, "final coverage flush incomplete");
        }
    }
}
