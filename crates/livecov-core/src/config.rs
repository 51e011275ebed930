//! # Collector Configuration
//!
//! Settings for a [`CoverageSession`](crate::session::CoverageSession).
//!
//! ## Environment Variables
//!
//! [`CollectorConfig::from_env`] reads:
//! - `LIVECOV_TEMP_DIR`: directory for window artifacts (default: system temp dir)
//! - `LIVECOV_RUNTIME_ABI`: `llvm17` or `llvm19` (default: the ABI of the compiling toolchain)
//! - `LIVECOV_LOAD_BASELINE`: `1`/`0`/`true`/`false` (default: `true`)

use std::env;
use std::path::PathBuf;

use crate::error::{CoverageError, Result};
use crate::runtime::abi::RuntimeAbi;
use crate::session::env::LLVM_PROFILE_FILE;

pub const TEMP_DIR_VAR: &str = "LIVECOV_TEMP_DIR";
pub const RUNTIME_ABI_VAR: &str = "LIVECOV_RUNTIME_ABI";
pub const LOAD_BASELINE_VAR: &str = "LIVECOV_LOAD_BASELINE";

/// Collector settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorConfig
{
    /// Directory window artifacts are written to
    pub temp_dir: PathBuf,
    /// Runtime ABI the counter reset and the decoder backend target
    pub runtime_abi: RuntimeAbi,
    /// Environment variable the profile runtime reads its output path from
    pub profile_variable: String,
    /// Decode a leftover artifact next to the baseline path at construction
    pub load_baseline: bool,
}

impl Default for CollectorConfig
{
    fn default() -> Self
    {
        Self {
            temp_dir: env::temp_dir(),
            runtime_abi: RuntimeAbi::compiled_by().unwrap_or(RuntimeAbi::Llvm19),
            profile_variable: LLVM_PROFILE_FILE.to_string(),
            load_baseline: true,
        }
    }
}

impl CollectorConfig
{
    /// Defaults overridden by the `LIVECOV_*` environment variables.
    ///
    /// ## Errors
    ///
    /// - `InvalidConfig`: a variable is set to a value that does not parse
    pub fn from_env() -> Result<Self>
    {
        let mut config = Self::default();
        if let Some(dir) = env::var_os(TEMP_DIR_VAR).filter(|dir| !dir.is_empty()) {
            config.temp_dir = PathBuf::from(dir);
        }
        if let Ok(abi) = env::var(RUNTIME_ABI_VAR) {
            config.runtime_abi = abi.parse()?;
        }
        if let Ok(flag) = env::var(LOAD_BASELINE_VAR) {
            config.load_baseline = parse_flag(&flag)?;
        }
        Ok(config)
    }

    #[must_use]
    pub fn with_temp_dir(mut self, temp_dir: impl Into<PathBuf>) -> Self
    {
        self.temp_dir = temp_dir.into();
        self
    }

    #[must_use]
    pub fn with_runtime_abi(mut self, abi: RuntimeAbi) -> Self
    {
        self.runtime_abi = abi;
        self
    }

    #[must_use]
    pub fn with_profile_variable(mut self, name: impl Into<String>) -> Self
    {
        self.profile_variable = name.into();
        self
    }

    #[must_use]
    pub fn with_load_baseline(mut self, load: bool) -> Self
    {
        self.load_baseline = load;
        self
    }
}

fn parse_flag(value: &str) -> Result<bool>
{
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(CoverageError::InvalidConfig(format!(
            "{LOAD_BASELINE_VAR}: expected a boolean, found '{other}'"
        ))),
    }
}
