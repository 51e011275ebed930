//! The process-wide profile path variable.

use std::env::{self, VarError};
use std::path::Path;

use crate::error::{CoverageError, Result};

/// Variable the LLVM profile runtime reads its output path from.
pub const LLVM_PROFILE_FILE: &str = "LLVM_PROFILE_FILE";

/// Named environment variable holding the active profile path
///
/// There is one value per process. Every read and write goes through this
/// type so the session stays the only writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfilePathCell
{
    name: String,
}

impl ProfilePathCell
{
    pub fn new(name: impl Into<String>) -> Self
    {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str
    {
        &self.name
    }

    /// Currently published path.
    ///
    /// ## Errors
    ///
    /// - `CoverageDisabled`: the variable is unset
    /// - `InvalidConfig`: the value is not valid UTF-8
    pub fn current(&self) -> Result<String>
    {
        match env::var(&self.name) {
            Ok(value) => Ok(value),
            Err(VarError::NotPresent) => Err(CoverageError::CoverageDisabled {
                variable: self.name.clone(),
            }),
            Err(VarError::NotUnicode(raw)) => Err(CoverageError::InvalidConfig(format!(
                "{} is not valid UTF-8: {}",
                self.name,
                raw.to_string_lossy()
            ))),
        }
    }

    /// Publish `path` for the runtime to pick up on its next initialize.
    pub fn publish(&self, path: &Path)
    {
        env::set_var(&self.name, path);
    }
}

impl Default for ProfilePathCell
{
    fn default() -> Self
    {
        Self::new(LLVM_PROFILE_FILE)
    }
}
