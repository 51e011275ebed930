//! Runtime ABI versions of the profile runtime.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoverageError;

/// Bit of the raw profile version marking single-byte (boolean) counters.
///
/// When set, counters hold `0xFF` for "not executed" and `0x00` for
/// "executed", so a reset must fill with `0xFF` instead of zero.
pub const BYTE_COVERAGE_MASK: u64 = 1 << 60;

/// Profile runtime ABI the coverage backend is built against
///
/// Each version carries a different set of counter regions. Newer runtimes add
/// a bitmap region for boolean-branch (MC/DC) coverage that has to be cleared
/// together with the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeAbi
{
    /// Counters and data regions only (LLVM 17 and 18 runtimes)
    Llvm17,
    /// Counters, data and bitmap regions (LLVM 19 and newer runtimes)
    Llvm19,
}

impl RuntimeAbi
{
    /// All known ABIs, oldest first.
    pub const ALL: [RuntimeAbi; 2] = [RuntimeAbi::Llvm17, RuntimeAbi::Llvm19];

    /// Whether counter reset for this ABI needs the bitmap range.
    pub const fn requires_bitmap(self) -> bool
    {
        matches!(self, RuntimeAbi::Llvm19)
    }

    /// LLVM major version the ABI is named after.
    pub const fn llvm_major(self) -> u32
    {
        match self {
            RuntimeAbi::Llvm17 => 17,
            RuntimeAbi::Llvm19 => 19,
        }
    }

    /// Map an LLVM major version to the ABI family it belongs to.
    pub const fn for_llvm_major(major: u32) -> Option<Self>
    {
        match major {
            17 | 18 => Some(RuntimeAbi::Llvm17),
            19.. => Some(RuntimeAbi::Llvm19),
            _ => None,
        }
    }

    /// ABI of the profile runtime linked by the compiler that built this crate.
    ///
    /// Returns `None` when the build script could not determine the compiler's
    /// LLVM version or the version predates every known ABI.
    pub fn compiled_by() -> Option<Self>
    {
        option_env!("LIVECOV_RUSTC_LLVM_MAJOR")
            .and_then(|major| major.parse::<u32>().ok())
            .and_then(Self::for_llvm_major)
    }

    /// Symbol name of the export table inside a backend plugin for this ABI.
    pub fn export_table_symbol(self) -> String
    {
        format!("llvm{}_coverage_library_exports", self.llvm_major())
    }
}

impl fmt::Display for RuntimeAbi
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "llvm{}", self.llvm_major())
    }
}

impl FromStr for RuntimeAbi
{
    type Err = CoverageError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.trim().to_lowercase().as_str() {
            "llvm17" | "17" => Ok(RuntimeAbi::Llvm17),
            "llvm19" | "19" => Ok(RuntimeAbi::Llvm19),
            other => Err(CoverageError::InvalidConfig(format!(
                "unknown runtime ABI: {other}. Use 'llvm17' or 'llvm19'"
            ))),
        }
    }
}
