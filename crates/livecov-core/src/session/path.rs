//! # Profile Path Normalization
//!
//! The profile runtime expands placeholder tokens in its output path:
//!
//! - `%c`: continuous mode, counters are mmapped straight into the file
//! - `%m` / `%<N>m`: per-module signature (with an `N`-file merge pool)
//! - `%p`, `%h`, `%t`: process id, host name, temp dir (left as is)
//!
//! Every window rotates the output file, which continuous mode cannot follow,
//! so `%c` is removed. Without a per-module token all instrumented images of
//! the process would write the same file and clobber each other's header, so
//! one is added.

/// Result of [`normalize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedPath
{
    pub path: String,
    /// The path differs from the requested one
    pub changed: bool,
    /// The requested path enabled continuous mode
    pub continuous: bool,
}

const CONTINUOUS_TOKEN: &str = "%c";
const MODULE_TOKEN: &str = "%m";

/// Normalize a requested profile path.
///
/// ```rust
/// use livecov_core::session::path::normalize;
///
/// assert_eq!(normalize("cov.profraw").path, "cov%m.profraw");
/// assert_eq!(normalize("cov%c.profraw").path, "cov%m.profraw");
/// assert!(!normalize("cov%m.profraw").changed);
/// ```
pub fn normalize(requested: &str) -> NormalizedPath
{
    let mut path = requested.replace(CONTINUOUS_TOKEN, "");
    let continuous = path.len() != requested.len();

    if !has_module_token(&path) {
        let file_start = path.rfind(['/', '\\']).map_or(0, |index| index + 1);
        let dot = path[file_start..].rfind('.');
        match dot {
            Some(dot) if dot > 0 => path.insert_str(file_start + dot, MODULE_TOKEN),
            _ => path.push_str(MODULE_TOKEN),
        }
    }

    NormalizedPath {
        changed: path != requested,
        continuous,
        path,
    }
}

/// Whether `path` contains `%m` or `%<digits>m`.
pub fn has_module_token(path: &str) -> bool
{
    let bytes = path.as_bytes();
    bytes.iter().enumerate().any(|(index, byte)| {
        if *byte != b'%' {
            return false;
        }
        let rest = &bytes[index + 1..];
        let digits = rest.iter().take_while(|b| b.is_ascii_digit()).count();
        rest.get(digits) == Some(&b'm')
    })
}
