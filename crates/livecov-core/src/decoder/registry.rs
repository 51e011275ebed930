//! Process-wide cache of backend export handles, one per runtime ABI.
//!
//! The cache holds weak references only. A backend stays loaded while at least
//! one session uses it and is released when the last handle drops. The next
//! [`acquire`] for that ABI loads it again.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use once_cell::sync::Lazy;
use tracing::debug;

use super::CoverageExports;
use crate::error::{CoverageError, Result};
use crate::runtime::abi::RuntimeAbi;

static CACHE: Lazy<Mutex<HashMap<RuntimeAbi, Weak<dyn CoverageExports>>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// Shared export handle for `abi`, loading it through `loader` on a miss.
///
/// The cache lock is held while `loader` runs, so concurrent first uses of
/// the same ABI load the backend once.
///
/// ## Errors
///
/// - whatever `loader` returns
/// - `BackendUnavailable`: the loader produced a handle for a different ABI
pub fn acquire<F>(abi: RuntimeAbi, loader: F) -> Result<Arc<dyn CoverageExports>>
where
    F: FnOnce(RuntimeAbi) -> Result<Arc<dyn CoverageExports>>,
{
    let mut cache = CACHE.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(exports) = cache.get(&abi).and_then(Weak::upgrade) {
        return Ok(exports);
    }

    let exports = loader(abi)?;
    if exports.abi() != abi {
        return Err(CoverageError::BackendUnavailable(format!(
            "loader returned a {} backend for {abi}",
            exports.abi()
        )));
    }
    debug!(%abi, version = %exports.runtime_version(), "loaded coverage backend");
    cache.insert(abi, Arc::downgrade(&exports));
    Ok(exports)
}

/// Whether a live handle for `abi` is cached.
pub fn is_loaded(abi: RuntimeAbi) -> bool
{
    CACHE
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&abi)
        .is_some_and(|exports| exports.strong_count() > 0)
}
