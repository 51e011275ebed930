//! Enumeration of the images mapped into the current process.

use std::path::PathBuf;
use std::sync::Mutex;

/// An image (executable or shared library) mapped into this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedImage
{
    pub path: PathBuf,
    /// Difference between the runtime and the link-time addresses
    ///
    /// Stored as the two's complement bit pattern, so negative slides wrap.
    pub slide: u64,
}

impl LoadedImage
{
    /// Runtime address of a symbol declared at `declared` in the on-disk image.
    pub fn runtime_address(&self, declared: u64) -> u64
    {
        declared.wrapping_add(self.slide)
    }
}

/// The loader's image list may change while another thread dlopens, so
/// enumeration is serialized process-wide.
static IMAGE_LOCK: Mutex<()> = Mutex::new(());

/// Snapshot of the images currently loaded into this process.
///
/// Returns an empty list on targets without a supported loader API.
pub fn loaded_images() -> Vec<LoadedImage>
{
    let _guard = IMAGE_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    platform::loaded_images()
}

#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
mod platform
{
    use std::ffi::CStr;
    use std::path::PathBuf;

    use libc::{c_int, c_void, dl_phdr_info, size_t};

    use super::LoadedImage;

    struct Collector
    {
        images: Vec<LoadedImage>,
        seen_main: bool,
    }

    unsafe extern "C" fn collect(info: *mut dl_phdr_info, _size: size_t, data: *mut c_void) -> c_int
    {
        let collector = &mut *data.cast::<Collector>();
        let info = &*info;

        let name = if info.dlpi_name.is_null() {
            &[][..]
        } else {
            CStr::from_ptr(info.dlpi_name).to_bytes()
        };

        // The first entry is the main program and carries no name.
        let path = if name.is_empty() {
            if collector.seen_main {
                return 0;
            }
            collector.seen_main = true;
            match std::env::current_exe() {
                Ok(path) => path,
                Err(_) => return 0,
            }
        } else {
            PathBuf::from(String::from_utf8_lossy(name).into_owned())
        };

        #[allow(clippy::useless_conversion)]
        collector.images.push(LoadedImage {
            path,
            slide: u64::from(info.dlpi_addr),
        });
        0
    }

    pub(super) fn loaded_images() -> Vec<LoadedImage>
    {
        let mut collector = Collector {
            images: Vec::new(),
            seen_main: false,
        };
        // SAFETY: `collect` only touches the collector passed through `data`,
        // which outlives the call.
        unsafe {
            libc::dl_iterate_phdr(Some(collect), std::ptr::addr_of_mut!(collector).cast());
        }
        collector.images
    }
}

#[cfg(target_os = "macos")]
mod platform
{
    use std::ffi::CStr;
    use std::path::PathBuf;

    use super::LoadedImage;

    pub(super) fn loaded_images() -> Vec<LoadedImage>
    {
        // SAFETY: the dyld image APIs are thread-safe for indices below the
        // count, and image names are static C strings owned by dyld.
        unsafe {
            let count = libc::_dyld_image_count();
            let mut images = Vec::with_capacity(count as usize);
            for index in 0..count {
                let name = libc::_dyld_get_image_name(index);
                if name.is_null() {
                    continue;
                }
                let path = PathBuf::from(CStr::from_ptr(name).to_string_lossy().into_owned());
                let slide = libc::_dyld_get_image_vmaddr_slide(index);
                images.push(LoadedImage {
                    path,
                    slide: slide as u64,
                });
            }
            images
        }
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd", target_os = "macos")))]
mod platform
{
    use super::LoadedImage;

    pub(super) fn loaded_images() -> Vec<LoadedImage>
    {
        Vec::new()
    }
}
