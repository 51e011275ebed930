//! Symbol lookup in on-disk images.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use object::{BinaryFormat, Object, ObjectSymbol};

use super::image::LoadedImage;
use crate::error::{CoverageError, Result};

/// Runtime addresses of a set of symbols in one loaded image
///
/// Names are stored in their C spelling. The extra leading underscore that
/// Mach-O adds to every C symbol is stripped while reading.
#[derive(Debug, Default, Clone)]
pub struct SymbolTable
{
    addresses: HashMap<String, u64>,
}

impl SymbolTable
{
    /// Parse `image` from disk and collect the runtime addresses of `wanted`.
    ///
    /// The static symbol table is searched first and the dynamic one fills the
    /// gaps. Only defined symbols count. Names absent from both tables are
    /// simply missing from the result.
    ///
    /// ## Errors
    ///
    /// - `Io`: the image file could not be read
    /// - `SymbolResolutionFailed`: the file is not an object format we can parse
    pub fn load(image: &LoadedImage, wanted: &[&str]) -> Result<Self>
    {
        let bytes = fs::read(&image.path)?;
        let file = object::File::parse(&*bytes).map_err(|err| {
            CoverageError::SymbolResolutionFailed(format!("failed to parse {}: {err}", image.path.display()))
        })?;
        Ok(Self::from_object(&file, image, wanted))
    }

    fn from_object<'data>(file: &object::File<'data>, image: &LoadedImage, wanted: &[&str]) -> Self
    {
        let mach_o = file.format() == BinaryFormat::MachO;
        let mut addresses = HashMap::with_capacity(wanted.len());

        for symbol in file.symbols().chain(file.dynamic_symbols()) {
            if symbol.is_undefined() || symbol.address() == 0 {
                continue;
            }
            let Ok(name) = symbol.name() else {
                continue;
            };
            let name = if mach_o { name.strip_prefix('_').unwrap_or(name) } else { name };
            if !wanted.contains(&name) || addresses.contains_key(name) {
                continue;
            }
            addresses.insert(name.to_string(), image.runtime_address(symbol.address()));
            if addresses.len() == wanted.len() {
                break;
            }
        }

        SymbolTable { addresses }
    }

    /// Runtime address of `name`, if it was found.
    pub fn address(&self, name: &str) -> Option<u64>
    {
        self.addresses.get(name).copied()
    }

    pub fn len(&self) -> usize
    {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.addresses.is_empty()
    }
}

/// Whether `path` looks like a file the loader mapped from disk.
pub(crate) fn is_on_disk(path: &Path) -> bool
{
    path.is_absolute() && path.is_file()
}
