//! Flat binary images copied verbatim into guest memory.

use std::fs;
use std::path::Path;

use log::info;

use crate::error::EmulationError;
use crate::vm::memory::{Memory, BOOT_ADDR, MEMORY_SIZE};

/// Copies the file at `path` to `load_address`. The image must fit below
/// the 1MB boundary.
pub fn load_binary(memory: &mut Memory, path: impl AsRef<Path>, load_address: usize) -> Result<usize, EmulationError> {
    let path = path.as_ref();
    let data = fs::read(path).map_err(|source| EmulationError::FileNotFound {
        path: path.to_path_buf(),
        source,
    })?;

    let available = MEMORY_SIZE.saturating_sub(load_address);
    if data.len() > available {
        return Err(EmulationError::FileTooLarge {
            size: data.len(),
            available,
        });
    }

    memory.load(load_address, &data);
    info!("Loaded {} ({} bytes) at {:05X}", path.display(), data.len(), load_address);
    Ok(data.len())
}

/// Boot sectors live at 0000:7C00.
pub fn load_boot_sector(memory: &mut Memory, path: impl AsRef<Path>) -> Result<usize, EmulationError> {
    load_binary(memory, path, BOOT_ADDR)
}
