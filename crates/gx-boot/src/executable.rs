//! Raw executable loading

use crate::dol::DolExecutable;
use crate::elf::{ElfExecutable, ELF_MAGIC};
use crate::symbols::SymbolIndex;
use gx_core::error::LoaderError;
use gx_core::Result;
use gx_memory::MemoryManager;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

/// A parsed raw executable.
///
/// One implementation per on-disk format, chosen by probing at
/// construction time. `load_into_memory` and `load_symbols` are the only
/// operations with side effects and both are idempotent.
pub trait ExecutableReader {
    /// Address execution should begin at
    fn entry_point(&self) -> u32;

    /// Parse succeeded and the format was recognized
    fn is_valid(&self) -> bool;

    /// Console generation this executable targets
    fn is_wii(&self) -> bool;

    /// Copy every loadable segment to its declared address.
    ///
    /// With `only_in_mem1`, segments outside MEM1 are skipped; this is
    /// the constrained path used when MEM2 must be left untouched.
    fn load_into_memory(&self, memory: &Arc<MemoryManager>, only_in_mem1: bool) -> Result<()>;

    /// Best-effort symbol harvest. Returns whether anything was added;
    /// failure only costs debugging conveniences, never the boot.
    fn load_symbols(&self, index: &mut SymbolIndex) -> bool;
}

/// Probe a byte buffer and construct the matching reader
pub fn executable_from_bytes(bytes: Vec<u8>) -> Result<Box<dyn ExecutableReader>> {
    if bytes.len() >= 4 && bytes[0..4] == ELF_MAGIC {
        return Ok(Box::new(ElfExecutable::new(bytes)?));
    }

    match DolExecutable::new(bytes) {
        Ok(dol) => Ok(Box::new(dol)),
        Err(e) => Err(LoaderError::UnknownFormat(format!(
            "no ELF magic and not a plausible DOL ({})",
            e
        ))
        .into()),
    }
}

/// Construct a reader from an already-open file
pub fn executable_from_file(mut file: File) -> Result<Box<dyn ExecutableReader>> {
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    executable_from_bytes(bytes)
}

/// Construct a reader from a path
pub fn open_executable<P: AsRef<Path>>(path: P) -> Result<Box<dyn ExecutableReader>> {
    executable_from_file(File::open(path.as_ref())?)
}

/// Virtual MEM1 window shared by both formats' address validation
pub(crate) fn in_mem1(address: u32, size: u32) -> bool {
    let start = gx_memory::MEM1_BASE_CACHED;
    let end = start + gx_memory::MEM1_SIZE;
    address >= start && size <= end - address
}

/// Virtual MEM2 window
pub(crate) fn in_mem2(address: u32, size: u32) -> bool {
    let start = gx_memory::MEM2_BASE_CACHED;
    let end = start + gx_memory::MEM2_SIZE;
    address >= start && size <= end - address
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_rejects_noise() {
        let result = executable_from_bytes(vec![0xFFu8; 0x400]);
        assert!(result.is_err());

        let result = executable_from_bytes(vec![]);
        assert!(result.is_err());
    }

    #[test]
    fn test_address_windows() {
        assert!(in_mem1(0x8000_3100, 0x100));
        assert!(in_mem1(0x8000_0000, gx_memory::MEM1_SIZE));
        assert!(!in_mem1(0x8000_0000, gx_memory::MEM1_SIZE + 1));
        assert!(!in_mem1(0x9000_0000, 4));

        assert!(in_mem2(0x9000_0000, 4));
        assert!(!in_mem2(0x8000_0000, 4));
    }
}
