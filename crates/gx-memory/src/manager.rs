//! Memory manager implementation

use crate::constants::*;
use gx_core::error::MemoryError;
use parking_lot::RwLock;
use std::sync::Arc;

/// Memory region descriptor
#[derive(Debug, Clone)]
pub struct MemoryRegion {
    /// Physical base address
    pub base: u32,
    /// Size in bytes
    pub size: u32,
    /// Region name
    pub name: &'static str,
}

/// Which backing store an address resolves into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bank {
    Mem1,
    Mem2,
}

/// Main memory manager for the emulator
///
/// Backs MEM1 and MEM2 with host allocations and resolves physical
/// addresses as well as the cached/uncached virtual mirrors game code
/// uses. Word access is big-endian.
pub struct MemoryManager {
    mem1: RwLock<Vec<u8>>,
    mem2: RwLock<Vec<u8>>,
    regions: Vec<MemoryRegion>,
}

impl MemoryManager {
    /// Create a new memory manager with both banks zeroed
    pub fn new() -> Arc<Self> {
        let regions = vec![
            MemoryRegion {
                base: MEM1_BASE_PHYS,
                size: MEM1_SIZE,
                name: "MEM1",
            },
            MemoryRegion {
                base: MEM2_BASE_PHYS,
                size: MEM2_SIZE,
                name: "MEM2",
            },
        ];

        tracing::debug!(
            "Memory image: MEM1 {} MiB, MEM2 {} MiB",
            MEM1_SIZE >> 20,
            MEM2_SIZE >> 20
        );

        Arc::new(Self {
            mem1: RwLock::new(vec![0u8; MEM1_SIZE as usize]),
            mem2: RwLock::new(vec![0u8; MEM2_SIZE as usize]),
            regions,
        })
    }

    /// Region table for diagnostics
    pub fn regions(&self) -> &[MemoryRegion] {
        &self.regions
    }

    /// Resolve an address (physical or either virtual mirror) to a bank
    /// and byte offset. The full `len` must fit inside the bank.
    fn resolve(&self, addr: u32, len: u32) -> Result<(Bank, usize), MemoryError> {
        let (bank, offset, size) = match addr {
            _ if Self::in_window(addr, MEM1_BASE_PHYS, MEM1_SIZE) => {
                (Bank::Mem1, addr - MEM1_BASE_PHYS, MEM1_SIZE)
            }
            _ if Self::in_window(addr, MEM1_BASE_CACHED, MEM1_SIZE) => {
                (Bank::Mem1, addr - MEM1_BASE_CACHED, MEM1_SIZE)
            }
            _ if Self::in_window(addr, MEM1_BASE_UNCACHED, MEM1_SIZE) => {
                (Bank::Mem1, addr - MEM1_BASE_UNCACHED, MEM1_SIZE)
            }
            _ if Self::in_window(addr, MEM2_BASE_PHYS, MEM2_SIZE) => {
                (Bank::Mem2, addr - MEM2_BASE_PHYS, MEM2_SIZE)
            }
            _ if Self::in_window(addr, MEM2_BASE_CACHED, MEM2_SIZE) => {
                (Bank::Mem2, addr - MEM2_BASE_CACHED, MEM2_SIZE)
            }
            _ if Self::in_window(addr, MEM2_BASE_UNCACHED, MEM2_SIZE) => {
                (Bank::Mem2, addr - MEM2_BASE_UNCACHED, MEM2_SIZE)
            }
            _ => return Err(MemoryError::InvalidAddress(addr)),
        };

        if len != 0 && offset.checked_add(len).map_or(true, |end| end > size) {
            return Err(MemoryError::CrossesRegion { addr, len });
        }

        Ok((bank, offset as usize))
    }

    fn in_window(addr: u32, base: u32, size: u32) -> bool {
        addr >= base && addr - base < size
    }

    /// Read `len` bytes starting at `addr`
    pub fn read_bytes(&self, addr: u32, len: u32) -> Result<Vec<u8>, MemoryError> {
        let (bank, offset) = self.resolve(addr, len)?;
        let guard = match bank {
            Bank::Mem1 => self.mem1.read(),
            Bank::Mem2 => self.mem2.read(),
        };
        Ok(guard[offset..offset + len as usize].to_vec())
    }

    /// Write `data` starting at `addr`
    pub fn write_bytes(&self, addr: u32, data: &[u8]) -> Result<(), MemoryError> {
        let (bank, offset) = self.resolve(addr, data.len() as u32)?;
        let mut guard = match bank {
            Bank::Mem1 => self.mem1.write(),
            Bank::Mem2 => self.mem2.write(),
        };
        guard[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Zero-fill `len` bytes starting at `addr`
    pub fn clear_range(&self, addr: u32, len: u32) -> Result<(), MemoryError> {
        let (bank, offset) = self.resolve(addr, len)?;
        let mut guard = match bank {
            Bank::Mem1 => self.mem1.write(),
            Bank::Mem2 => self.mem2.write(),
        };
        guard[offset..offset + len as usize].fill(0);
        Ok(())
    }

    pub fn read_u8(&self, addr: u32) -> Result<u8, MemoryError> {
        Ok(self.read_bytes(addr, 1)?[0])
    }

    pub fn read_u16(&self, addr: u32) -> Result<u16, MemoryError> {
        let b = self.read_bytes(addr, 2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&self, addr: u32) -> Result<u32, MemoryError> {
        let b = self.read_bytes(addr, 4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u64(&self, addr: u32) -> Result<u64, MemoryError> {
        let b = self.read_bytes(addr, 8)?;
        Ok(u64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    pub fn write_u8(&self, addr: u32, value: u8) -> Result<(), MemoryError> {
        self.write_bytes(addr, &[value])
    }

    pub fn write_u16(&self, addr: u32, value: u16) -> Result<(), MemoryError> {
        self.write_bytes(addr, &value.to_be_bytes())
    }

    pub fn write_u32(&self, addr: u32, value: u32) -> Result<(), MemoryError> {
        self.write_bytes(addr, &value.to_be_bytes())
    }

    pub fn write_u64(&self, addr: u32, value: u64) -> Result<(), MemoryError> {
        self.write_bytes(addr, &value.to_be_bytes())
    }

    /// True if no byte of either bank has been written to a non-zero value.
    /// Used by boot failure tests to assert a failed step left memory alone.
    pub fn is_pristine(&self) -> bool {
        self.mem1.read().iter().all(|&b| b == 0) && self.mem2.read().iter().all(|&b| b == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_access_is_big_endian() {
        let mem = MemoryManager::new();
        mem.write_u32(0x8000_0000, 0x0D15_EA5E).unwrap();
        let bytes = mem.read_bytes(0x8000_0000, 4).unwrap();
        assert_eq!(bytes, [0x0D, 0x15, 0xEA, 0x5E]);
        assert_eq!(mem.read_u32(0x8000_0000).unwrap(), 0x0D15_EA5E);
    }

    #[test]
    fn test_mirrors_alias_the_same_bank() {
        let mem = MemoryManager::new();
        mem.write_u32(0x8000_3100, 0xDEAD_BEEF).unwrap();
        assert_eq!(mem.read_u32(0xC000_3100).unwrap(), 0xDEAD_BEEF);
        assert_eq!(mem.read_u32(0x0000_3100).unwrap(), 0xDEAD_BEEF);

        mem.write_u16(0x9000_0010, 0x1234).unwrap();
        assert_eq!(mem.read_u16(0xD000_0010).unwrap(), 0x1234);
        assert_eq!(mem.read_u16(0x1000_0010).unwrap(), 0x1234);
    }

    #[test]
    fn test_invalid_address() {
        let mem = MemoryManager::new();
        assert!(matches!(
            mem.read_u32(0x7000_0000),
            Err(MemoryError::InvalidAddress(_))
        ));
        assert!(matches!(
            mem.write_u8(0xE000_0000, 1),
            Err(MemoryError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_range_must_stay_in_bank() {
        let mem = MemoryManager::new();
        // Last valid MEM1 byte is fine
        mem.write_u8(0x8000_0000 + MEM1_SIZE - 1, 0xFF).unwrap();
        // A word straddling the end of MEM1 is not
        assert!(matches!(
            mem.write_u32(0x8000_0000 + MEM1_SIZE - 2, 0),
            Err(MemoryError::CrossesRegion { .. })
        ));
    }

    #[test]
    fn test_clear_range() {
        let mem = MemoryManager::new();
        mem.write_bytes(0x8000_1000, &[0xAA; 64]).unwrap();
        mem.clear_range(0x8000_1000, 64).unwrap();
        assert!(mem.read_bytes(0x8000_1000, 64).unwrap().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_pristine_tracking() {
        let mem = MemoryManager::new();
        assert!(mem.is_pristine());
        mem.write_u8(0x8000_0000, 1).unwrap();
        assert!(!mem.is_pristine());
    }
}
