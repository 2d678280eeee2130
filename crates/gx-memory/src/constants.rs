//! Console memory map constants

/// MEM1 (main RAM) size: 24 MiB on both console generations
pub const MEM1_SIZE: u32 = 0x0180_0000;

/// MEM2 (external RAM) size: 64 MiB, present on the newer generation only
pub const MEM2_SIZE: u32 = 0x0400_0000;

/// MEM1 physical base
pub const MEM1_BASE_PHYS: u32 = 0x0000_0000;

/// MEM2 physical base
pub const MEM2_BASE_PHYS: u32 = 0x1000_0000;

/// MEM1 cached virtual base
pub const MEM1_BASE_CACHED: u32 = 0x8000_0000;

/// MEM1 uncached virtual base
pub const MEM1_BASE_UNCACHED: u32 = 0xC000_0000;

/// MEM2 cached virtual base
pub const MEM2_BASE_CACHED: u32 = 0x9000_0000;

/// MEM2 uncached virtual base
pub const MEM2_BASE_UNCACHED: u32 = 0xD000_0000;
