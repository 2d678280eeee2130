//! Memory management for the oxidized-cube GameCube/Wii emulator
//!
//! This crate provides the emulated physical memory image: 24 MiB of MEM1
//! and 64 MiB of MEM2, addressable through their cached and uncached
//! virtual mirrors as well as physically. All word access is big-endian,
//! matching the emulated PowerPC.

pub mod constants;
pub mod manager;

pub use constants::*;
pub use manager::{MemoryManager, MemoryRegion};
