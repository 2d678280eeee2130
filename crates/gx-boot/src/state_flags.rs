//! Persistent boot-state flags
//!
//! Real system software keeps a small bookkeeping record on the NAND and
//! consults it across boots. The record is fixed-layout with a checksum;
//! a missing or corrupt record is silently replaced by the default, since
//! losing this bookkeeping must never block a boot.

use gx_core::error::NandError;
use gx_nand::NandFs;
use tracing::{debug, warn};

/// NAND path of the record (inside the system menu's data directory)
pub const STATE_FILE_PATH: &str = "/title/00000001/00000002/data/state.dat";

/// Serialized size of the record
pub const STATE_FLAGS_SIZE: usize = 32;

/// `type` values the boot path writes
pub mod state_type {
    /// Return-to-menu bookkeeping
    pub const RETURN: u8 = 0x03;
    /// A title launched straight from the NAND
    pub const NANDBOOT: u8 = 0x04;
}

/// `discstate` values
pub mod disc_state {
    pub const NONE: u8 = 0x00;
    /// A game disc is inserted and readable
    pub const INSERTED: u8 = 0x01;
}

/// The boot-state record
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StateFlags {
    pub checksum: u32,
    pub flags: u8,
    pub typ: u8,
    pub discstate: u8,
    pub returnto: u8,
    pub unknown: [u32; 6],
}

impl StateFlags {
    /// Serialize big-endian, fixed layout
    pub fn to_bytes(&self) -> [u8; STATE_FLAGS_SIZE] {
        let mut out = [0u8; STATE_FLAGS_SIZE];
        out[0..4].copy_from_slice(&self.checksum.to_be_bytes());
        out[4] = self.flags;
        out[5] = self.typ;
        out[6] = self.discstate;
        out[7] = self.returnto;
        for (i, word) in self.unknown.iter().enumerate() {
            out[8 + i * 4..12 + i * 4].copy_from_slice(&word.to_be_bytes());
        }
        out
    }

    /// Parse a serialized record; `None` if the size is wrong
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() != STATE_FLAGS_SIZE {
            return None;
        }
        let word = |at: usize| u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]]);
        let mut unknown = [0u32; 6];
        for (i, slot) in unknown.iter_mut().enumerate() {
            *slot = word(8 + i * 4);
        }
        Some(Self {
            checksum: word(0),
            flags: data[4],
            typ: data[5],
            discstate: data[6],
            returnto: data[7],
            unknown,
        })
    }

    /// Checksum over every word after the checksum field
    pub fn compute_checksum(&self) -> u32 {
        let bytes = self.to_bytes();
        bytes[4..]
            .chunks_exact(4)
            .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .fold(0u32, |acc, w| acc.wrapping_add(w))
    }

    /// Recompute and store the checksum
    pub fn update_checksum(&mut self) {
        self.checksum = self.compute_checksum();
    }

    /// Stored checksum matches the content
    pub fn is_consistent(&self) -> bool {
        self.checksum == self.compute_checksum()
    }
}

/// Read the record from the NAND, substituting the default when the file
/// is absent, the wrong size, or fails its checksum.
pub fn read_state_flags(nand: &NandFs) -> StateFlags {
    match nand.read_file(STATE_FILE_PATH) {
        Ok(data) => match StateFlags::from_bytes(&data) {
            Some(state) if state.is_consistent() => state,
            _ => {
                warn!("State flags corrupt, using defaults");
                default_state()
            }
        },
        Err(_) => {
            debug!("No state flags on the NAND, using defaults");
            default_state()
        }
    }
}

fn default_state() -> StateFlags {
    let mut state = StateFlags::default();
    state.update_checksum();
    state
}

/// Read-modify-write of the record.
///
/// Loads the current record (or the default), lets the caller mutate any
/// subset of fields, recomputes the checksum, and persists the result.
/// Single-writer access is guaranteed by the surrounding system, not
/// enforced here.
pub fn update_state_flags<F>(nand: &NandFs, update: F) -> Result<(), NandError>
where
    F: FnOnce(&mut StateFlags),
{
    let mut state = read_state_flags(nand);
    update(&mut state);
    state.update_checksum();
    nand.write_file(STATE_FILE_PATH, &state.to_bytes())
}
