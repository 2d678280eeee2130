//! DOL executable parser

use crate::executable::{in_mem1, in_mem2, ExecutableReader};
use crate::symbols::SymbolIndex;
use gx_core::error::LoaderError;
use gx_core::Result;
use gx_memory::MemoryManager;
use std::sync::Arc;
use tracing::{debug, info};

/// Number of text sections a DOL header describes
const NUM_TEXT_SECTIONS: usize = 7;
/// Number of data sections
const NUM_DATA_SECTIONS: usize = 11;
/// Fixed header size; section data follows
const HEADER_SIZE: usize = 0x100;

/// DOL file header
#[derive(Debug, Clone, Default)]
struct DolHeader {
    text_offsets: [u32; NUM_TEXT_SECTIONS],
    data_offsets: [u32; NUM_DATA_SECTIONS],
    text_addresses: [u32; NUM_TEXT_SECTIONS],
    data_addresses: [u32; NUM_DATA_SECTIONS],
    text_sizes: [u32; NUM_TEXT_SECTIONS],
    data_sizes: [u32; NUM_DATA_SECTIONS],
    bss_address: u32,
    bss_size: u32,
    entry_point: u32,
}

/// DOL executable
///
/// The header has no magic word, so validity comes from structural
/// checks: sections inside the file, load addresses inside RAM, and a
/// plausible entry point.
pub struct DolExecutable {
    bytes: Vec<u8>,
    header: DolHeader,
    wii: bool,
}

impl DolExecutable {
    pub fn new(bytes: Vec<u8>) -> std::result::Result<Self, LoaderError> {
        if bytes.len() < HEADER_SIZE {
            return Err(LoaderError::InvalidDol(format!(
                "only {} bytes, header needs 0x{:x}",
                bytes.len(),
                HEADER_SIZE
            )));
        }

        let word = |at: usize| {
            u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
        };

        let mut header = DolHeader::default();
        for i in 0..NUM_TEXT_SECTIONS {
            header.text_offsets[i] = word(i * 4);
            header.text_addresses[i] = word(0x48 + i * 4);
            header.text_sizes[i] = word(0x90 + i * 4);
        }
        for i in 0..NUM_DATA_SECTIONS {
            header.data_offsets[i] = word(0x1C + i * 4);
            header.data_addresses[i] = word(0x64 + i * 4);
            header.data_sizes[i] = word(0xAC + i * 4);
        }
        header.bss_address = word(0xD8);
        header.bss_size = word(0xDC);
        header.entry_point = word(0xE0);

        let dol = Self {
            wii: Self::detect_wii(&header),
            bytes,
            header,
        };
        dol.validate()?;

        info!(
            "DOL parsed: entry=0x{:08x}, {}",
            dol.header.entry_point,
            if dol.wii { "Wii" } else { "GC" }
        );
        Ok(dol)
    }

    /// (offset, address, size) for every non-empty section
    fn sections(&self) -> impl Iterator<Item = (u32, u32, u32)> + '_ {
        let h = &self.header;
        let text = (0..NUM_TEXT_SECTIONS)
            .map(move |i| (h.text_offsets[i], h.text_addresses[i], h.text_sizes[i]));
        let data = (0..NUM_DATA_SECTIONS)
            .map(move |i| (h.data_offsets[i], h.data_addresses[i], h.data_sizes[i]));
        text.chain(data).filter(|&(_, _, size)| size != 0)
    }

    /// Anything targeting the MEM2 window marks the newer generation
    fn detect_wii(header: &DolHeader) -> bool {
        let targets_mem2 = |addr: u32| in_mem2(addr, 1);
        header
            .text_addresses
            .iter()
            .zip(header.text_sizes.iter())
            .chain(header.data_addresses.iter().zip(header.data_sizes.iter()))
            .any(|(&addr, &size)| size != 0 && targets_mem2(addr))
            || targets_mem2(header.entry_point)
    }

    fn validate(&self) -> std::result::Result<(), LoaderError> {
        let entry = self.header.entry_point;
        if entry == 0 || !(in_mem1(entry, 4) || in_mem2(entry, 4)) {
            return Err(LoaderError::InvalidDol(format!(
                "implausible entry point 0x{:08x}",
                entry
            )));
        }

        for (offset, address, size) in self.sections() {
            let file_end = offset
                .checked_add(size)
                .filter(|&end| end as usize <= self.bytes.len());
            if (offset as usize) < HEADER_SIZE || file_end.is_none() {
                return Err(LoaderError::InvalidDol(format!(
                    "section at file offset 0x{:x} (+0x{:x}) leaves the file",
                    offset, size
                )));
            }
            if !(in_mem1(address, size) || in_mem2(address, size)) {
                return Err(LoaderError::InvalidDol(format!(
                    "section load address 0x{:08x} (+0x{:x}) outside RAM",
                    address, size
                )));
            }
        }
        Ok(())
    }
}

impl ExecutableReader for DolExecutable {
    fn entry_point(&self) -> u32 {
        self.header.entry_point
    }

    fn is_valid(&self) -> bool {
        // Construction already validated the header
        true
    }

    fn is_wii(&self) -> bool {
        self.wii
    }

    fn load_into_memory(&self, memory: &Arc<MemoryManager>, only_in_mem1: bool) -> Result<()> {
        for (offset, address, size) in self.sections() {
            if only_in_mem1 && !in_mem1(address, size) {
                debug!(
                    "Skipping section at 0x{:08x}: outside MEM1 on a constrained boot",
                    address
                );
                continue;
            }
            let data = &self.bytes[offset as usize..(offset + size) as usize];
            memory.write_bytes(address, data)?;
        }

        let (bss_addr, bss_size) = (self.header.bss_address, self.header.bss_size);
        let bss_mapped = in_mem1(bss_addr, bss_size) || in_mem2(bss_addr, bss_size);
        if bss_size != 0 && bss_mapped && !(only_in_mem1 && !in_mem1(bss_addr, bss_size)) {
            memory.clear_range(bss_addr, bss_size)?;
        }
        Ok(())
    }

    fn load_symbols(&self, _index: &mut SymbolIndex) -> bool {
        // DOLs carry no symbol information
        false
    }
}
