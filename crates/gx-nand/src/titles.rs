//! Installed-title layout and TMD handling

use crate::fs::NandFs;
use gx_core::error::NandError;
use tracing::{debug, info};

/// Title ID of the system menu
pub const SYSTEM_MENU_TITLE_ID: u64 = 0x0000_0001_0000_0002;

/// Offset of the title ID inside a TMD
pub(crate) const TMD_TITLE_ID: usize = 0x18C;
/// Offset of the content count
pub(crate) const TMD_NUM_CONTENTS: usize = 0x1DE;
/// Offset of the boot content index
pub(crate) const TMD_BOOT_INDEX: usize = 0x1E0;
/// Offset of the first content record
pub(crate) const TMD_CONTENTS: usize = 0x1E4;
/// Size of one content record
pub(crate) const CONTENT_RECORD_SIZE: usize = 36;

pub(crate) fn be16(bytes: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([bytes[at], bytes[at + 1]])
}

pub(crate) fn be32(bytes: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

pub(crate) fn be64(bytes: &[u8], at: usize) -> u64 {
    u64::from_be_bytes([
        bytes[at],
        bytes[at + 1],
        bytes[at + 2],
        bytes[at + 3],
        bytes[at + 4],
        bytes[at + 5],
        bytes[at + 6],
        bytes[at + 7],
    ])
}

/// Upper half of a title ID
pub fn title_hi(title_id: u64) -> u32 {
    (title_id >> 32) as u32
}

/// Lower half of a title ID
pub fn title_lo(title_id: u64) -> u32 {
    title_id as u32
}

/// `/title/<hi>/<lo>/content`
pub fn content_dir(title_id: u64) -> String {
    format!(
        "/title/{:08x}/{:08x}/content",
        title_hi(title_id),
        title_lo(title_id)
    )
}

/// `/title/<hi>/<lo>/data`
pub fn data_dir(title_id: u64) -> String {
    format!(
        "/title/{:08x}/{:08x}/data",
        title_hi(title_id),
        title_lo(title_id)
    )
}

/// Virtual path of an installed title's TMD
pub fn tmd_path(title_id: u64) -> String {
    format!("{}/title.tmd", content_dir(title_id))
}

/// Virtual path of a title's ticket
pub fn ticket_path(title_id: u64) -> String {
    format!(
        "/ticket/{:08x}/{:08x}.tik",
        title_hi(title_id),
        title_lo(title_id)
    )
}

/// One content record of a TMD
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRecord {
    pub id: u32,
    pub index: u16,
    pub content_type: u16,
    pub size: u64,
    pub hash: [u8; 20],
}

/// Parsed title metadata
///
/// Only the fields the boot and install paths consume; signature data is
/// carried opaquely in `raw`.
#[derive(Debug, Clone)]
pub struct Tmd {
    pub title_id: u64,
    pub boot_index: u16,
    pub contents: Vec<ContentRecord>,
    raw: Vec<u8>,
}

impl Tmd {
    /// Parse a big-endian TMD blob
    pub fn parse(data: &[u8]) -> Result<Self, NandError> {
        if data.len() < TMD_CONTENTS {
            return Err(NandError::InvalidTmd(format!(
                "truncated header: {} bytes",
                data.len()
            )));
        }

        let title_id = be64(data, TMD_TITLE_ID);
        let num_contents = be16(data, TMD_NUM_CONTENTS);
        let boot_index = be16(data, TMD_BOOT_INDEX);

        let needed = TMD_CONTENTS + num_contents as usize * CONTENT_RECORD_SIZE;
        if data.len() < needed {
            return Err(NandError::InvalidTmd(format!(
                "{} content records claimed but only {} bytes present",
                num_contents,
                data.len()
            )));
        }

        let mut contents = Vec::with_capacity(num_contents as usize);
        for i in 0..num_contents as usize {
            let at = TMD_CONTENTS + i * CONTENT_RECORD_SIZE;
            let mut hash = [0u8; 20];
            hash.copy_from_slice(&data[at + 16..at + 36]);
            contents.push(ContentRecord {
                id: be32(data, at),
                index: be16(data, at + 4),
                content_type: be16(data, at + 6),
                size: be64(data, at + 8),
                hash,
            });
        }

        debug!(
            "TMD parsed: title={:016x}, {} contents, boot index {}",
            title_id, num_contents, boot_index
        );

        Ok(Self {
            title_id,
            boot_index,
            contents,
            raw: data.to_vec(),
        })
    }

    /// The content record execution starts from
    pub fn boot_content(&self) -> Result<&ContentRecord, NandError> {
        self.contents
            .iter()
            .find(|c| c.index == self.boot_index)
            .ok_or_else(|| {
                NandError::InvalidTmd(format!("boot index {} has no record", self.boot_index))
            })
    }

    /// Raw TMD bytes as stored on the NAND
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }
}

/// Read the boot content of an installed title
pub fn load_boot_content(nand: &NandFs, title_id: u64) -> Result<Vec<u8>, NandError> {
    let tmd_bytes = nand
        .read_file(&tmd_path(title_id))
        .map_err(|_| NandError::TitleNotInstalled(title_id))?;
    let tmd = Tmd::parse(&tmd_bytes)?;
    let record = tmd.boot_content()?;

    let path = format!("{}/{:08x}.app", content_dir(title_id), record.id);
    info!(
        "Loading boot content {:08x}.app of title {:016x}",
        record.id, title_id
    );
    nand.read_file(&path)
}

/// Create title directories for the system menu (if needed).
///
/// Normally the install of the system menu does this, but no system title
/// is required to be installed here, so the boot path ensures the
/// directories itself. Idempotent.
pub fn create_system_menu_title_dirs(nand: &NandFs) -> Result<(), NandError> {
    nand.create_dir_all(&content_dir(SYSTEM_MENU_TITLE_ID))?;
    nand.create_dir_all(&data_dir(SYSTEM_MENU_TITLE_ID))?;
    Ok(())
}
