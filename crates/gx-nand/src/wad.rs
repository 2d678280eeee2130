//! Installable-title (WAD) container support
//!
//! A WAD bundles a ticket, TMD, and encrypted contents. Installing one
//! decrypts and verifies each content and lays the title out on the NAND
//! the way system software expects it.

use crate::fs::NandFs;
use crate::titles::{
    self, be32, be64, ContentRecord, Tmd, CONTENT_RECORD_SIZE, TMD_BOOT_INDEX, TMD_CONTENTS,
    TMD_NUM_CONTENTS, TMD_TITLE_ID,
};
use aes::cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use gx_core::error::NandError;
use sha1::{Digest, Sha1};
use tracing::{debug, info, warn};

type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;

/// Installable-title container type ("Is")
pub const WAD_TYPE_IS: u32 = 0x4973_0000;
/// Boot2 container type ("ib"); recognized but not installable here
pub const WAD_TYPE_IB: u32 = 0x6962_0000;

/// Fixed size of the container header
const WAD_HEADER_SIZE: u32 = 0x20;
/// Sections are aligned to this boundary
const SECTION_ALIGN: u64 = 0x40;

/// Size of a ticket
const TICKET_SIZE: usize = 0x2A4;
/// Offset of the encrypted title key inside the ticket
const TICKET_TITLE_KEY: usize = 0x1BF;
/// Offset of the title ID inside the ticket
const TICKET_TITLE_ID: usize = 0x1DC;

/// The common key used to wrap title keys is console DRM material and is
/// not distributable; it ships zeroed. Fixtures produced by [`WadBuilder`]
/// use the same zero key, so round-trips work in tests.
const COMMON_KEY: [u8; 16] = [0u8; 16];

fn align_section(offset: u64) -> u64 {
    (offset + SECTION_ALIGN - 1) & !(SECTION_ALIGN - 1)
}

fn align_block(len: u64) -> u64 {
    (len + 15) & !15
}

fn aes_cbc_decrypt(key: &[u8; 16], iv: &[u8; 16], data: &[u8]) -> Result<Vec<u8>, NandError> {
    if data.len() % 16 != 0 {
        return Err(NandError::InvalidWad(format!(
            "encrypted blob length {} is not block-aligned",
            data.len()
        )));
    }
    let mut buf = data.to_vec();
    Aes128CbcDec::new(key.into(), iv.into())
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .map_err(|_| NandError::InvalidWad("AES-CBC decryption failed".to_string()))?;
    Ok(buf)
}

fn aes_cbc_encrypt(key: &[u8; 16], iv: &[u8; 16], data: &[u8]) -> Result<Vec<u8>, NandError> {
    let mut buf = data.to_vec();
    buf.resize(align_block(buf.len() as u64) as usize, 0);
    let len = buf.len();
    Aes128CbcEnc::new(key.into(), iv.into())
        .encrypt_padded_mut::<NoPadding>(&mut buf, len)
        .map_err(|_| NandError::InvalidWad("AES-CBC encryption failed".to_string()))?;
    Ok(buf)
}

/// IV for the title key: the title ID followed by zeros
fn title_key_iv(title_id: u64) -> [u8; 16] {
    let mut iv = [0u8; 16];
    iv[0..8].copy_from_slice(&title_id.to_be_bytes());
    iv
}

/// IV for a content blob: the content index followed by zeros
fn content_iv(index: u16) -> [u8; 16] {
    let mut iv = [0u8; 16];
    iv[0..2].copy_from_slice(&index.to_be_bytes());
    iv
}

/// Parsed WAD container
pub struct WadFile {
    bytes: Vec<u8>,
    cert_size: u32,
    ticket_size: u32,
    tmd_size: u32,
    data_size: u32,
}

impl WadFile {
    /// Open a container file
    pub fn open<P: AsRef<std::path::Path>>(path: P) -> Result<Self, NandError> {
        let bytes = std::fs::read(path.as_ref())?;
        Self::from_bytes(bytes)
    }

    /// Parse an in-memory container
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, NandError> {
        if !Self::is_wad(&bytes) {
            return Err(NandError::InvalidWad(
                "missing container header".to_string(),
            ));
        }

        let wad = Self {
            cert_size: be32(&bytes, 0x08),
            ticket_size: be32(&bytes, 0x10),
            tmd_size: be32(&bytes, 0x14),
            data_size: be32(&bytes, 0x18),
            bytes,
        };

        // All sections must land inside the file
        let end = wad.data_offset() + wad.data_size as u64;
        if end > wad.bytes.len() as u64 {
            return Err(NandError::InvalidWad(format!(
                "sections end at 0x{:x} but container is 0x{:x} bytes",
                end,
                wad.bytes.len()
            )));
        }
        if wad.ticket_size as usize != TICKET_SIZE {
            return Err(NandError::InvalidWad(format!(
                "unexpected ticket size 0x{:x}",
                wad.ticket_size
            )));
        }

        Ok(wad)
    }

    /// Quick header probe, without validating the section layout
    pub fn is_wad(data: &[u8]) -> bool {
        if data.len() < WAD_HEADER_SIZE as usize {
            return false;
        }
        let header_size = be32(data, 0);
        let wad_type = be32(data, 4);
        header_size == WAD_HEADER_SIZE && (wad_type == WAD_TYPE_IS || wad_type == WAD_TYPE_IB)
    }

    fn ticket_offset(&self) -> u64 {
        align_section(align_section(WAD_HEADER_SIZE as u64) + self.cert_size as u64)
    }

    fn tmd_offset(&self) -> u64 {
        align_section(self.ticket_offset() + self.ticket_size as u64)
    }

    fn data_offset(&self) -> u64 {
        align_section(self.tmd_offset() + self.tmd_size as u64)
    }

    fn ticket(&self) -> &[u8] {
        let at = self.ticket_offset() as usize;
        &self.bytes[at..at + self.ticket_size as usize]
    }

    fn tmd_bytes(&self) -> &[u8] {
        let at = self.tmd_offset() as usize;
        &self.bytes[at..at + self.tmd_size as usize]
    }

    /// Title metadata carried by the container
    pub fn tmd(&self) -> Result<Tmd, NandError> {
        Tmd::parse(self.tmd_bytes())
    }

    /// Title ID from the ticket
    pub fn title_id(&self) -> u64 {
        be64(self.ticket(), TICKET_TITLE_ID)
    }

    /// Unwrap the title key with the common key
    fn title_key(&self) -> Result<[u8; 16], NandError> {
        let ticket = self.ticket();
        let encrypted = &ticket[TICKET_TITLE_KEY..TICKET_TITLE_KEY + 16];
        let plain = aes_cbc_decrypt(&COMMON_KEY, &title_key_iv(self.title_id()), encrypted)?;
        let mut key = [0u8; 16];
        key.copy_from_slice(&plain[0..16]);
        Ok(key)
    }

    /// Decrypt and verify one content blob
    fn decrypt_content(
        &self,
        title_key: &[u8; 16],
        record: &ContentRecord,
        offset: u64,
    ) -> Result<Vec<u8>, NandError> {
        let encrypted_len = align_block(record.size);
        let start = offset as usize;
        let end = start + encrypted_len as usize;
        if end > self.bytes.len() {
            return Err(NandError::InvalidWad(format!(
                "content {} extends past the container",
                record.index
            )));
        }

        let mut plain = aes_cbc_decrypt(title_key, &content_iv(record.index), &self.bytes[start..end])?;
        plain.truncate(record.size as usize);

        let digest: [u8; 20] = Sha1::digest(&plain).into();
        if digest != record.hash {
            warn!("Content {} hash mismatch", record.index);
            return Err(NandError::ContentHashMismatch {
                index: record.index,
            });
        }

        Ok(plain)
    }

    /// Install the title onto the NAND.
    ///
    /// Writes the ticket, the TMD, and every verified content, and
    /// creates the title's data directory. Returns the installed title ID.
    pub fn install(&self, nand: &NandFs) -> Result<u64, NandError> {
        let tmd = self.tmd()?;
        let title_id = self.title_id();
        if tmd.title_id != title_id {
            return Err(NandError::InvalidWad(format!(
                "ticket is for {:016x} but TMD is for {:016x}",
                title_id, tmd.title_id
            )));
        }

        let title_key = self.title_key()?;
        info!(
            "Installing title {:016x} ({} contents)",
            title_id,
            tmd.contents.len()
        );

        let mut offset = self.data_offset();
        for record in &tmd.contents {
            let plain = self.decrypt_content(&title_key, record, offset)?;
            offset = align_section(offset + align_block(record.size));

            let path = format!("{}/{:08x}.app", titles::content_dir(title_id), record.id);
            nand.write_file(&path, &plain)?;
            debug!(
                "Installed content {:08x}.app (index {}, {} bytes)",
                record.id, record.index, record.size
            );
        }

        nand.write_file(&titles::tmd_path(title_id), tmd.raw())?;
        nand.write_file(&titles::ticket_path(title_id), self.ticket())?;
        nand.create_dir_all(&titles::data_dir(title_id))?;

        Ok(title_id)
    }
}

/// Builds a syntactically valid container around plaintext contents.
///
/// Contents and the title key are encrypted under the zeroed common key
/// chain, mirroring what [`WadFile`] expects. Used to generate fixtures.
pub struct WadBuilder {
    title_id: u64,
    title_key: [u8; 16],
    boot_index: u16,
    contents: Vec<(u32, u16, Vec<u8>)>,
}

impl WadBuilder {
    pub fn new(title_id: u64) -> Self {
        Self {
            title_id,
            title_key: [0x5A; 16],
            boot_index: 0,
            contents: Vec::new(),
        }
    }

    pub fn title_key(mut self, key: [u8; 16]) -> Self {
        self.title_key = key;
        self
    }

    pub fn boot_index(mut self, index: u16) -> Self {
        self.boot_index = index;
        self
    }

    /// Add a content blob with the given ID and index
    pub fn content(mut self, id: u32, index: u16, data: &[u8]) -> Self {
        self.contents.push((id, index, data.to_vec()));
        self
    }

    fn build_tmd(&self) -> Vec<u8> {
        let mut tmd = vec![0u8; TMD_CONTENTS + self.contents.len() * CONTENT_RECORD_SIZE];
        tmd[TMD_TITLE_ID..TMD_TITLE_ID + 8].copy_from_slice(&self.title_id.to_be_bytes());
        tmd[TMD_NUM_CONTENTS..TMD_NUM_CONTENTS + 2]
            .copy_from_slice(&(self.contents.len() as u16).to_be_bytes());
        tmd[TMD_BOOT_INDEX..TMD_BOOT_INDEX + 2].copy_from_slice(&self.boot_index.to_be_bytes());

        for (i, (id, index, data)) in self.contents.iter().enumerate() {
            let hash: [u8; 20] = Sha1::digest(data).into();
            let at = TMD_CONTENTS + i * CONTENT_RECORD_SIZE;
            tmd[at..at + 4].copy_from_slice(&id.to_be_bytes());
            tmd[at + 4..at + 6].copy_from_slice(&index.to_be_bytes());
            tmd[at + 6..at + 8].copy_from_slice(&1u16.to_be_bytes());
            tmd[at + 8..at + 16].copy_from_slice(&(data.len() as u64).to_be_bytes());
            tmd[at + 16..at + 36].copy_from_slice(&hash);
        }
        tmd
    }

    fn build_ticket(&self) -> Result<Vec<u8>, NandError> {
        let mut ticket = vec![0u8; TICKET_SIZE];
        let wrapped = aes_cbc_encrypt(&COMMON_KEY, &title_key_iv(self.title_id), &self.title_key)?;
        ticket[TICKET_TITLE_KEY..TICKET_TITLE_KEY + 16].copy_from_slice(&wrapped[0..16]);
        ticket[TICKET_TITLE_ID..TICKET_TITLE_ID + 8]
            .copy_from_slice(&self.title_id.to_be_bytes());
        Ok(ticket)
    }

    pub fn build(self) -> Result<Vec<u8>, NandError> {
        let ticket = self.build_ticket()?;
        let tmd = self.build_tmd();

        let mut data = Vec::new();
        for (_, index, plain) in &self.contents {
            let encrypted = aes_cbc_encrypt(&self.title_key, &content_iv(*index), plain)?;
            data.extend_from_slice(&encrypted);
            data.resize(align_section(data.len() as u64) as usize, 0);
        }

        let mut wad = Vec::new();
        wad.extend_from_slice(&WAD_HEADER_SIZE.to_be_bytes());
        wad.extend_from_slice(&WAD_TYPE_IS.to_be_bytes());
        wad.extend_from_slice(&0u32.to_be_bytes()); // no cert chain
        wad.extend_from_slice(&0u32.to_be_bytes());
        wad.extend_from_slice(&(ticket.len() as u32).to_be_bytes());
        wad.extend_from_slice(&(tmd.len() as u32).to_be_bytes());
        wad.extend_from_slice(&(data.len() as u32).to_be_bytes());
        wad.extend_from_slice(&0u32.to_be_bytes()); // no footer

        for section in [&ticket, &tmd, &data] {
            wad.resize(align_section(wad.len() as u64) as usize, 0);
            wad.extend_from_slice(section);
        }

        Ok(wad)
    }
}
