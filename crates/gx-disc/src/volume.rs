//! Disc volume abstraction and flat-image implementation

use crate::region::Region;
use gx_core::error::DiscError;
use parking_lot::Mutex;
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::Path;
use tracing::{debug, info};

/// Magic word found at offset 0x1C of a GC disc header
pub const GC_DISC_MAGIC: u32 = 0xC233_9F3D;

/// Magic word found at offset 0x18 of a Wii disc header
pub const WII_DISC_MAGIC: u32 = 0x5D1C_9EA3;

/// Bytes of the disc header cached at open time
const HEADER_SIZE: usize = 0x20;

/// A partition of the disc address space.
///
/// GC discs are flat and use [`Partition::NONE`]. Wii images address the
/// game data through a partition whose base offset the container parser
/// (out of scope here) discovers; flat images expose it at offset zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    offset: Option<u64>,
}

impl Partition {
    /// Whole-disc addressing
    pub const NONE: Partition = Partition { offset: None };

    pub fn new(offset: u64) -> Self {
        Self { offset: Some(offset) }
    }

    pub fn offset(&self) -> u64 {
        self.offset.unwrap_or(0)
    }
}

/// Read-only disc volume
///
/// All reads are bounded: a request past the end of the addressable range
/// fails outright rather than short-reading.
pub trait Volume {
    /// Read `length` bytes at `offset` within `partition`
    fn read(&self, offset: u64, length: u32, partition: Partition) -> Result<Vec<u8>, DiscError>;

    /// Addressable size in bytes
    fn size(&self) -> u64;

    /// Console generation this disc targets
    fn is_wii(&self) -> bool;

    /// 6-character game ID from the header
    fn game_id(&self) -> String;

    /// Region derived from the game ID country code
    fn region(&self) -> Region {
        Region::from_game_id(&self.game_id())
    }

    /// Partition holding the game data and apploader
    fn game_partition(&self) -> Partition {
        if self.is_wii() {
            Partition::new(0)
        } else {
            Partition::NONE
        }
    }
}

trait ReadSeek: Read + Seek + Send {}
impl<T: Read + Seek + Send> ReadSeek for T {}

/// Flat (uncompressed) disc image
pub struct DiscVolume {
    reader: Mutex<Box<dyn ReadSeek>>,
    header: [u8; HEADER_SIZE],
    size: u64,
    wii: bool,
}

impl DiscVolume {
    /// Open a disc image file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, DiscError> {
        let file = File::open(path.as_ref())
            .map_err(|_| DiscError::NotADisc(path.as_ref().display().to_string()))?;
        let volume = Self::from_file(file)?;
        info!(
            "Opened disc image {:?}: id={}, {}",
            path.as_ref(),
            volume.game_id(),
            if volume.wii { "Wii" } else { "GC" }
        );
        Ok(volume)
    }

    /// Use an already-open image file
    pub fn from_file(file: File) -> Result<Self, DiscError> {
        Self::new(Box::new(BufReader::new(file)))
    }

    /// Use an in-memory image
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, DiscError> {
        Self::new(Box::new(Cursor::new(bytes)))
    }

    fn new(mut reader: Box<dyn ReadSeek>) -> Result<Self, DiscError> {
        let size = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;

        let mut header = [0u8; HEADER_SIZE];
        if size < HEADER_SIZE as u64 {
            return Err(DiscError::NotADisc(format!(
                "image is only {} bytes, too small for a disc header",
                size
            )));
        }
        reader.read_exact(&mut header)?;

        let wii_word = u32::from_be_bytes([header[0x18], header[0x19], header[0x1A], header[0x1B]]);
        let gc_word = u32::from_be_bytes([header[0x1C], header[0x1D], header[0x1E], header[0x1F]]);

        let wii = match (wii_word, gc_word) {
            (WII_DISC_MAGIC, _) => true,
            (_, GC_DISC_MAGIC) => false,
            _ => {
                return Err(DiscError::NotADisc(format!(
                    "no disc magic word (0x18=0x{:08x}, 0x1c=0x{:08x})",
                    wii_word, gc_word
                )))
            }
        };

        debug!("Disc header probed: wii={}, size=0x{:x}", wii, size);

        Ok(Self {
            reader: Mutex::new(reader),
            header,
            size,
            wii,
        })
    }
}

impl Volume for DiscVolume {
    fn read(&self, offset: u64, length: u32, partition: Partition) -> Result<Vec<u8>, DiscError> {
        let absolute = partition.offset() + offset;
        let end = absolute
            .checked_add(length as u64)
            .ok_or(DiscError::ReadOutOfBounds {
                offset,
                length,
                size: self.size,
            })?;
        if end > self.size {
            return Err(DiscError::ReadOutOfBounds {
                offset,
                length,
                size: self.size,
            });
        }

        let mut reader = self.reader.lock();
        reader.seek(SeekFrom::Start(absolute))?;
        let mut data = vec![0u8; length as usize];
        reader.read_exact(&mut data)?;
        Ok(data)
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn is_wii(&self) -> bool {
        self.wii
    }

    fn game_id(&self) -> String {
        String::from_utf8_lossy(&self.header[0..6]).to_string()
    }
}

/// Probe a path as a disc image.
///
/// Fails with [`DiscError::NotADisc`] when the header carries neither
/// magic word; the caller falls through to the next classification step.
pub fn open_volume<P: AsRef<Path>>(path: P) -> Result<DiscVolume, DiscError> {
    DiscVolume::from_path(path)
}
