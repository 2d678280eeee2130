//! Error types for the oxidized-cube emulator

use thiserror::Error;

/// Main error type for the emulator
#[derive(Error, Debug)]
pub enum EmulatorError {
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("Disc error: {0}")]
    Disc(#[from] DiscError),

    #[error("NAND error: {0}")]
    Nand(#[from] NandError),

    #[error("Loader error: {0}")]
    Loader(#[from] LoaderError),

    #[error("Boot error: {0}")]
    Boot(#[from] BootError),

    #[error("CPU error: {0}")]
    Ppc(#[from] PpcError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Unsupported feature: {0}")]
    Unsupported(String),
}

/// Memory-related errors
#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("Invalid address: 0x{0:08x}")]
    InvalidAddress(u32),

    #[error("Range 0x{addr:08x}..+0x{len:x} crosses a region boundary")]
    CrossesRegion { addr: u32, len: u32 },
}

/// Disc volume errors
#[derive(Error, Debug)]
pub enum DiscError {
    #[error("Not a disc image: {0}")]
    NotADisc(String),

    #[error("Read of 0x{length:x} bytes at offset 0x{offset:x} exceeds volume size 0x{size:x}")]
    ReadOutOfBounds { offset: u64, length: u32, size: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// NAND filesystem and title errors
#[derive(Error, Debug)]
pub enum NandError {
    #[error("File not found in NAND: {0}")]
    FileNotFound(String),

    #[error("Title {0:016x} is not installed")]
    TitleNotInstalled(u64),

    #[error("Invalid TMD: {0}")]
    InvalidTmd(String),

    #[error("Invalid WAD: {0}")]
    InvalidWad(String),

    #[error("Content {index} failed its hash check")]
    ContentHashMismatch { index: u16 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Executable loader errors
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Invalid DOL: {0}")]
    InvalidDol(String),

    #[error("Invalid ELF: {0}")]
    InvalidElf(String),

    #[error("Unknown executable format: {0}")]
    UnknownFormat(String),
}

/// Boot orchestration errors
#[derive(Error, Debug)]
pub enum BootError {
    #[error("Could not classify boot file: {0}")]
    Classification(String),

    #[error("Wrong console generation: {0}")]
    WrongConsole(String),

    #[error("Apploader failed: {0}")]
    Apploader(String),

    #[error("No input-recording backend is available")]
    NoMovieBackend,
}

/// Guest CPU collaborator errors
#[derive(Error, Debug)]
pub enum PpcError {
    #[error("No guest CPU backend is wired to this machine")]
    NoBackend,

    #[error("Guest execution fault at 0x{addr:08x}: {message}")]
    Fault { addr: u32, message: String },
}

/// Result type alias for emulator operations
pub type Result<T> = std::result::Result<T, EmulatorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MemoryError::InvalidAddress(0x12345678);
        assert_eq!(format!("{}", err), "Invalid address: 0x12345678");

        let err = DiscError::ReadOutOfBounds {
            offset: 0x2440,
            length: 0x20,
            size: 0x2000,
        };
        assert_eq!(
            format!("{}", err),
            "Read of 0x20 bytes at offset 0x2440 exceeds volume size 0x2000"
        );
    }

    #[test]
    fn test_error_conversion() {
        let disc_err = DiscError::NotADisc("foo.bin".to_string());
        let emu_err: EmulatorError = disc_err.into();
        assert!(matches!(emu_err, EmulatorError::Disc(_)));

        let boot_err = BootError::NoMovieBackend;
        let emu_err: EmulatorError = boot_err.into();
        assert!(matches!(emu_err, EmulatorError::Boot(_)));
    }
}
