//! Emulated NAND storage for the oxidized-cube emulator
//!
//! The NAND is backed by a host directory and addressed with the virtual
//! paths real system software uses (`/title/...`, `/ticket/...`). This
//! crate also owns the installable-title (WAD) container and the console
//! security-model selector consumed during Wii bring-up.

pub mod fs;
pub mod titles;
pub mod wad;

pub use fs::NandFs;
pub use titles::{ContentRecord, Tmd, SYSTEM_MENU_TITLE_ID};
pub use wad::{WadBuilder, WadFile};

/// Retail vs devkit console security model.
///
/// Selected during Wii memory setup and consumed opaquely by the security
/// engine; it changes signature-check behavior further down the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsoleType {
    #[default]
    Retail,
    Devkit,
}

/// Console security engine boundary.
///
/// Only the mode selector lives at this layer; key handling and
/// signature checks are implemented elsewhere.
#[derive(Debug, Default)]
pub struct Iosc {
    console_type: ConsoleType,
}

impl Iosc {
    pub fn new(console_type: ConsoleType) -> Self {
        Self { console_type }
    }

    pub fn select_console_type(&mut self, console_type: ConsoleType) {
        tracing::debug!("IOSC console type: {:?}", console_type);
        self.console_type = console_type;
    }

    pub fn console_type(&self) -> ConsoleType {
        self.console_type
    }
}
