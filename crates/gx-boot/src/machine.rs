//! Per-attempt machine context

use crate::params::DiscBoot;
use crate::symbols::SymbolIndex;
use gx_core::config::ConsoleModel;
use gx_core::{Config, Result};
use gx_memory::MemoryManager;
use gx_nand::{ConsoleType, Iosc, NandFs};
use gx_ppc::{CpuState, GuestExecutor};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Input-recording playback boundary.
///
/// Replays are driven entirely by an external collaborator; the boot path
/// only resets state and hands over.
pub trait MoviePlayer {
    fn play(&mut self, path: &Path) -> Result<()>;
}

/// Everything a boot attempt reads and mutates, threaded explicitly.
///
/// The orchestrator is the sole writer of the memory image and the NAND
/// for the duration of a boot; callers must not run two attempts
/// concurrently.
pub struct Machine {
    pub memory: Arc<MemoryManager>,
    pub cpu: CpuState,
    pub nand: NandFs,
    pub iosc: Iosc,
    pub config: Config,
    pub symbols: SymbolIndex,
    pub executor: Box<dyn GuestExecutor>,
    pub movie: Option<Box<dyn MoviePlayer>>,
    /// Disc left inserted after boot (readable from the running title)
    pub inserted_disc: Option<DiscBoot>,
}

impl Machine {
    pub fn new(config: Config, executor: Box<dyn GuestExecutor>) -> Result<Self> {
        let nand = NandFs::new(&config.paths.nand_root)?;
        let console_type = match config.general.console {
            ConsoleModel::Retail => ConsoleType::Retail,
            ConsoleModel::Devkit => ConsoleType::Devkit,
        };

        Ok(Self {
            memory: MemoryManager::new(),
            cpu: CpuState::new(),
            nand,
            iosc: Iosc::new(console_type),
            config,
            symbols: SymbolIndex::new(),
            executor,
            movie: None,
            inserted_disc: None,
        })
    }

    /// Security model the Wii bring-up selects
    pub fn console_type(&self) -> ConsoleType {
        self.iosc.console_type()
    }

    /// Tell debugging tooling a symbol map now covers the loaded code
    pub fn notify_map_loaded(&self) {
        info!("Symbol map available for the loaded code range ({} symbols)", self.symbols.len());
    }
}
