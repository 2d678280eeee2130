//! Symbol bookkeeping and map-file discovery

use gx_core::Config;
use std::path::PathBuf;
use tracing::debug;

/// One harvested symbol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub address: u32,
    pub size: u32,
}

/// Symbols known for the currently loaded code
#[derive(Debug, Default)]
pub struct SymbolIndex {
    symbols: Vec<Symbol>,
}

impl SymbolIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: String, address: u32, size: u32) {
        self.symbols.push(Symbol {
            name,
            address,
            size,
        });
    }

    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.symbols.iter().find(|s| s.name == name)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Drop everything; used when a new title replaces the loaded code
    pub fn clear(&mut self) {
        self.symbols.clear();
    }
}

/// Where a map file for the current game lives, if anywhere
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapFilePaths {
    /// An existing map, user-local dir checked before the shared dir
    pub existing: Option<PathBuf>,
    /// Where a newly produced map should be written
    pub writable: PathBuf,
}

/// Find a symbol map for `game_id`.
///
/// Purely advisory for debugging tooling; boot never depends on the
/// result.
pub fn find_map_file(game_id: &str, config: &Config) -> MapFilePaths {
    let file_name = format!("{}.map", game_id);
    let writable = config.paths.maps.join(&file_name);

    let existing = [
        config.paths.maps.join(&file_name),
        config.paths.shared_maps.join(&file_name),
    ]
    .into_iter()
    .find(|candidate| candidate.is_file());

    debug!("Map file for {}: {:?}", game_id, existing);
    MapFilePaths { existing, writable }
}
