//! Boot orchestration for the oxidized-cube emulator
//!
//! Everything between "the user asked to run this path" and "the machine
//! state matches what real hardware reaches after its own boot sequence":
//! boot-source classification, executable loading, the emulated
//! boot-stage-2 procedure, and the NAND-resident state-flags record.

pub mod boot;
pub mod bs2;
pub mod executable;
pub mod machine;
pub mod params;
pub mod state_flags;
pub mod symbols;

mod dol;
mod elf;

pub use boot::{boot_up, dvd_read, BootOutcome};
pub use bs2::{
    emulated_bs2, emulated_bs2_gc, emulated_bs2_wii, region_setting, run_apploader, setup_bat,
    setup_gc_memory, setup_msr, setup_wii_memory, RegionSetting,
};
pub use dol::DolExecutable;
pub use elf::ElfExecutable;
pub use executable::{executable_from_bytes, executable_from_file, open_executable, ExecutableReader};
pub use machine::{Machine, MoviePlayer};
pub use params::{BootParameters, BootSource, DiscBoot};
pub use state_flags::{read_state_flags, update_state_flags, StateFlags, STATE_FILE_PATH};
pub use symbols::{find_map_file, MapFilePaths, Symbol, SymbolIndex};
