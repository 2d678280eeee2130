//! Top-level boot dispatch

use crate::bs2::{emulated_bs2, setup_bat, setup_gc_memory, setup_msr, setup_wii_memory};
use crate::executable::executable_from_bytes;
use crate::machine::Machine;
use crate::params::{BootParameters, BootSource, DiscBoot};
use crate::state_flags::{disc_state, state_type, update_state_flags};
use gx_core::error::BootError;
use gx_core::Result;
use gx_disc::{Partition, Region, Volume};
use gx_nand::titles;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// What the caller should do once boot succeeded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootOutcome {
    /// Savestate to load instead of running from the cold-boot state
    pub savestate_to_load: Option<PathBuf>,
    /// Remove the savestate file after loading it
    pub delete_savestate: bool,
}

/// Bounded disc-to-memory transfer.
///
/// The volume read is validated against the partition's addressable
/// range first; on failure nothing is written to memory.
pub fn dvd_read(
    machine: &Machine,
    volume: &dyn Volume,
    dvd_offset: u64,
    output_address: u32,
    length: u32,
    partition: Partition,
) -> Result<()> {
    let data = volume.read(dvd_offset, length, partition)?;
    machine.memory.write_bytes(output_address, &data)?;
    Ok(())
}

/// Bring the machine into the state real hardware reaches after boot.
///
/// Consumes the boot request. On failure the machine state is undefined
/// and the caller must discard it; no partial-boot state is guaranteed
/// consistent.
pub fn boot_up(machine: &mut Machine, boot: BootParameters) -> Result<BootOutcome> {
    let BootParameters {
        source,
        savestate_path,
        delete_savestate,
        render_surface,
        ..
    } = boot;

    if render_surface.is_null() {
        debug!("No render surface: video backend will run headless");
    }

    let mut outcome = BootOutcome {
        savestate_to_load: if machine.config.general.auto_load_savestate {
            savestate_path
        } else {
            None
        },
        delete_savestate,
    };

    machine.cpu.reset();
    machine.symbols.clear();
    machine.inserted_disc = None;

    match source {
        BootSource::Disc(disc) => {
            let is_wii = disc.volume.is_wii();
            info!(
                "Booting disc {:?} (id={}, {})",
                disc.path,
                disc.volume.game_id(),
                if is_wii { "Wii" } else { "GC" }
            );
            emulated_bs2(machine, is_wii, &disc.volume)?;

            // Advisory only: debugging tooling picks this up later
            let maps = crate::symbols::find_map_file(&disc.volume.game_id(), &machine.config);
            if let Some(existing) = maps.existing {
                debug!("Symbol map available at {:?}", existing);
            }

            machine.inserted_disc = Some(disc);
        }

        BootSource::Executable { path, reader } => {
            info!("Booting executable {:?}", path);
            if !reader.is_valid() {
                return Err(BootError::Classification(format!(
                    "invalid executable: {}",
                    path.display()
                ))
                .into());
            }

            let is_wii = reader.is_wii();
            setup_msr(&mut machine.cpu);
            setup_bat(&mut machine.cpu, is_wii);
            if is_wii {
                let console_type = machine.console_type();
                setup_wii_memory(machine, console_type, Region::Unknown)?;
            } else {
                let ntsc = machine.config.general.ntsc_fallback;
                setup_gc_memory(machine, ntsc)?;
            }

            reader.load_into_memory(&machine.memory, false)?;
            machine.cpu.pc = reader.entry_point();
            if reader.load_symbols(&mut machine.symbols) {
                machine.notify_map_loaded();
            }
        }

        BootSource::Wad { path } => boot_wad(machine, &path)?,

        BootSource::NandTitle { id } => boot_nand_title(machine, id)?,

        BootSource::SystemMenu { region, disc } => boot_system_menu(machine, region, disc)?,

        BootSource::InputRecording { path } => {
            info!("Starting input recording {:?}", path);
            // Replays are deterministic only from a cold boot
            outcome.savestate_to_load = None;
            outcome.delete_savestate = false;

            let mut movie = machine
                .movie
                .take()
                .ok_or(BootError::NoMovieBackend)?;
            let result = movie.play(&path);
            machine.movie = Some(movie);
            result?;
        }
    }

    Ok(outcome)
}

/// Install a title container, then boot the installed title
fn boot_wad(machine: &mut Machine, path: &Path) -> Result<()> {
    info!("Installing and booting {:?}", path);
    let wad = gx_nand::WadFile::open(path)?;
    let title_id = wad.install(&machine.nand)?;
    titles::create_system_menu_title_dirs(&machine.nand)?;
    boot_nand_title(machine, title_id)
}

/// Boot a title installed on the NAND
pub(crate) fn boot_nand_title(machine: &mut Machine, title_id: u64) -> Result<()> {
    info!("Booting NAND title {:016x}", title_id);
    update_state_flags(&machine.nand, |state| {
        state.typ = state_type::NANDBOOT;
        state.discstate = disc_state::NONE;
    })?;

    let content = titles::load_boot_content(&machine.nand, title_id)?;
    let reader = executable_from_bytes(content)?;

    setup_msr(&mut machine.cpu);
    setup_bat(&mut machine.cpu, true);
    let console_type = machine.console_type();
    setup_wii_memory(machine, console_type, title_region(title_id))?;

    // Constrained load: MEM2 belongs to system software at this point
    reader.load_into_memory(&machine.memory, true)?;
    machine.cpu.pc = reader.entry_point();
    Ok(())
}

/// Boot the system menu, with or without a disc in the drive.
///
/// A disc's region overrides the requested one, and the disc stays
/// inserted and readable during the menu session.
fn boot_system_menu(
    machine: &mut Machine,
    region: Region,
    disc: Option<DiscBoot>,
) -> Result<()> {
    let region = match &disc {
        Some(d) => {
            if !d.volume.is_wii() {
                // Input-validation gap in the original interface: a GC
                // disc cannot accompany a Wii menu session
                return Err(BootError::WrongConsole(
                    "a GC disc cannot stay inserted for a system-menu boot".to_string(),
                )
                .into());
            }
            let disc_region = d.volume.region();
            if disc_region != region {
                info!(
                    "Disc region {} overrides requested menu region {}",
                    disc_region, region
                );
            }
            disc_region
        }
        None => region,
    };

    info!("Booting system menu ({})", region);
    titles::create_system_menu_title_dirs(&machine.nand)?;
    update_state_flags(&machine.nand, |state| {
        state.typ = state_type::RETURN;
        state.discstate = if disc.is_some() {
            disc_state::INSERTED
        } else {
            disc_state::NONE
        };
    })?;

    let content = titles::load_boot_content(&machine.nand, titles::SYSTEM_MENU_TITLE_ID)?;
    let reader = executable_from_bytes(content)?;

    setup_msr(&mut machine.cpu);
    setup_bat(&mut machine.cpu, true);
    let console_type = machine.console_type();
    setup_wii_memory(machine, console_type, region)?;

    reader.load_into_memory(&machine.memory, true)?;
    machine.cpu.pc = reader.entry_point();

    machine.inserted_disc = disc;
    Ok(())
}

/// Titles encode their region in the fourth character of the lower ID
/// half; system titles (low numeric IDs) come out as `Unknown` and fall
/// back to the configured standard.
fn title_region(title_id: u64) -> Region {
    Region::from_country_code(titles::title_lo(title_id).to_be_bytes()[3])
}
