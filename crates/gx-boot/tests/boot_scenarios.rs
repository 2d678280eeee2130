//! End-to-end boot scenarios

use gx_boot::{boot_up, BootParameters, BootSource, DiscBoot, Machine, MoviePlayer};
use gx_core::error::{BootError, EmulatorError, NandError, PpcError};
use gx_core::Config;
use gx_disc::volume::{GC_DISC_MAGIC, WII_DISC_MAGIC};
use gx_disc::{DiscVolume, Region};
use gx_memory::MemoryManager;
use gx_nand::{WadBuilder, WadFile};
use gx_ppc::{CpuState, GuestExecutor, NullExecutor};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

fn test_machine(dir: &TempDir) -> Machine {
    test_machine_with(dir, Box::new(NullExecutor::new()))
}

fn test_machine_with(dir: &TempDir, executor: Box<dyn GuestExecutor>) -> Machine {
    let mut config = Config::default();
    config.paths.nand_root = dir.path().join("nand");
    Machine::new(config, executor).unwrap()
}

/// Single-section DOL loading 0x100 bytes of `fill` at `address`
fn make_dol(entry: u32, address: u32, fill: u8) -> Vec<u8> {
    let mut dol = vec![0u8; 0x200];
    dol[0x00..0x04].copy_from_slice(&0x100u32.to_be_bytes());
    dol[0x48..0x4C].copy_from_slice(&address.to_be_bytes());
    dol[0x90..0x94].copy_from_slice(&0x100u32.to_be_bytes());
    dol[0xE0..0xE4].copy_from_slice(&entry.to_be_bytes());
    for b in &mut dol[0x100..0x200] {
        *b = fill;
    }
    dol
}

fn blank_image(game_id: &[u8; 6], wii: bool, size: usize) -> Vec<u8> {
    let mut image = vec![0u8; size];
    image[0..6].copy_from_slice(game_id);
    if wii {
        image[0x18..0x1C].copy_from_slice(&WII_DISC_MAGIC.to_be_bytes());
    } else {
        image[0x1C..0x20].copy_from_slice(&GC_DISC_MAGIC.to_be_bytes());
    }
    image
}

// ---------------------------------------------------------------------------
// Scenario A: a GC executable boots without any apploader involvement
// ---------------------------------------------------------------------------

#[test]
fn gc_executable_boots_to_its_entry_point() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("homebrew.dol");
    std::fs::write(&path, make_dol(0x8000_3100, 0x8000_3100, 0xAA)).unwrap();

    // The null executor fails on any guest call, so success doubles as
    // proof that no apploader ran
    let mut machine = test_machine(&dir);
    let params = BootParameters::generate_from_file(&path, None).unwrap();
    let outcome = boot_up(&mut machine, params).unwrap();

    assert_eq!(machine.cpu.pc, 0x8000_3100);
    assert_eq!(machine.memory.read_u8(0x8000_3100).unwrap(), 0xAA);
    // GC lowmem was seeded
    assert_eq!(machine.memory.read_u32(0x8000_0020).unwrap(), 0x0D15_EA5E);
    // No BAT pair for MEM2 on a GC boot
    assert!(!machine.cpu.dbat[4].is_mapped());
    assert_eq!(outcome.savestate_to_load, None);
}

// ---------------------------------------------------------------------------
// Scenario B: an apploader read past the volume end fails the whole boot
// ---------------------------------------------------------------------------

#[test]
fn oversized_apploader_read_aborts_the_boot() {
    let dir = TempDir::new().unwrap();
    let mut image = blank_image(b"GALE01", false, 0x3000);
    // Apploader header claims far more data than the volume holds
    image[0x2450..0x2454].copy_from_slice(&0x8120_0010u32.to_be_bytes()); // entry
    image[0x2454..0x2458].copy_from_slice(&0x1000_0000u32.to_be_bytes()); // size
    let path = dir.path().join("truncated.iso");
    std::fs::write(&path, image).unwrap();

    let mut machine = test_machine(&dir);
    let params = BootParameters::generate_from_file(&path, None).unwrap();
    let result = boot_up(&mut machine, params);

    assert!(result.is_err());
    // The failed transfer wrote nothing to its target region
    let apploader_region = machine.memory.read_bytes(0x8120_0000, 0x1000).unwrap();
    assert!(apploader_region.iter().all(|&b| b == 0));
}

// ---------------------------------------------------------------------------
// Scenario C: WAD install + boot is identical to booting the title directly
// ---------------------------------------------------------------------------

const CHANNEL_TITLE_ID: u64 = 0x0001_0001_4843_4645;

fn channel_wad() -> Vec<u8> {
    WadBuilder::new(CHANNEL_TITLE_ID)
        .content(0x1C, 0, &make_dol(0x8130_0000, 0x8130_0000, 0x42))
        .build()
        .unwrap()
}

#[test]
fn wad_install_then_boot_matches_direct_nand_boot() {
    // Install-and-boot through the WAD path
    let dir_a = TempDir::new().unwrap();
    let wad_path = dir_a.path().join("channel.wad");
    std::fs::write(&wad_path, channel_wad()).unwrap();

    let mut machine_a = test_machine(&dir_a);
    let params = BootParameters::generate_from_file(&wad_path, None).unwrap();
    boot_up(&mut machine_a, params).unwrap();

    // System-title directories exist afterward
    assert!(machine_a.nand.exists("/title/00000001/00000002/content"));
    assert!(machine_a.nand.exists("/title/00000001/00000002/data"));

    // Pre-install the same title, then boot it by ID
    let dir_b = TempDir::new().unwrap();
    let mut machine_b = test_machine(&dir_b);
    WadFile::from_bytes(channel_wad())
        .unwrap()
        .install(&machine_b.nand)
        .unwrap();

    let params = BootParameters::generate_from_file("0001000148434645", None).unwrap();
    assert!(matches!(
        params.source,
        BootSource::NandTitle {
            id: CHANNEL_TITLE_ID
        }
    ));
    boot_up(&mut machine_b, params).unwrap();

    // Both paths reach the same machine state
    assert_eq!(machine_a.cpu.pc, 0x8130_0000);
    assert_eq!(machine_b.cpu.pc, machine_a.cpu.pc);
    assert_eq!(
        machine_a.memory.read_u8(0x8130_0000).unwrap(),
        machine_b.memory.read_u8(0x8130_0000).unwrap()
    );

    // Wii bring-up happened: MEM2 BAT pair mapped, state flags written
    assert!(machine_b.cpu.dbat[4].is_mapped());
    let state = gx_boot::read_state_flags(&machine_b.nand);
    assert_eq!(state.typ, 0x04);
}

#[test]
fn booting_a_missing_nand_title_fails() {
    let dir = TempDir::new().unwrap();
    let mut machine = test_machine(&dir);

    let params = BootParameters::generate_from_file("0001000148434645", None).unwrap();
    let result = boot_up(&mut machine, params);
    assert!(matches!(
        result,
        Err(EmulatorError::Nand(NandError::TitleNotInstalled(
            CHANNEL_TITLE_ID
        )))
    ));
}

// ---------------------------------------------------------------------------
// Region tie-break: a disc's region beats the requested menu region
// ---------------------------------------------------------------------------

fn install_system_menu(machine: &Machine) {
    let wad = WadBuilder::new(gx_nand::SYSTEM_MENU_TITLE_ID)
        .content(0x1C, 0, &make_dol(0x8130_4000, 0x8130_4000, 0x77))
        .build()
        .unwrap();
    WadFile::from_bytes(wad).unwrap().install(&machine.nand).unwrap();
}

#[test]
fn disc_region_overrides_requested_menu_region() {
    let dir = TempDir::new().unwrap();
    let mut machine = test_machine(&dir);
    install_system_menu(&machine);

    let disc = DiscBoot {
        path: dir.path().join("game.iso"),
        volume: DiscVolume::from_bytes(blank_image(b"RSPJ01", true, 0x4000)).unwrap(),
    };

    let params = BootParameters::new(
        BootSource::SystemMenu {
            region: Region::Pal,
            disc: Some(disc),
        },
        None,
    );
    boot_up(&mut machine, params).unwrap();

    // Menu booted with the disc's region, not the requested one
    let setting = machine
        .nand
        .read_file("/title/00000001/00000002/data/setting.txt")
        .unwrap();
    let setting = String::from_utf8(setting).unwrap();
    assert!(setting.contains("AREA=JPN"));
    assert!(!setting.contains("AREA=EUR"));

    // The disc stays inserted for the menu session
    assert!(machine.inserted_disc.is_some());
    assert_eq!(machine.cpu.pc, 0x8130_4000);
}

#[test]
fn menu_without_disc_uses_the_requested_region() {
    let dir = TempDir::new().unwrap();
    let mut machine = test_machine(&dir);
    install_system_menu(&machine);

    let params = BootParameters::new(
        BootSource::SystemMenu {
            region: Region::Pal,
            disc: None,
        },
        None,
    );
    boot_up(&mut machine, params).unwrap();

    let setting = machine
        .nand
        .read_file("/title/00000001/00000002/data/setting.txt")
        .unwrap();
    assert!(String::from_utf8(setting).unwrap().contains("AREA=EUR"));
    assert!(machine.inserted_disc.is_none());
}

#[test]
fn gc_disc_cannot_accompany_a_menu_boot() {
    let dir = TempDir::new().unwrap();
    let mut machine = test_machine(&dir);
    install_system_menu(&machine);

    let disc = DiscBoot {
        path: dir.path().join("game.iso"),
        volume: DiscVolume::from_bytes(blank_image(b"GALE01", false, 0x4000)).unwrap(),
    };

    let params = BootParameters::new(
        BootSource::SystemMenu {
            region: Region::NtscU,
            disc: Some(disc),
        },
        None,
    );
    let result = boot_up(&mut machine, params);
    assert!(matches!(
        result,
        Err(EmulatorError::Boot(BootError::WrongConsole(_)))
    ));
}

// ---------------------------------------------------------------------------
// Full disc boot through a scripted apploader
// ---------------------------------------------------------------------------

/// Plays the apploader's part of the calling convention: publishes the
/// function table, requests one transfer, then reports the entry point.
struct ScriptedApploader {
    main_calls: u32,
}

const APP_ENTRY: u32 = 0x8120_0010;
const APP_INIT: u32 = 0x8120_0020;
const APP_MAIN: u32 = 0x8120_0030;
const APP_CLOSE: u32 = 0x8120_0040;
const GAME_ENTRY: u32 = 0x8000_5000;

impl GuestExecutor for ScriptedApploader {
    fn run_function(
        &mut self,
        cpu: &mut CpuState,
        memory: &Arc<MemoryManager>,
        address: u32,
    ) -> Result<(), PpcError> {
        match address {
            APP_ENTRY => {
                memory.write_u32(cpu.gpr[3], APP_INIT).unwrap();
                memory.write_u32(cpu.gpr[4], APP_MAIN).unwrap();
                memory.write_u32(cpu.gpr[5], APP_CLOSE).unwrap();
            }
            APP_INIT => {}
            APP_MAIN => {
                if self.main_calls == 0 {
                    memory.write_u32(cpu.gpr[3], 0x8000_4000).unwrap(); // ram address
                    memory.write_u32(cpu.gpr[4], 0x40).unwrap(); // length
                    memory.write_u32(cpu.gpr[5], 0x2800).unwrap(); // disc offset
                    cpu.gpr[3] = 1;
                } else {
                    cpu.gpr[3] = 0;
                }
                self.main_calls += 1;
            }
            APP_CLOSE => cpu.gpr[3] = GAME_ENTRY,
            other => panic!("unexpected guest call at 0x{:08x}", other),
        }
        Ok(())
    }
}

#[test]
fn gc_disc_boots_through_the_apploader() {
    let dir = TempDir::new().unwrap();

    let mut image = blank_image(b"GALE01", false, 0x4000);
    image[0x2450..0x2454].copy_from_slice(&APP_ENTRY.to_be_bytes());
    image[0x2454..0x2458].copy_from_slice(&0x100u32.to_be_bytes()); // apploader size
    for b in &mut image[0x2460..0x2560] {
        *b = 0xAD; // apploader image
    }
    for b in &mut image[0x2800..0x2840] {
        *b = 0x77; // game data the apploader requests
    }
    let path = dir.path().join("game.iso");
    std::fs::write(&path, image).unwrap();

    let mut machine = test_machine_with(&dir, Box::new(ScriptedApploader { main_calls: 0 }));
    let params = BootParameters::generate_from_file(&path, None).unwrap();
    boot_up(&mut machine, params).unwrap();

    // The apploader image was loaded and the requested transfer happened
    assert_eq!(machine.memory.read_u8(0x8120_0000).unwrap(), 0xAD);
    let game_data = machine.memory.read_bytes(0x8000_4000, 0x40).unwrap();
    assert!(game_data.iter().all(|&b| b == 0x77));

    // The disc header reached lowmem and the entry point was honored
    assert_eq!(
        machine.memory.read_bytes(0x8000_0000, 6).unwrap(),
        b"GALE01"
    );
    assert_eq!(machine.cpu.pc, GAME_ENTRY);
    assert!(machine.inserted_disc.is_some());
}

// ---------------------------------------------------------------------------
// Input recordings
// ---------------------------------------------------------------------------

struct RecordingProbe {
    played: Arc<AtomicBool>,
}

impl MoviePlayer for RecordingProbe {
    fn play(&mut self, _path: &Path) -> gx_core::Result<()> {
        self.played.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn input_recording_delegates_and_disables_savestate_autoload() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("speedrun.dtm");
    std::fs::write(&path, b"").unwrap();

    let played = Arc::new(AtomicBool::new(false));
    let mut machine = test_machine(&dir);
    machine.movie = Some(Box::new(RecordingProbe {
        played: played.clone(),
    }));

    let params =
        BootParameters::generate_from_file(&path, Some(dir.path().join("auto.sav"))).unwrap();
    let outcome = boot_up(&mut machine, params).unwrap();

    assert!(played.load(Ordering::SeqCst));
    // Replays are only deterministic from a cold boot
    assert_eq!(outcome.savestate_to_load, None);
}

#[test]
fn input_recording_without_a_backend_fails() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("speedrun.dtm");
    std::fs::write(&path, b"").unwrap();

    let mut machine = test_machine(&dir);
    let params = BootParameters::generate_from_file(&path, None).unwrap();
    let result = boot_up(&mut machine, params);
    assert!(matches!(
        result,
        Err(EmulatorError::Boot(BootError::NoMovieBackend))
    ));
}
