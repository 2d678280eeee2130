//! Emulated boot-stage-2 firmware
//!
//! Reproduces the net effect the real second-stage firmware has on
//! machine state, without executing the boot ROM itself: MSR and BAT
//! programming, the per-generation memory seed, and driving the
//! apploader to load the game and report its entry point.

use crate::boot::dvd_read;
use crate::machine::Machine;
use gx_core::error::BootError;
use gx_core::Result;
use gx_disc::{Partition, Region, Volume};
use gx_memory::{MEM1_SIZE, MEM2_SIZE};
use gx_nand::{titles, ConsoleType};
use gx_ppc::state::hid4;
use gx_ppc::{BatRegister, CpuState, Msr};
use tracing::{debug, info};

/// Disc offset of the apploader header
const APPLOADER_HEADER_OFFSET: u64 = 0x2440;
/// Where the apploader image is loaded
const APPLOADER_LOAD_ADDRESS: u32 = 0x8120_0000;
/// Function-pointer exchange area of the apploader calling convention
const FUNC_TABLE_ADDRESS: u32 = 0x8000_3100;
/// Parameter block the apploader main loop fills per transfer
const PARAM_BLOCK_ADDRESS: u32 = 0x8130_0000;
/// `rfi`, the default exception handler firmware installs
const RFI_INSTRUCTION: u32 = 0x4C00_0064;
/// Stack pointer the firmware hands to the apploader
const BOOT_STACK_POINTER: u32 = 0x816F_FFF0;

/// Region-derived console settings, fixed after detection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionSetting {
    pub area: &'static str,
    pub video: &'static str,
    pub game: &'static str,
    pub code: &'static str,
}

/// Map a detected region to its settings tuple.
///
/// An unknown region falls back along the configured video standard.
pub fn region_setting(region: Region, ntsc_fallback: bool) -> RegionSetting {
    match region {
        Region::NtscJ => RegionSetting { area: "JPN", video: "NTSC", game: "JP", code: "LJ" },
        Region::NtscU => RegionSetting { area: "USA", video: "NTSC", game: "US", code: "LU" },
        Region::Pal => RegionSetting { area: "EUR", video: "PAL", game: "EU", code: "LE" },
        Region::NtscK => RegionSetting { area: "KOR", video: "NTSC", game: "KR", code: "LKH" },
        Region::Unknown if ntsc_fallback => {
            region_setting(Region::NtscU, true)
        }
        Region::Unknown => region_setting(Region::Pal, false),
    }
}

/// Machine status register as the firmware leaves it: privileged state
/// with FP, translation, and external interrupts on. A constant, not
/// computed.
pub fn setup_msr(cpu: &mut CpuState) {
    cpu.msr = Msr::FP | Msr::IR | Msr::DR | Msr::EE;
}

/// Program the BAT mappings game code expects.
///
/// Pair 0 maps MEM1 cached, data pair 1 maps the uncached/I-O mirror.
/// The newer generation additionally maps MEM2 through pair 4, which
/// only exists behind HID4.SBE.
pub fn setup_bat(cpu: &mut CpuState, is_wii: bool) {
    let mem1 = BatRegister { upper: 0x8000_1FFF, lower: 0x0000_0002 };
    cpu.ibat[0] = mem1;
    cpu.dbat[0] = mem1;
    cpu.dbat[1] = BatRegister { upper: 0xC000_1FFF, lower: 0x0000_002A };

    if is_wii {
        cpu.hid4 |= hid4::SBE;
        let mem2 = BatRegister { upper: 0x9000_1FFF, lower: 0x1000_0002 };
        cpu.ibat[4] = mem2;
        cpu.dbat[4] = mem2;
    }
}

/// Seed the GC lowmem words the IPL leaves for game code
pub fn setup_gc_memory(machine: &mut Machine, ntsc: bool) -> Result<()> {
    debug!("Setup GC memory");
    let mem = &machine.memory;

    mem.write_u32(0x8000_0020, 0x0D15_EA5E)?; // booted from bootrom
    mem.write_u32(0x8000_0028, MEM1_SIZE)?; // physical memory size
    mem.write_u32(0x8000_002C, 0x1000_0006)?; // production board model
    mem.write_u32(0x8000_00CC, if ntsc { 0 } else { 1 })?; // video mode the IPL would set
    mem.write_u32(0x8000_00D0, 0x0100_0000)?; // ARAM size
    mem.write_u32(0x8000_00F8, 0x09A7_EC80)?; // bus clock speed
    mem.write_u32(0x8000_00FC, 0x1CF7_C580)?; // CPU clock speed
    mem.write_u32(0x8000_0300, RFI_INSTRUCTION)?; // default DSI handler
    mem.write_u32(0x8000_0800, RFI_INSTRUCTION)?; // default FPU handler
    mem.write_u32(0x8000_0C00, RFI_INSTRUCTION)?; // default syscall handler
    Ok(())
}

/// Seed Wii lowmem, persist the region settings record, and select the
/// console security model.
pub fn setup_wii_memory(
    machine: &mut Machine,
    console_type: ConsoleType,
    region: Region,
) -> Result<()> {
    let setting = region_setting(region, machine.config.general.ntsc_fallback);
    info!(
        "Setting up Wii memory: area {}, video {}",
        setting.area, setting.video
    );

    // Region settings record the system menu consults
    let record = format!(
        "AREA={}\r\nMODEL=RVL-001({})\r\nDVD=0\r\nMPCH=0x7FFE\r\nCODE={}\r\nSERNO=\r\nVIDEO={}\r\nGAME={}\r\n",
        setting.area, setting.area, setting.code, setting.video, setting.game
    );
    let setting_path = format!("{}/setting.txt", titles::data_dir(titles::SYSTEM_MENU_TITLE_ID));
    machine.nand.write_file(&setting_path, record.as_bytes())?;

    let mem = &machine.memory;
    mem.write_u32(0x8000_0018, 0x5D1C_9EA3)?; // Wii disc magic word
    mem.write_u32(0x8000_0020, 0x0D15_EA5E)?; // booted from bootrom
    mem.write_u32(0x8000_0024, 0x0000_0001)?;
    mem.write_u32(0x8000_0028, MEM1_SIZE)?; // physical MEM1 size
    mem.write_u32(0x8000_002C, 0x0000_0023)?; // production board model
    mem.write_u32(0x8000_0030, 0x0000_0000)?; // init
    mem.write_u32(0x8000_0034, 0x817F_EC60)?; // init arena high
    mem.write_u32(0x8000_00E4, 0x8008_F7B8)?; // thread pointer
    mem.write_u32(0x8000_00F0, MEM1_SIZE)?; // simulated memory size
    mem.write_u32(0x8000_00F4, 0x8179_B500)?; // __start
    mem.write_u32(0x8000_00F8, 0x0E7B_E2C0)?; // bus clock speed
    mem.write_u32(0x8000_00FC, 0x2B73_A840)?; // CPU clock speed
    mem.write_u32(0x8000_3118, MEM2_SIZE)?; // MEM2 size
    mem.write_u32(0x8000_311C, MEM2_SIZE)?; // simulated MEM2 size
    mem.write_u32(0x8000_3120, 0x9340_0000)?; // MEM2 end
    mem.write_u32(0x8000_3124, 0x9000_0800)?; // usable MEM2 start
    mem.write_u32(0x8000_3128, 0x933E_0000)?; // usable MEM2 end
    mem.write_u32(0x8000_3130, 0x933E_0000)?; // IOS heap start
    mem.write_u32(0x8000_3134, 0x9340_0000)?; // IOS heap end
    mem.write_u32(0x8000_3138, 0x0000_0011)?; // hollywood revision

    machine.iosc.select_console_type(console_type);
    Ok(())
}

/// Load the apploader from the disc and drive it to completion.
///
/// The apploader, not this code, loads the game's segments: its main
/// loop reports `(ram address, length, disc offset)` transfers until it
/// runs dry, and its close hook reports the true entry point.
pub fn run_apploader(machine: &mut Machine, is_wii: bool, volume: &dyn Volume) -> Result<()> {
    let partition = volume.game_partition();

    let header = volume.read(APPLOADER_HEADER_OFFSET, 0x20, partition)?;
    let entry = u32::from_be_bytes([header[0x10], header[0x11], header[0x12], header[0x13]]);
    let size = u32::from_be_bytes([header[0x14], header[0x15], header[0x16], header[0x17]]);
    let trailer = u32::from_be_bytes([header[0x18], header[0x19], header[0x1A], header[0x1B]]);

    if size == 0 || entry == 0 {
        return Err(BootError::Apploader("empty apploader header".to_string()).into());
    }
    debug!(
        "Apploader: entry=0x{:08x}, size=0x{:x}+0x{:x}",
        entry, size, trailer
    );

    dvd_read(
        machine,
        volume,
        APPLOADER_HEADER_OFFSET + 0x20,
        APPLOADER_LOAD_ADDRESS,
        size + trailer,
        partition,
    )?;

    // Entry fills in the init/main/close function pointers
    machine.cpu.gpr[3] = FUNC_TABLE_ADDRESS;
    machine.cpu.gpr[4] = FUNC_TABLE_ADDRESS + 4;
    machine.cpu.gpr[5] = FUNC_TABLE_ADDRESS + 8;
    machine
        .executor
        .run_function(&mut machine.cpu, &machine.memory, entry)?;

    let app_init = machine.memory.read_u32(FUNC_TABLE_ADDRESS)?;
    let app_main = machine.memory.read_u32(FUNC_TABLE_ADDRESS + 4)?;
    let app_close = machine.memory.read_u32(FUNC_TABLE_ADDRESS + 8)?;
    if app_init == 0 || app_main == 0 || app_close == 0 {
        return Err(BootError::Apploader("no function table reported".to_string()).into());
    }

    // Init gets a report callback it may call while running
    machine.cpu.gpr[3] = PARAM_BLOCK_ADDRESS;
    machine
        .executor
        .run_function(&mut machine.cpu, &machine.memory, app_init)?;

    // Main loop: each iteration asks for one disc-to-RAM transfer
    loop {
        machine.cpu.gpr[3] = PARAM_BLOCK_ADDRESS;
        machine.cpu.gpr[4] = PARAM_BLOCK_ADDRESS + 4;
        machine.cpu.gpr[5] = PARAM_BLOCK_ADDRESS + 8;
        machine
            .executor
            .run_function(&mut machine.cpu, &machine.memory, app_main)?;
        if machine.cpu.gpr[3] == 0 {
            break;
        }

        let ram_address = machine.memory.read_u32(PARAM_BLOCK_ADDRESS)?;
        let length = machine.memory.read_u32(PARAM_BLOCK_ADDRESS + 4)?;
        let shift = if is_wii { 2 } else { 0 };
        let dvd_offset = (machine.memory.read_u32(PARAM_BLOCK_ADDRESS + 8)? as u64) << shift;

        debug!(
            "Apploader transfer: 0x{:x} bytes from disc 0x{:x} to 0x{:08x}",
            length, dvd_offset, ram_address
        );
        dvd_read(machine, volume, dvd_offset, ram_address, length, partition)?;
    }

    // Close reports the game's entry point
    machine
        .executor
        .run_function(&mut machine.cpu, &machine.memory, app_close)?;
    let game_entry = machine.cpu.gpr[3];
    if game_entry == 0 {
        return Err(BootError::Apploader("reported a null entry point".to_string()).into());
    }

    machine.cpu.pc = game_entry;
    machine.notify_map_loaded();
    info!("Apploader handed off, entry 0x{:08x}", game_entry);
    Ok(())
}

/// Emulated GC boot-stage-2
pub fn emulated_bs2_gc(machine: &mut Machine, volume: &dyn Volume) -> Result<()> {
    info!("Faking GC BS2...");

    setup_msr(&mut machine.cpu);
    setup_bat(&mut machine.cpu, false);
    setup_gc_memory(machine, volume.region().is_ntsc())?;

    // Disc header lands in lowmem for the game to inspect
    dvd_read(machine, volume, 0, 0x8000_0000, 0x20, Partition::NONE)?;

    machine.cpu.gpr[1] = BOOT_STACK_POINTER;
    machine.cpu.gpr[2] = 0x8146_5CC0; // small data area 2 base
    machine.cpu.gpr[13] = 0x8146_5320; // small data area base

    run_apploader(machine, false, volume)
}

/// Emulated Wii boot-stage-2
pub fn emulated_bs2_wii(machine: &mut Machine, volume: &dyn Volume) -> Result<()> {
    info!("Faking Wii BS2...");
    if !volume.is_wii() {
        return Err(BootError::WrongConsole(
            "Wii boot-stage-2 invoked with a GC volume".to_string(),
        )
        .into());
    }

    let partition = volume.game_partition();
    let console_type = machine.console_type();
    setup_wii_memory(machine, console_type, volume.region())?;

    // Game ID consistency word checked while the title boots
    dvd_read(machine, volume, 0, 0x8000_3180, 4, partition)?;

    setup_msr(&mut machine.cpu);
    setup_bat(&mut machine.cpu, true);

    machine.memory.write_u32(0x8000_0300, RFI_INSTRUCTION)?; // default DSI handler
    machine.memory.write_u32(0x8000_0800, RFI_INSTRUCTION)?; // default FPU handler
    machine.memory.write_u32(0x8000_0C00, RFI_INSTRUCTION)?; // default syscall handler

    machine.cpu.gpr[1] = BOOT_STACK_POINTER;

    run_apploader(machine, true, volume)
}

/// Low-level boot dispatch on console generation
pub fn emulated_bs2(machine: &mut Machine, is_wii: bool, volume: &dyn Volume) -> Result<()> {
    if is_wii {
        emulated_bs2_wii(machine, volume)
    } else {
        emulated_bs2_gc(machine, volume)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_msr_is_the_firmware_constant() {
        let mut cpu = CpuState::new();
        setup_msr(&mut cpu);
        assert_eq!(cpu.msr, Msr::FP | Msr::IR | Msr::DR | Msr::EE);
        assert_eq!(cpu.msr.bits(), 0xA030);
    }

    #[test]
    fn test_wii_bat_is_a_strict_superset() {
        let mut gc = CpuState::new();
        setup_bat(&mut gc, false);
        let mut wii = CpuState::new();
        setup_bat(&mut wii, true);

        assert!(wii.mapped_bat_count() > gc.mapped_bat_count());
        assert_eq!(gc.mapped_bat_count(), 3);
        assert_eq!(wii.mapped_bat_count(), 5);

        // The shared RAM mapping is identical across generations
        assert_eq!(gc.ibat[0], wii.ibat[0]);
        assert_eq!(gc.dbat[0], wii.dbat[0]);
        assert_eq!(gc.dbat[1], wii.dbat[1]);

        // Only the newer generation maps MEM2, behind SBE
        assert!(!gc.dbat[4].is_mapped());
        assert!(wii.dbat[4].is_mapped());
        assert_eq!(wii.hid4 & hid4::SBE, hid4::SBE);
        assert_eq!(wii.dbat[4].lower & 0xFFFE_0000, 0x1000_0000);
    }

    #[test]
    fn test_region_settings_table() {
        assert_eq!(region_setting(Region::NtscJ, true).area, "JPN");
        assert_eq!(region_setting(Region::Pal, true).video, "PAL");
        assert_eq!(region_setting(Region::NtscK, true).code, "LKH");

        // Unknown regions follow the configured standard
        assert_eq!(region_setting(Region::Unknown, true).area, "USA");
        assert_eq!(region_setting(Region::Unknown, false).area, "EUR");
    }
}
