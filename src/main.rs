//! oxidized-cube - GameCube/Wii emulator
//!
//! Boot harness: classifies the given path, brings the emulated machine
//! into its post-boot state, and reports the result. Runs headless; a
//! CPU backend is wired in by the frontend builds.

use gx_boot::{boot_up, BootParameters, Machine};
use gx_core::Config;
use gx_ppc::NullExecutor;
use std::path::PathBuf;

fn main() -> anyhow::Result<()> {
    let config = Config::load()
        .map_err(|e| anyhow::anyhow!("failed to load configuration: {}", e))?;
    gx_core::logging::init(config.debug.log_level);

    tracing::info!("Starting oxidized-cube");

    let mut boot_path: Option<String> = None;
    let mut savestate: Option<PathBuf> = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--savestate" => savestate = args.next().map(PathBuf::from),
            "--help" | "-h" => {
                print_usage();
                return Ok(());
            }
            _ => boot_path = Some(arg),
        }
    }

    let Some(boot_path) = boot_path else {
        print_usage();
        std::process::exit(2);
    };

    let params = BootParameters::generate_from_file(&boot_path, savestate)?;
    tracing::info!("Boot source classified as: {}", params.kind());

    let mut machine = Machine::new(config, Box::new(NullExecutor::new()))?;
    let outcome = boot_up(&mut machine, params)?;

    tracing::info!("Boot complete, pc=0x{:08x}", machine.cpu.pc);
    if let Some(savestate) = outcome.savestate_to_load {
        tracing::info!("Savestate queued for load: {:?}", savestate);
    }
    Ok(())
}

fn print_usage() {
    eprintln!("usage: oxidized-cube [--savestate <path>] <disc|executable|wad|dtm|title-id>");
}
