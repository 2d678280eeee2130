//! Boot-source model and path classification

use crate::executable::{open_executable, ExecutableReader};
use gx_core::error::BootError;
use gx_core::Result;
use gx_disc::{open_volume, DiscVolume, Region};
use std::ffi::c_void;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// An opened disc with the path it came from
pub struct DiscBoot {
    pub path: PathBuf,
    pub volume: DiscVolume,
}

/// What the user asked to run.
///
/// Exactly one variant is live per boot request. Each variant exclusively
/// owns its resources; the orchestrator consumes them, it does not share
/// them.
pub enum BootSource {
    /// An optical-disc image
    Disc(DiscBoot),
    /// A raw executable
    Executable {
        path: PathBuf,
        reader: Box<dyn ExecutableReader>,
    },
    /// An installable-title container; handed to the install path unopened
    Wad { path: PathBuf },
    /// A title already installed on the NAND
    NandTitle { id: u64 },
    /// The system menu, with or without a game disc inserted
    SystemMenu {
        region: Region,
        disc: Option<DiscBoot>,
    },
    /// A recorded input movie
    InputRecording { path: PathBuf },
}

impl BootSource {
    fn kind(&self) -> &'static str {
        match self {
            BootSource::Disc(_) => "disc",
            BootSource::Executable { .. } => "executable",
            BootSource::Wad { .. } => "wad",
            BootSource::NandTitle { .. } => "nand title",
            BootSource::SystemMenu { .. } => "system menu",
            BootSource::InputRecording { .. } => "input recording",
        }
    }
}

/// A complete boot request
pub struct BootParameters {
    pub source: BootSource,
    /// Savestate to load right after boot, if any
    pub savestate_path: Option<PathBuf>,
    /// Remove the savestate once it has been loaded
    pub delete_savestate: bool,
    /// Connection to a display server; X11/Wayland platforms only.
    /// Passed through to the video backend untouched.
    pub display_connection: *mut c_void,
    /// Native render surface handle. Null means headless.
    pub render_surface: *mut c_void,
}

impl BootParameters {
    pub fn new(source: BootSource, savestate_path: Option<PathBuf>) -> Self {
        Self {
            source,
            savestate_path,
            delete_savestate: false,
            display_connection: std::ptr::null_mut(),
            render_surface: std::ptr::null_mut(),
        }
    }

    /// No render surface means the video backend runs headless
    pub fn is_headless(&self) -> bool {
        self.render_surface.is_null()
    }

    /// Classify a user-supplied path into a boot source.
    ///
    /// Container extensions map directly to their variant without opening
    /// the content; a 16-hex-digit non-path names an installed title;
    /// everything else is probed as a disc image, then as a raw
    /// executable. Unclassifiable input fails with a descriptive error
    /// and no partial result.
    pub fn generate_from_file<P: AsRef<Path>>(
        boot_path: P,
        savestate_path: Option<PathBuf>,
    ) -> Result<Self> {
        let path = boot_path.as_ref();

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match extension.as_deref() {
            Some("wad") => {
                info!("Classified {:?} as an installable title", path);
                return Ok(Self::new(
                    BootSource::Wad {
                        path: path.to_path_buf(),
                    },
                    savestate_path,
                ));
            }
            Some("dtm") => {
                info!("Classified {:?} as an input recording", path);
                return Ok(Self::new(
                    BootSource::InputRecording {
                        path: path.to_path_buf(),
                    },
                    savestate_path,
                ));
            }
            _ => {}
        }

        // A bare title ID is a shortcut for an installed title
        if !path.exists() {
            if let Some(id) = parse_title_id(path) {
                info!("Classified {:016x} as an installed title", id);
                return Ok(Self::new(BootSource::NandTitle { id }, savestate_path));
            }
            return Err(BootError::Classification(format!(
                "file not found: {}",
                path.display()
            ))
            .into());
        }

        match open_volume(path) {
            Ok(volume) => {
                info!("Classified {:?} as a disc image", path);
                return Ok(Self::new(
                    BootSource::Disc(DiscBoot {
                        path: path.to_path_buf(),
                        volume,
                    }),
                    savestate_path,
                ));
            }
            Err(e) => debug!("Not a disc image: {}", e),
        }

        match open_executable(path) {
            Ok(reader) if reader.is_valid() => {
                info!("Classified {:?} as a raw executable", path);
                return Ok(Self::new(
                    BootSource::Executable {
                        path: path.to_path_buf(),
                        reader,
                    },
                    savestate_path,
                ));
            }
            Ok(_) => {}
            Err(e) => debug!("Not an executable: {}", e),
        }

        Err(BootError::Classification(format!(
            "unsupported or corrupt file: {}",
            path.display()
        ))
        .into())
    }

    pub fn kind(&self) -> &'static str {
        self.source.kind()
    }
}

/// Accept exactly 16 hex digits as a title ID
fn parse_title_id(path: &Path) -> Option<u64> {
    let s = path.to_str()?;
    if s.len() == 16 && s.bytes().all(|b| b.is_ascii_hexdigit()) {
        u64::from_str_radix(s, 16).ok()
    } else {
        None
    }
}
