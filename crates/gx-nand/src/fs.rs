//! Host-directory-backed NAND filesystem

use gx_core::error::NandError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Emulated NAND filesystem
///
/// Files are addressed by their virtual path (`/title/...`) and stored
/// under a host root directory. All writes create missing parents.
pub struct NandFs {
    root: PathBuf,
}

impl NandFs {
    /// Open (creating if needed) a NAND rooted at `root`
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, NandError> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Host root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a virtual path to a host path
    pub fn resolve(&self, virtual_path: &str) -> PathBuf {
        self.root.join(virtual_path.trim_start_matches('/'))
    }

    /// Read a whole file
    pub fn read_file(&self, virtual_path: &str) -> Result<Vec<u8>, NandError> {
        let host = self.resolve(virtual_path);
        if !host.is_file() {
            return Err(NandError::FileNotFound(virtual_path.to_string()));
        }
        Ok(std::fs::read(host)?)
    }

    /// Write a whole file, creating parent directories
    pub fn write_file(&self, virtual_path: &str, data: &[u8]) -> Result<(), NandError> {
        let host = self.resolve(virtual_path);
        if let Some(parent) = host.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&host, data)?;
        debug!("NAND write: {} ({} bytes)", virtual_path, data.len());
        Ok(())
    }

    /// Ensure a directory exists; idempotent
    pub fn create_dir_all(&self, virtual_path: &str) -> Result<(), NandError> {
        std::fs::create_dir_all(self.resolve(virtual_path))?;
        Ok(())
    }

    /// Whether a file or directory exists at the virtual path
    pub fn exists(&self, virtual_path: &str) -> bool {
        self.resolve(virtual_path).exists()
    }

    /// Delete a file if present
    pub fn remove_file(&self, virtual_path: &str) -> Result<(), NandError> {
        let host = self.resolve(virtual_path);
        if host.is_file() {
            std::fs::remove_file(host)?;
        }
        Ok(())
    }
}
