//! Daemon configuration.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::PacketName;

/// On-disk layout and policy knobs, loadable from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Read-only roots scanned for pre-installed packets.
    pub pre_installed_dirs: Vec<PathBuf>,
    /// Mutable directory holding installed packets and decompression links.
    pub active_data_dir: PathBuf,
    /// Directory holding decompression outputs.
    pub decompression_dir: PathBuf,
    /// Packet names whose duplicate pre-installed copies are downgraded from
    /// a fatal error to a warning. Meant for development images only.
    pub duplicate_warn_only: Vec<PacketName>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pre_installed_dirs: crate::default_pre_installed_dirs(),
            active_data_dir: crate::default_active_data_dir(),
            decompression_dir: crate::default_decompression_dir(),
            duplicate_warn_only: Vec::new(),
        }
    }
}

impl Config {
    /// Load a configuration file; missing keys fall back to the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }
}
