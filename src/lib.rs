//! packetd - on-device packet lifecycle daemon
//!
//! Decides, at each boot, which signed filesystem-image packet of each name
//! should be active, decompresses compressed packets, and hands the
//! resulting activation list to the mount layer.

pub mod config;
pub mod daemon;
pub mod error;
pub mod packet;
pub mod pipeline;
pub mod repository;
pub mod scanner;
pub mod selector;
pub mod types;

pub use error::{Error, Result};

use std::path::PathBuf;

/// Suffix of an uncompressed packet container.
pub const PACKET_SUFFIX: &str = ".packet";

/// Suffix of a compressed packet container.
pub const COMPRESSED_PACKET_SUFFIX: &str = ".compressed_packet";

/// Suffix reserved for decompression outputs and their hard links.
pub const DECOMPRESSED_SUFFIX: &str = ".decompressed";

/// Read-only roots scanned for pre-installed packets at boot.
pub fn default_pre_installed_dirs() -> Vec<PathBuf> {
    vec![
        PathBuf::from("/system/packets"),
        PathBuf::from("/vendor/packets"),
    ]
}

/// Mutable directory holding installed packets and decompression hard links.
pub fn default_active_data_dir() -> PathBuf {
    PathBuf::from("/data/packets/active")
}

/// Directory holding decompressed outputs of compressed packets.
pub fn default_decompression_dir() -> PathBuf {
    PathBuf::from("/data/packets/decompressed")
}
