//! Crate-wide error type.
//!
//! Every public core function returns `Result<T, Error>`; the variants keep
//! the failure kinds the caller needs to tell apart (fatal pre-installed
//! violations vs. droppable data-side failures).

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("container error: {0}")]
    Container(#[from] zip::result::ZipError),

    #[error("manifest error: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("config parse error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("no {what} found for packet {name}")]
    NotFound { what: &'static str, name: String },

    #[error("integrity violation: {0}")]
    Integrity(String),

    #[error(
        "two pre-installed packets {} and {} share the name {name}",
        .existing.display(),
        .incoming.display()
    )]
    Duplicate {
        name: String,
        existing: PathBuf,
        incoming: PathBuf,
    },

    #[error("public key of pre-installed packet {} ({name}) has changed", .path.display())]
    KeyRotation { name: String, path: PathBuf },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("failed to decompress packet {name}: {reason}")]
    Decompression { name: String, reason: String },
}
