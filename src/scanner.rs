//! Directory scanning for packet containers.
//!
//! Non-recursive enumeration by suffix, with two opening modes: pre-installed
//! scans treat any unreadable container as fatal, data scans log and skip it.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::packet::PacketFile;

/// True iff the file name of `path` ends with `suffix`.
pub fn has_suffix(path: &Path, suffix: &str) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map_or(false, |name| name.ends_with(suffix))
}

/// List regular files in `dir` whose name ends with one of `suffixes`.
///
/// An absent directory yields an empty list; an existing but unreadable one
/// is an error. Symbolic links are not followed.
pub fn find_by_suffix(dir: &Path, suffixes: &[&str]) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            tracing::warn!("{} does not exist, skipping", dir.display());
            return Ok(Vec::new());
        }
        Err(err) => return Err(err.into()),
    };

    let mut found = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if !fs::symlink_metadata(&path)?.is_file() {
            continue;
        }
        if suffixes.iter().any(|suffix| has_suffix(&path, suffix)) {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

/// Open every matching container in `dir`; any open failure is fatal.
pub fn scan(dir: &Path, suffixes: &[&str]) -> Result<Vec<PacketFile>> {
    let mut packets = Vec::new();
    for path in find_by_suffix(dir, suffixes)? {
        packets.push(PacketFile::open(&path)?);
    }
    Ok(packets)
}

/// Open every matching container in `dir`, skipping files that fail to open.
pub fn scan_lenient(dir: &Path, suffixes: &[&str]) -> Result<Vec<PacketFile>> {
    let mut packets = Vec::new();
    for path in find_by_suffix(dir, suffixes)? {
        match PacketFile::open(&path) {
            Ok(packet) => packets.push(packet),
            Err(err) => {
                tracing::error!("failed to open {}: {err}; skipping", path.display());
            }
        }
    }
    Ok(packets)
}
