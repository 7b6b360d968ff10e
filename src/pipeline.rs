//! Decompression pipeline.
//!
//! Turns compressed pre-installed packets into uncompressed files under the
//! decompression directory, validates each output, and hard-links it into
//! the active-data directory where the data scan will find it. Also owns the
//! decompression-side bookkeeping: garbage collection of unlinked outputs,
//! space reservation, and the should-we-allocate heuristic.
//!
//! Hard-link identity is POSIX inode equality; platforms without hard links
//! cannot host this pipeline.

use std::fs;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::{Error, Result};
use crate::packet::{self, PacketFile};
use crate::repository::PacketRepository;
use crate::types::PacketVersion;
use crate::DECOMPRESSED_SUFFIX;

/// Name of the single space-reservation file maintained by `reserve_space`.
pub const RESERVATION_FILE: &str = "reserved.space";

/// File name of a decompression output: `<name>@<version>.decompressed`.
pub fn decompressed_file_name(name: &str, version: PacketVersion) -> String {
    format!("{name}@{version}{DECOMPRESSED_SUFFIX}")
}

/// Decompress every packet in `compressed`, returning the packets reopened
/// from their hard-linked active-data paths.
///
/// A failure affects only the packet it occurred on: the packet is dropped
/// from the result with a diagnostic and processing continues. Repeated
/// calls with the same inputs leave existing outputs untouched and only
/// repair missing or stale hard links.
pub fn process_compressed(
    compressed: &[&PacketFile],
    decompression_dir: &Path,
    active_data_dir: &Path,
) -> Vec<PacketFile> {
    let mut activated = Vec::new();
    for packet in compressed {
        match process_one(packet, decompression_dir, active_data_dir) {
            Ok(active) => activated.push(active),
            Err(err) => {
                tracing::error!(
                    "failed to process compressed packet {}: {err}; \
                     dropping it from activation",
                    packet.path().display()
                );
            }
        }
    }
    activated
}

fn process_one(
    packet: &PacketFile,
    decompression_dir: &Path,
    active_data_dir: &Path,
) -> Result<PacketFile> {
    if !packet.is_compressed() {
        return Err(Error::InvalidArgument(format!(
            "{} is not a compressed packet",
            packet.path().display()
        )));
    }
    let file_name = decompressed_file_name(packet.name(), packet.version());
    let target = decompression_dir.join(&file_name);
    let link = active_data_dir.join(&file_name);

    if !is_decompression_done(packet, &target) {
        if let Err(err) = decompress_to(packet, &target) {
            let _ = fs::remove_file(&target);
            return Err(failure(packet, err));
        }
        let validated = PacketFile::open(&target)
            .and_then(|output| packet::validate_decompressed(packet, &output));
        if let Err(err) = validated {
            let _ = fs::remove_file(&target);
            return Err(failure(packet, err));
        }
    }

    if let Err(err) = link_into(&target, &link) {
        let _ = fs::remove_file(&target);
        let _ = fs::remove_file(&link);
        return Err(failure(packet, err));
    }

    PacketFile::open(&link)
}

/// True iff `target` already holds a valid decompression output of `packet`.
fn is_decompression_done(packet: &PacketFile, target: &Path) -> bool {
    if !target.exists() {
        return false;
    }
    match PacketFile::open(target) {
        Ok(existing) => packet::validate_decompressed(packet, &existing).is_ok(),
        Err(err) => {
            tracing::warn!(
                "existing output {} is unusable ({err}); overwriting",
                target.display()
            );
            false
        }
    }
}

/// Decompress into a temporary file in the target's directory, fsync, and
/// rename into place so readers never observe a partial output.
fn decompress_to(packet: &PacketFile, target: &Path) -> Result<()> {
    let dir = target.parent().ok_or_else(|| {
        Error::InvalidArgument(format!("{} has no parent directory", target.display()))
    })?;
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    packet.decompress_payload_into(tmp.as_file_mut())?;
    tmp.as_file().sync_all()?;
    tmp.persist(target).map_err(|err| Error::Io(err.error))?;
    Ok(())
}

/// Hard-link `target` as `link`, repairing a stale file of the same name.
fn link_into(target: &Path, link: &Path) -> Result<()> {
    if let Some(parent) = link.parent() {
        fs::create_dir_all(parent)?;
    }
    match fs::hard_link(target, link) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
            if same_inode(target, link)? {
                return Ok(());
            }
            fs::remove_file(link)?;
            fs::hard_link(target, link)?;
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

fn same_inode(a: &Path, b: &Path) -> io::Result<bool> {
    let meta_a = fs::metadata(a)?;
    let meta_b = fs::metadata(b)?;
    Ok(meta_a.dev() == meta_b.dev() && meta_a.ino() == meta_b.ino())
}

fn failure(packet: &PacketFile, err: Error) -> Error {
    Error::Decompression {
        name: packet.name().to_string(),
        reason: err.to_string(),
    }
}

/// Delete every file in the decompression directory that is not hard-linked
/// under the same base name into the active-data directory.
///
/// Name equality is required on top of inode equality so that a stale output
/// sharing an inode with an unrelated active file is still collected.
pub fn sweep_unlinked(decompression_dir: &Path, active_data_dir: &Path) -> Result<()> {
    let entries = match fs::read_dir(decompression_dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err.into()),
    };
    for entry in entries {
        let path = entry?.path();
        if !fs::symlink_metadata(&path)?.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name() else {
            continue;
        };
        let sibling = active_data_dir.join(file_name);
        let linked = match same_inode(&path, &sibling) {
            Ok(linked) => linked,
            Err(err) if err.kind() == io::ErrorKind::NotFound => false,
            Err(err) => return Err(err.into()),
        };
        if !linked {
            tracing::info!("removing unlinked decompression output {}", path.display());
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// Create or resize the single reservation file in `dest_dir` to exactly
/// `bytes`. Zero deletes the reservation; negative sizes are rejected.
pub fn reserve_space(bytes: i64, dest_dir: &Path) -> Result<()> {
    if bytes < 0 {
        return Err(Error::InvalidArgument(format!(
            "cannot reserve a negative size: {bytes}"
        )));
    }
    let path = dest_dir.join(RESERVATION_FILE);
    if bytes == 0 {
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        return Ok(());
    }
    fs::create_dir_all(dest_dir)?;
    let tmp = NamedTempFile::new_in(dest_dir)?;
    tmp.as_file().set_len(bytes as u64)?;
    tmp.as_file().sync_all()?;
    tmp.persist(&path).map_err(|err| Error::Io(err.error))?;
    Ok(())
}

/// True iff introducing the named compressed packet at `new_version` would
/// require a new decompression output.
///
/// Brand-new names and names whose pre-installed copy was not compressed
/// before always need one; otherwise an output is needed only for a version
/// strictly greater than the retained data copy (absent copy counts as
/// version zero, so the answer is monotone in `new_version`).
pub fn should_allocate_for_decompression(
    repository: &PacketRepository,
    name: &str,
    new_version: PacketVersion,
) -> bool {
    let Some(pre_installed) = repository.get_pre_installed(name) else {
        return true;
    };
    if !pre_installed.is_compressed() {
        return true;
    }
    let current = repository
        .get_data(name)
        .map(|data| data.version().get())
        .unwrap_or(0);
    new_version.get() > current
}
