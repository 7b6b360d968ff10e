//! The authoritative store of packets on device.
//!
//! Two disjoint indexes keyed by packet name: pre-installed (shipped on
//! trusted read-only roots) and data (installed or decompressed under the
//! mutable directories). The repository is populated once during boot
//! initialization and sealed; afterwards it is a read-only shared value.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::packet::{self, PacketFile};
use crate::scanner;
use crate::types::PacketName;
use crate::{COMPRESSED_PACKET_SUFFIX, DECOMPRESSED_SUFFIX, PACKET_SUFFIX};

/// The (optional) pre-installed and data entries for one packet name.
#[derive(Debug, Clone, Copy, Default)]
pub struct PacketPair<'a> {
    pub pre_installed: Option<&'a PacketFile>,
    pub data: Option<&'a PacketFile>,
}

pub struct PacketRepository {
    pre_installed: HashMap<PacketName, PacketFile>,
    data: HashMap<PacketName, PacketFile>,
    /// Used to decide whether a packet file is a decompression output.
    decompression_dir: PathBuf,
    /// Names whose duplicate pre-installed copies are downgraded to warnings.
    duplicate_warn_only: Vec<PacketName>,
    sealed: bool,
}

impl PacketRepository {
    pub fn new(decompression_dir: impl Into<PathBuf>) -> Self {
        Self {
            pre_installed: HashMap::new(),
            data: HashMap::new(),
            decompression_dir: decompression_dir.into(),
            duplicate_warn_only: Vec::new(),
            sealed: false,
        }
    }

    /// Downgrade duplicate pre-installed copies of the given names to
    /// warnings. Intended for development images; duplicates stay fatal for
    /// every other name.
    pub fn with_duplicate_allow_list(mut self, names: Vec<PacketName>) -> Self {
        self.duplicate_warn_only = names;
        self
    }

    /// Scan the given read-only roots and populate the pre-installed index.
    ///
    /// Two pre-installed copies of one name, or a key change at an already
    /// scanned path, are fatal: they mean a corrupt build.
    pub fn add_pre_installed(&mut self, dirs: &[PathBuf]) -> Result<()> {
        assert!(!self.sealed, "repository is sealed");
        for dir in dirs {
            self.scan_built_in_dir(dir)?;
        }
        Ok(())
    }

    fn scan_built_in_dir(&mut self, dir: &Path) -> Result<()> {
        tracing::info!("scanning {} for pre-installed packets", dir.display());
        let packets = scanner::scan(dir, &[PACKET_SUFFIX, COMPRESSED_PACKET_SUFFIX])?;
        for packet in packets {
            let name = packet.manifest().name.clone();
            if let Some(existing) = self.pre_installed.get(name.as_str()) {
                if existing.path() != packet.path() {
                    if self.duplicate_warn_only.contains(&name) {
                        tracing::warn!(
                            "found two pre-installed packets {} and {} with the name {}; \
                             keeping the first",
                            existing.path().display(),
                            packet.path().display(),
                            name
                        );
                        continue;
                    }
                    return Err(Error::Duplicate {
                        name: name.to_string(),
                        existing: existing.path().to_path_buf(),
                        incoming: packet.path().to_path_buf(),
                    });
                }
                if existing.bundled_public_key() != packet.bundled_public_key() {
                    return Err(Error::KeyRotation {
                        name: name.to_string(),
                        path: packet.path().to_path_buf(),
                    });
                }
                // Same file scanned again; nothing to do.
                continue;
            }
            tracing::info!("found pre-installed packet {}", packet.path().display());
            self.pre_installed.insert(name, packet);
        }
        Ok(())
    }

    /// Scan the active-data and decompression directories and populate the
    /// data index.
    ///
    /// Candidates that fail the identity checks are dropped with a
    /// diagnostic; per-name ties keep the highest version, preferring a
    /// regular container over a decompression output.
    pub fn add_data(&mut self, data_dir: &Path, decompression_dir: &Path) -> Result<()> {
        assert!(!self.sealed, "repository is sealed");
        tracing::info!(
            "scanning {} and {} for data packets",
            data_dir.display(),
            decompression_dir.display()
        );
        let mut candidates = scanner::scan_lenient(data_dir, &[PACKET_SUFFIX])?;
        candidates.extend(scanner::scan_lenient(
            decompression_dir,
            &[DECOMPRESSED_SUFFIX],
        )?);

        for candidate in candidates {
            let name = candidate.manifest().name.clone();
            let Some(pre_installed) = self.pre_installed.get(name.as_str()) else {
                tracing::warn!(
                    "skipping {}: no pre-installed packet named {}",
                    candidate.path().display(),
                    name
                );
                continue;
            };
            if pre_installed.bundled_public_key() != candidate.bundled_public_key() {
                tracing::warn!(
                    "skipping {}: public key does not match the pre-installed packet",
                    candidate.path().display()
                );
                continue;
            }
            if self.is_decompressed(&candidate) {
                if !pre_installed.is_compressed() {
                    tracing::warn!(
                        "skipping {}: its pre-installed counterpart is not compressed",
                        candidate.path().display()
                    );
                    continue;
                }
                if let Err(err) = packet::validate_decompressed(pre_installed, &candidate) {
                    tracing::warn!("skipping {}: {err}", candidate.path().display());
                    continue;
                }
            } else if scanner::has_suffix(candidate.path(), DECOMPRESSED_SUFFIX) {
                tracing::warn!(
                    "skipping {}: the {} suffix is reserved for decompression outputs",
                    candidate.path().display(),
                    DECOMPRESSED_SUFFIX
                );
                continue;
            }

            match self.data.get(name.as_str()) {
                None => {
                    self.data.insert(name, candidate);
                }
                Some(existing) => {
                    let higher = candidate.version() > existing.version();
                    let same_but_regular = candidate.version() == existing.version()
                        && !self.is_decompressed(&candidate);
                    if higher || same_but_regular {
                        self.data.insert(name, candidate);
                    }
                }
            }
        }
        Ok(())
    }

    /// Trusted public key for the named packet.
    pub fn get_public_key(&self, name: &str) -> Result<&[u8]> {
        self.pre_installed
            .get(name)
            .map(PacketFile::bundled_public_key)
            .ok_or_else(|| Error::NotFound {
                what: "pre-installed packet",
                name: name.to_string(),
            })
    }

    /// Path of the pre-installed copy of the named packet.
    pub fn get_pre_installed_path(&self, name: &str) -> Result<&Path> {
        self.pre_installed
            .get(name)
            .map(PacketFile::path)
            .ok_or_else(|| Error::NotFound {
                what: "pre-installed packet",
                name: name.to_string(),
            })
    }

    /// Path of the retained data copy of the named packet.
    pub fn get_data_path(&self, name: &str) -> Result<&Path> {
        self.data
            .get(name)
            .map(PacketFile::path)
            .ok_or_else(|| Error::NotFound {
                what: "data packet",
                name: name.to_string(),
            })
    }

    pub fn has_pre_installed(&self, name: &str) -> bool {
        self.pre_installed.contains_key(name)
    }

    pub fn has_data(&self, name: &str) -> bool {
        self.data.contains_key(name)
    }

    pub fn get_pre_installed(&self, name: &str) -> Option<&PacketFile> {
        self.pre_installed.get(name)
    }

    pub fn get_data(&self, name: &str) -> Option<&PacketFile> {
        self.data.get(name)
    }

    /// True iff the packet file lives under the decompression directory.
    pub fn is_decompressed(&self, packet: &PacketFile) -> bool {
        packet.path().starts_with(&self.decompression_dir)
    }

    /// True iff the packet is the pre-installed copy of its name, or a
    /// decompression output derived from it.
    pub fn is_pre_installed(&self, packet: &PacketFile) -> bool {
        match self.pre_installed.get(packet.name()) {
            None => false,
            Some(pre) => pre.path() == packet.path() || self.is_decompressed(packet),
        }
    }

    /// All pre-installed packets.
    pub fn pre_installed_files(&self) -> Vec<&PacketFile> {
        self.pre_installed.values().collect()
    }

    /// Group the two indexes by packet name. The selector consumes this view.
    pub fn all_by_name(&self) -> HashMap<&str, PacketPair<'_>> {
        let mut all: HashMap<&str, PacketPair<'_>> = HashMap::new();
        for (name, packet) in &self.pre_installed {
            all.entry(name.as_str()).or_default().pre_installed = Some(packet);
        }
        for (name, packet) in &self.data {
            all.entry(name.as_str()).or_default().data = Some(packet);
        }
        all
    }

    /// Forbid further mutation. Mutating a sealed repository is a
    /// programming error and panics.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    /// Test support: clear both indexes and unseal.
    pub fn reset(&mut self) {
        self.pre_installed.clear();
        self.data.clear();
        self.sealed = false;
    }
}
