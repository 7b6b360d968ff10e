//! Packet container access.
//!
//! A packet is a ZIP container carrying a filesystem image, a manifest, a
//! bundled public key and a verity descriptor. `PacketFile` opens one and
//! exposes its identity; it is the only type in the crate that touches the
//! container layout.
//!
//! Uncompressed containers store the image under `payload.img`; compressed
//! containers store `packet.zst`, a zstd stream of the complete uncompressed
//! container, and their verity descriptor records the digest of the *inner*
//! image so decompression outputs can be validated against it.

pub mod manifest;

pub use manifest::{PacketManifest, MANIFEST_ENTRY};

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zip::ZipArchive;

use crate::error::{Error, Result};
use crate::scanner::has_suffix;
use crate::types::PacketVersion;
use crate::COMPRESSED_PACKET_SUFFIX;

/// Container entry holding the bundled public key.
pub const PUBLIC_KEY_ENTRY: &str = "public_key.avb";

/// Container entry holding the verity descriptor.
pub const VERITY_ENTRY: &str = "verity.json";

/// Image payload entry of an uncompressed packet.
pub const IMAGE_ENTRY: &str = "payload.img";

/// Payload entry of a compressed packet.
pub const COMPRESSED_IMAGE_ENTRY: &str = "packet.zst";

/// Integrity metadata bound to the image payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerityDescriptor {
    /// Lowercase-hex SHA-256 of the image payload.
    pub root_digest: String,
}

/// An opened packet container.
///
/// Identity fields are read once at open time; the payload is re-read from
/// disk on demand (digest verification, decompression).
#[derive(Debug)]
pub struct PacketFile {
    path: PathBuf,
    manifest: PacketManifest,
    public_key: Vec<u8>,
    verity: VerityDescriptor,
    image_offset: u64,
    image_size: u64,
    compressed: bool,
}

impl PacketFile {
    /// Open a packet container and read its identity.
    ///
    /// The container flavor is derived from the file suffix and the payload
    /// entry present; a mismatch between the two is an integrity violation.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mut archive = ZipArchive::new(file)?;

        let manifest = PacketManifest::from_slice(&read_entry(&mut archive, MANIFEST_ENTRY)?)?;

        let public_key = read_entry(&mut archive, PUBLIC_KEY_ENTRY)?;
        if public_key.is_empty() {
            return Err(Error::Integrity(format!(
                "{} has an empty bundled public key",
                path.display()
            )));
        }

        let verity: VerityDescriptor =
            serde_json::from_slice(&read_entry(&mut archive, VERITY_ENTRY)?)?;

        let suffix_compressed = has_suffix(path, COMPRESSED_PACKET_SUFFIX);
        let entry_compressed = archive.file_names().any(|n| n == COMPRESSED_IMAGE_ENTRY);
        if suffix_compressed != entry_compressed {
            return Err(Error::Integrity(format!(
                "{} : file suffix does not match its payload entry",
                path.display()
            )));
        }

        let payload_entry = if suffix_compressed {
            COMPRESSED_IMAGE_ENTRY
        } else {
            IMAGE_ENTRY
        };
        let (image_offset, image_size) = {
            let entry = archive.by_name(payload_entry)?;
            (entry.data_start(), entry.size())
        };

        Ok(Self {
            path: path.to_path_buf(),
            manifest,
            public_key,
            verity,
            image_offset,
            image_size,
            compressed: suffix_compressed,
        })
    }

    pub fn name(&self) -> &str {
        self.manifest.name.as_str()
    }

    pub fn version(&self) -> PacketVersion {
        self.manifest.version
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn manifest(&self) -> &PacketManifest {
        &self.manifest
    }

    pub fn bundled_public_key(&self) -> &[u8] {
        &self.public_key
    }

    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    /// Byte offset of the image payload inside the container.
    pub fn image_offset(&self) -> u64 {
        self.image_offset
    }

    pub fn image_size(&self) -> u64 {
        self.image_size
    }

    pub fn provides_shared_libraries(&self) -> bool {
        self.manifest.provides_shared_libraries
    }

    pub fn verity_root_digest(&self) -> &str {
        &self.verity.root_digest
    }

    /// Verify this packet against a trusted public key.
    ///
    /// Checks byte-equality of the bundled key and, for an uncompressed
    /// packet, recomputes the payload digest against the verity descriptor.
    /// A compressed packet's payload digest refers to its decompressed form
    /// and is checked after decompression instead.
    pub fn verify(&self, trusted_key: &[u8]) -> Result<()> {
        if self.public_key != trusted_key {
            return Err(Error::Integrity(format!(
                "bundled public key of {} does not match the trust anchor",
                self.path.display()
            )));
        }
        if !self.compressed {
            let digest = self.compute_payload_digest()?;
            if digest != self.verity.root_digest {
                return Err(Error::Integrity(format!(
                    "verity root digest mismatch for {}: expected {}, computed {}",
                    self.path.display(),
                    self.verity.root_digest,
                    digest
                )));
            }
        }
        Ok(())
    }

    /// Stream the decompressed form of a compressed packet into `writer`.
    pub fn decompress_payload_into<W: Write>(&self, writer: &mut W) -> Result<()> {
        if !self.compressed {
            return Err(Error::InvalidArgument(format!(
                "{} is not a compressed packet",
                self.path.display()
            )));
        }
        let file = File::open(&self.path)?;
        let mut archive = ZipArchive::new(file)?;
        let entry = archive.by_name(COMPRESSED_IMAGE_ENTRY)?;
        let mut decoder = zstd::stream::Decoder::new(entry)?;
        io::copy(&mut decoder, writer)?;
        Ok(())
    }

    /// SHA-256 of the image payload, lowercase hex.
    pub fn compute_payload_digest(&self) -> Result<String> {
        let file = File::open(&self.path)?;
        let mut archive = ZipArchive::new(file)?;
        let mut entry = archive.by_name(IMAGE_ENTRY)?;
        let mut hasher = Sha256::new();
        io::copy(&mut entry, &mut hasher)?;
        Ok(format!("{:x}", hasher.finalize()))
    }
}

/// Check a decompression output against the compressed packet it came from.
///
/// Both must agree on name, version and bundled key, and the output's
/// recomputed payload digest must match the digest recorded in the
/// compressed packet's verity descriptor.
pub fn validate_decompressed(compressed: &PacketFile, candidate: &PacketFile) -> Result<()> {
    if candidate.name() != compressed.name() {
        return Err(Error::Integrity(format!(
            "{} carries name {}, expected {}",
            candidate.path().display(),
            candidate.name(),
            compressed.name()
        )));
    }
    if candidate.version() != compressed.version() {
        return Err(Error::Integrity(format!(
            "{} carries version {}, expected {}",
            candidate.path().display(),
            candidate.version(),
            compressed.version()
        )));
    }
    if candidate.bundled_public_key() != compressed.bundled_public_key() {
        return Err(Error::Integrity(format!(
            "bundled public key of {} does not match {}",
            candidate.path().display(),
            compressed.path().display()
        )));
    }
    let digest = candidate.compute_payload_digest()?;
    if digest != compressed.verity_root_digest() {
        return Err(Error::Integrity(format!(
            "verity root digest of {} does not match the descriptor of {}",
            candidate.path().display(),
            compressed.path().display()
        )));
    }
    Ok(())
}

fn read_entry(archive: &mut ZipArchive<File>, name: &str) -> Result<Vec<u8>> {
    let mut entry = archive.by_name(name)?;
    let mut buf = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;
    use tempfile::tempdir;
    use zip::write::FileOptions;
    use zip::{CompressionMethod, ZipWriter};

    fn write_container(path: &Path, entries: &[(&str, Vec<u8>)]) {
        let file = File::create(path).unwrap();
        let mut zip = ZipWriter::new(file);
        let stored = FileOptions::default().compression_method(CompressionMethod::Stored);
        for (name, bytes) in entries {
            zip.start_file(*name, stored).unwrap();
            zip.write_all(bytes).unwrap();
        }
        zip.finish().unwrap();
    }

    fn digest_hex(bytes: &[u8]) -> String {
        format!("{:x}", Sha256::digest(bytes))
    }

    fn write_test_packet(path: &Path, name: &str, version: u64, key: &[u8], payload: &[u8]) {
        write_container(
            path,
            &[
                (
                    MANIFEST_ENTRY,
                    format!(r#"{{"name":"{name}","version":{version}}}"#).into_bytes(),
                ),
                (PUBLIC_KEY_ENTRY, key.to_vec()),
                (
                    VERITY_ENTRY,
                    format!(r#"{{"root_digest":"{}"}}"#, digest_hex(payload)).into_bytes(),
                ),
                (IMAGE_ENTRY, payload.to_vec()),
            ],
        );
    }

    #[test]
    fn opens_uncompressed_packet() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("net.packet");
        write_test_packet(&path, "com.example.net", 2, b"key", b"image-bytes");

        let packet = PacketFile::open(&path).unwrap();
        assert_eq!(packet.name(), "com.example.net");
        assert_eq!(packet.version().get(), 2);
        assert_eq!(packet.bundled_public_key(), b"key");
        assert!(!packet.is_compressed());
        assert_eq!(packet.image_size(), b"image-bytes".len() as u64);
        assert!(packet.image_offset() > 0);
    }

    #[test]
    fn verify_checks_key_and_digest() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("net.packet");
        write_test_packet(&path, "com.example.net", 1, b"key", b"image-bytes");

        let packet = PacketFile::open(&path).unwrap();
        packet.verify(b"key").unwrap();
        assert!(matches!(
            packet.verify(b"other-key"),
            Err(Error::Integrity(_))
        ));
    }

    #[test]
    fn verify_detects_corrupt_descriptor() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("net.packet");
        write_container(
            &path,
            &[
                (
                    MANIFEST_ENTRY,
                    br#"{"name":"com.example.net","version":1}"#.to_vec(),
                ),
                (PUBLIC_KEY_ENTRY, b"key".to_vec()),
                (
                    VERITY_ENTRY,
                    format!(r#"{{"root_digest":"{}"}}"#, digest_hex(b"other")).into_bytes(),
                ),
                (IMAGE_ENTRY, b"image-bytes".to_vec()),
            ],
        );

        let packet = PacketFile::open(&path).unwrap();
        assert!(matches!(packet.verify(b"key"), Err(Error::Integrity(_))));
    }

    #[test]
    fn rejects_suffix_payload_mismatch() {
        let dir = tempdir().unwrap();
        // Compressed payload entry under an uncompressed suffix.
        let path = dir.path().join("net.packet");
        write_container(
            &path,
            &[
                (
                    MANIFEST_ENTRY,
                    br#"{"name":"com.example.net","version":1}"#.to_vec(),
                ),
                (PUBLIC_KEY_ENTRY, b"key".to_vec()),
                (
                    VERITY_ENTRY,
                    format!(r#"{{"root_digest":"{}"}}"#, digest_hex(b"x")).into_bytes(),
                ),
                (COMPRESSED_IMAGE_ENTRY, b"not-a-real-stream".to_vec()),
            ],
        );
        assert!(matches!(
            PacketFile::open(&path),
            Err(Error::Integrity(_))
        ));
    }

    #[test]
    fn rejects_missing_entries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("net.packet");
        write_container(
            &path,
            &[(
                MANIFEST_ENTRY,
                br#"{"name":"com.example.net","version":1}"#.to_vec(),
            )],
        );
        assert!(PacketFile::open(&path).is_err());
    }

    #[test]
    fn rejects_empty_public_key() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("net.packet");
        write_container(
            &path,
            &[
                (
                    MANIFEST_ENTRY,
                    br#"{"name":"com.example.net","version":1}"#.to_vec(),
                ),
                (PUBLIC_KEY_ENTRY, Vec::new()),
                (
                    VERITY_ENTRY,
                    format!(r#"{{"root_digest":"{}"}}"#, digest_hex(b"x")).into_bytes(),
                ),
                (IMAGE_ENTRY, b"x".to_vec()),
            ],
        );
        assert!(matches!(
            PacketFile::open(&path),
            Err(Error::Integrity(_))
        ));
    }

    #[test]
    fn not_a_container_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("junk.packet");
        fs::write(&path, b"not a zip archive").unwrap();
        assert!(matches!(
            PacketFile::open(&path),
            Err(Error::Container(_))
        ));
    }
}
