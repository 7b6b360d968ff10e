//! Shared test fixtures: a temp-dir mirror of the on-device directory
//! layout and a builder producing real packet containers.
#![allow(dead_code)]

use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tempfile::TempDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use packetd::config::Config;
use packetd::repository::PacketRepository;

pub const KEY_A: &[u8] = b"trusted-key-alpha";
pub const KEY_B: &[u8] = b"trusted-key-beta";

pub struct TestContext {
    _temp: TempDir,
    pub built_in_dir: PathBuf,
    pub data_dir: PathBuf,
    pub decompression_dir: PathBuf,
}

impl TestContext {
    pub fn new() -> Self {
        let temp = TempDir::new().expect("failed to create temp dir");
        let built_in_dir = temp.path().join("pre-installed");
        let data_dir = temp.path().join("active-data");
        let decompression_dir = temp.path().join("decompressed");
        for dir in [&built_in_dir, &data_dir, &decompression_dir] {
            fs::create_dir_all(dir).expect("failed to create test dir");
        }
        Self {
            _temp: temp,
            built_in_dir,
            data_dir,
            decompression_dir,
        }
    }

    pub fn config(&self) -> Config {
        Config {
            pre_installed_dirs: vec![self.built_in_dir.clone()],
            active_data_dir: self.data_dir.clone(),
            decompression_dir: self.decompression_dir.clone(),
            duplicate_warn_only: Vec::new(),
        }
    }

    pub fn repository(&self) -> PacketRepository {
        PacketRepository::new(&self.decompression_dir)
    }

    /// A scratch directory outside the three standard ones.
    pub fn scratch_dir(&self, name: &str) -> PathBuf {
        let dir = self._temp.path().join(name);
        fs::create_dir_all(&dir).expect("failed to create scratch dir");
        dir
    }
}

pub fn digest_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Serialize an uncompressed packet container to bytes.
pub fn packet_bytes(name: &str, version: u64, key: &[u8], payload: &[u8], shared: bool) -> Vec<u8> {
    packet_bytes_with_digest(name, version, key, payload, shared, &digest_hex(payload))
}

/// Same as `packet_bytes`, but with an explicit verity root digest, for
/// building deliberately corrupt containers.
pub fn packet_bytes_with_digest(
    name: &str,
    version: u64,
    key: &[u8],
    payload: &[u8],
    shared: bool,
    root_digest: &str,
) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let stored = FileOptions::default().compression_method(CompressionMethod::Stored);

    let manifest = serde_json::json!({
        "name": name,
        "version": version,
        "provides_shared_libraries": shared,
    });
    zip.start_file("manifest.json", stored).unwrap();
    zip.write_all(manifest.to_string().as_bytes()).unwrap();

    zip.start_file("public_key.avb", stored).unwrap();
    zip.write_all(key).unwrap();

    let verity = serde_json::json!({ "root_digest": root_digest });
    zip.start_file("verity.json", stored).unwrap();
    zip.write_all(verity.to_string().as_bytes()).unwrap();

    zip.start_file("payload.img", stored).unwrap();
    zip.write_all(payload).unwrap();

    zip.finish().unwrap().into_inner()
}

pub fn write_packet(path: &Path, name: &str, version: u64, key: &[u8], payload: &[u8]) {
    fs::write(path, packet_bytes(name, version, key, payload, false)).unwrap();
}

pub fn write_shared_libs_packet(path: &Path, name: &str, version: u64, key: &[u8], payload: &[u8]) {
    fs::write(path, packet_bytes(name, version, key, payload, true)).unwrap();
}

/// Write a packet whose verity descriptor does not match its payload.
pub fn write_corrupt_packet(path: &Path, name: &str, version: u64, key: &[u8], payload: &[u8]) {
    fs::write(
        path,
        packet_bytes_with_digest(name, version, key, payload, false, &digest_hex(b"corrupt")),
    )
    .unwrap();
}

/// Write a compressed packet container wrapping the uncompressed packet the
/// builder derives from the same identity. Returns the inner packet bytes,
/// which are what decompression is expected to reproduce.
pub fn write_compressed_packet(
    path: &Path,
    name: &str,
    version: u64,
    key: &[u8],
    payload: &[u8],
) -> Vec<u8> {
    let inner = packet_bytes(name, version, key, payload, false);
    write_compressed_container(path, name, version, key, &inner, &digest_hex(payload));
    inner
}

/// Compressed packet whose recorded digest will never match its output.
pub fn write_compressed_packet_bad_digest(
    path: &Path,
    name: &str,
    version: u64,
    key: &[u8],
    payload: &[u8],
) {
    let inner = packet_bytes(name, version, key, payload, false);
    write_compressed_container(path, name, version, key, &inner, &digest_hex(b"corrupt"));
}

fn write_compressed_container(
    path: &Path,
    name: &str,
    version: u64,
    key: &[u8],
    inner: &[u8],
    root_digest: &str,
) {
    let compressed_inner = zstd::encode_all(inner, 0).unwrap();

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let stored = FileOptions::default().compression_method(CompressionMethod::Stored);

    let manifest = serde_json::json!({
        "name": name,
        "version": version,
        "provides_shared_libraries": false,
    });
    zip.start_file("manifest.json", stored).unwrap();
    zip.write_all(manifest.to_string().as_bytes()).unwrap();

    zip.start_file("public_key.avb", stored).unwrap();
    zip.write_all(key).unwrap();

    let verity = serde_json::json!({ "root_digest": root_digest });
    zip.start_file("verity.json", stored).unwrap();
    zip.write_all(verity.to_string().as_bytes()).unwrap();

    zip.start_file("packet.zst", stored).unwrap();
    zip.write_all(&compressed_inner).unwrap();

    fs::write(path, zip.finish().unwrap().into_inner()).unwrap();
}
