//! Boot-time composition of the core.
//!
//! `Daemon` owns the repository and runs the fixed boot order: pre-installed
//! scan, decompression, data scan, seal. Afterwards it only reads.

use std::path::Path;

use crate::config::Config;
use crate::error::Result;
use crate::packet::PacketFile;
use crate::pipeline;
use crate::repository::PacketRepository;
use crate::selector;
use crate::types::PacketVersion;

pub struct Daemon {
    config: Config,
    repository: PacketRepository,
}

impl Daemon {
    /// Build the repository by running the boot sequence.
    ///
    /// Decompression runs between the two scans so that fresh outputs are
    /// visible to the data scan; the repository is sealed before the value
    /// is handed out.
    pub fn initialize(config: Config) -> Result<Self> {
        let mut repository = PacketRepository::new(&config.decompression_dir)
            .with_duplicate_allow_list(config.duplicate_warn_only.clone());
        repository.add_pre_installed(&config.pre_installed_dirs)?;

        let compressed: Vec<&PacketFile> = repository
            .pre_installed_files()
            .into_iter()
            .filter(|packet| packet.is_compressed())
            .collect();
        if !compressed.is_empty() {
            tracing::info!(
                "processing {} compressed pre-installed packet(s)",
                compressed.len()
            );
            pipeline::process_compressed(
                &compressed,
                &config.decompression_dir,
                &config.active_data_dir,
            );
        }

        repository.add_data(&config.active_data_dir, &config.decompression_dir)?;
        repository.seal();
        Ok(Self { config, repository })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn repository(&self) -> &PacketRepository {
        &self.repository
    }

    /// The packets to activate, verified against their trust anchors.
    ///
    /// A packet that fails verification is dropped from the list with a
    /// diagnostic; the mount layer never sees it.
    pub fn select_for_activation(&self) -> Vec<&PacketFile> {
        let all = self.repository.all_by_name();
        let selected = selector::select_for_activation(&all, &self.repository);
        selected
            .into_iter()
            .filter(|packet| {
                // A compressed packet in the selection means its decompressed
                // copy never materialized; it cannot be mounted.
                if packet.is_compressed() {
                    tracing::error!(
                        "dropping {} from activation: no usable decompressed copy",
                        packet.path().display()
                    );
                    return false;
                }
                true
            })
            .filter(|packet| match self.repository.get_public_key(packet.name()) {
                Ok(trusted_key) => match packet.verify(trusted_key) {
                    Ok(()) => true,
                    Err(err) => {
                        tracing::error!(
                            "dropping {} from activation: {err}",
                            packet.path().display()
                        );
                        false
                    }
                },
                Err(err) => {
                    tracing::error!(
                        "dropping {} from activation: {err}",
                        packet.path().display()
                    );
                    false
                }
            })
            .collect()
    }

    /// Run the decompression pipeline over the given compressed packets.
    pub fn process_compressed(&self, compressed: &[&PacketFile]) -> Vec<PacketFile> {
        pipeline::process_compressed(
            compressed,
            &self.config.decompression_dir,
            &self.config.active_data_dir,
        )
    }

    pub fn should_allocate_space_for_decompression(
        &self,
        name: &str,
        new_version: PacketVersion,
    ) -> bool {
        pipeline::should_allocate_for_decompression(&self.repository, name, new_version)
    }

    pub fn reserve_space_for_decompression(&self, bytes: i64, dest_dir: &Path) -> Result<()> {
        pipeline::reserve_space(bytes, dest_dir)
    }

    /// Garbage-collect decompression outputs that lost their active link.
    pub fn sweep_unlinked_decompressed(&self) -> Result<()> {
        pipeline::sweep_unlinked(&self.config.decompression_dir, &self.config.active_data_dir)
    }
}
