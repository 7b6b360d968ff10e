//! Packet manifest decoding.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{PacketName, PacketVersion};

/// Container entry holding the manifest.
pub const MANIFEST_ENTRY: &str = "manifest.json";

/// Identity and flags carried inside every packet container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacketManifest {
    pub name: PacketName,
    pub version: PacketVersion,
    /// Packets flagged here provide libraries consumed by other packets;
    /// two versions of such a packet may be active simultaneously.
    #[serde(default)]
    pub provides_shared_libraries: bool,
}

impl PacketManifest {
    /// Decode and validate a manifest from raw container-entry bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let manifest: Self = serde_json::from_slice(bytes)?;
        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> Result<()> {
        if self.name.as_str().is_empty() {
            return Err(Error::Integrity("manifest has an empty name".to_string()));
        }
        if self.version.get() == 0 {
            return Err(Error::Integrity(format!(
                "manifest for {} has version 0; versions are strictly positive",
                self.name
            )));
        }
        Ok(())
    }
}
