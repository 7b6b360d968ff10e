//! Core identity newtypes shared across the crate.

use std::borrow::Borrow;

/// The logical identity of a packet across versions.
///
/// Names are opaque strings; byte equality is identity. The newtype exists
/// so that name-keyed maps and APIs are self-documenting.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct PacketName(String);

impl PacketName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PacketName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Borrow<str> for PacketName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for PacketName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PacketName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl PartialEq<str> for PacketName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for PacketName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// A monotonic packet version.
///
/// Versions are strictly positive integers; higher is newer and comparisons
/// are total. Manifest validation rejects zero.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct PacketVersion(u64);

impl PacketVersion {
    pub fn new(version: u64) -> Self {
        Self(version)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for PacketVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for PacketVersion {
    fn from(v: u64) -> Self {
        Self(v)
    }
}
