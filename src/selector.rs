//! Activation selection.
//!
//! For every packet name there can be at most two candidates, pre-installed
//! and data. This module decides which of them activate. It is a pure
//! function over the repository's grouped view and never touches disk.

use std::collections::HashMap;

use crate::packet::PacketFile;
use crate::repository::{PacketPair, PacketRepository};

/// Pick the packets to activate.
///
/// A data candidate is eligible only when the repository knows a
/// pre-installed packet of the same name; a lone pre-installed candidate is
/// eligible only when the repository recognizes it as its own. When both are
/// eligible the higher version wins and the data copy wins ties, except for
/// shared-library packets, where both copies activate side by side.
pub fn select_for_activation<'a>(
    all: &HashMap<&'a str, PacketPair<'a>>,
    repository: &PacketRepository,
) -> Vec<&'a PacketFile> {
    let mut selected = Vec::new();
    for (name, pair) in all {
        match (pair.pre_installed, pair.data) {
            (None, None) => {}
            (Some(pre_installed), None) => {
                if repository.is_pre_installed(pre_installed) {
                    selected.push(pre_installed);
                } else {
                    tracing::warn!(
                        "not activating {}: unknown pre-installed packet",
                        pre_installed.path().display()
                    );
                }
            }
            (None, Some(data)) => {
                if repository.has_pre_installed(name) {
                    selected.push(data);
                } else {
                    tracing::warn!(
                        "not activating {}: no pre-installed packet named {}",
                        data.path().display(),
                        name
                    );
                }
            }
            (Some(pre_installed), Some(data)) => {
                let pre_eligible = repository.is_pre_installed(pre_installed);
                let data_eligible = repository.has_pre_installed(name);
                if pre_eligible && data_eligible {
                    if pre_installed.provides_shared_libraries() {
                        // Other packets may link against either version.
                        selected.push(pre_installed);
                        selected.push(data);
                    } else if data.version() >= pre_installed.version() {
                        selected.push(data);
                    } else {
                        selected.push(pre_installed);
                    }
                } else if pre_eligible {
                    selected.push(pre_installed);
                } else if data_eligible {
                    selected.push(data);
                }
            }
        }
    }
    selected
}
