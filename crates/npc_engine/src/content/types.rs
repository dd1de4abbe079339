use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentRequest {
    /// Mod folder names under `mods/`, applied in order after `base`.
    pub enabled_mods: Vec<String>,
}

impl ContentRequest {
    /// Parses a comma separated mod list, skipping blank entries.
    pub fn from_mod_list(raw: &str) -> Self {
        Self {
            enabled_mods: raw
                .split(',')
                .map(str::trim)
                .filter(|entry| !entry.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ContentDiscoveryError {
    #[error("enabled mod id cannot be empty")]
    EmptyEnabledMod,
    #[error("duplicate enabled mod id in request: {mod_id}")]
    DuplicateEnabledMod { mod_id: String },
    #[error("enabled mod does not exist on disk: {mod_id} at {expected_dir}")]
    EnabledModMissing {
        mod_id: String,
        expected_dir: PathBuf,
    },
}
