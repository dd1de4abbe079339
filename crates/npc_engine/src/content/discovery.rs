use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::AppPaths;

use super::types::{ContentDiscoveryError, ContentRequest};

pub(crate) const BASE_MOD_ID: &str = "base";

#[derive(Debug, Clone)]
pub(crate) struct ModSource {
    pub mod_id: String,
    pub source_dir: PathBuf,
}

/// `base` first, then enabled mods in request order. A missing base folder
/// is allowed (built-in definitions apply); a missing enabled mod is not.
pub(crate) fn discover_mod_sources(
    app_paths: &AppPaths,
    request: &ContentRequest,
) -> Result<Vec<ModSource>, ContentDiscoveryError> {
    let mut seen = HashSet::<String>::new();
    let mut sources = Vec::with_capacity(request.enabled_mods.len() + 1);
    if app_paths.base_content_dir.is_dir() {
        sources.push(ModSource {
            mod_id: BASE_MOD_ID.to_string(),
            source_dir: app_paths.base_content_dir.clone(),
        });
    }

    for mod_id in &request.enabled_mods {
        let trimmed = mod_id.trim();
        if trimmed.is_empty() {
            return Err(ContentDiscoveryError::EmptyEnabledMod);
        }
        if trimmed == BASE_MOD_ID || !seen.insert(trimmed.to_string()) {
            return Err(ContentDiscoveryError::DuplicateEnabledMod {
                mod_id: trimmed.to_string(),
            });
        }
        let mod_dir = app_paths.mods_dir.join(trimmed);
        ensure_dir_exists(trimmed, &mod_dir)?;
        sources.push(ModSource {
            mod_id: trimmed.to_string(),
            source_dir: mod_dir,
        });
    }

    Ok(sources)
}

fn ensure_dir_exists(mod_id: &str, path: &Path) -> Result<(), ContentDiscoveryError> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(ContentDiscoveryError::EnabledModMissing {
            mod_id: mod_id.to_string(),
            expected_dir: path.to_path_buf(),
        })
    }
}
