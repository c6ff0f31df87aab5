//! Preset scenes: named source templates with `${key}` placeholders.
//!
//! Presets are read straight from the scenes directory on every request; the
//! directory is small and editing a preset should take effect immediately.

use log::debug;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::error::{RenderError, RenderResult};

use super::request::{QualityTier, RenderRequest};

/// Entry in the preset listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresetInfo {
    pub name: String,
    pub file: String,
}

#[derive(Debug, Clone)]
pub struct PresetLibrary {
    dir: PathBuf,
    extension: String,
}

impl PresetLibrary {
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Enumerate preset files, sorted by name. A missing directory lists nothing.
    pub fn list(&self) -> Vec<PresetInfo> {
        let pattern = self.dir.join(format!("*.{}", self.extension));
        let Some(pattern) = pattern.to_str() else {
            return Vec::new();
        };
        let Ok(paths) = glob::glob(pattern) else {
            return Vec::new();
        };

        let mut scenes: Vec<PresetInfo> = paths
            .flatten()
            .filter(|p| p.is_file())
            .filter_map(|p| {
                let name = p.file_stem()?.to_str()?.to_string();
                let file = p.file_name()?.to_str()?.to_string();
                Some(PresetInfo { name, file })
            })
            .collect();
        scenes.sort_by(|a, b| a.name.cmp(&b.name));
        scenes
    }

    /// Load the raw template text of a preset.
    pub fn load(&self, name: &str) -> RenderResult<String> {
        if !is_plain_name(name) {
            return Err(RenderError::NotFound(name.to_string()));
        }
        let path = self.dir.join(format!("{}.{}", name, self.extension));
        if !path.is_file() {
            return Err(RenderError::NotFound(name.to_string()));
        }
        std::fs::read_to_string(&path).map_err(|e| {
            debug!("Preset {} unreadable: {}", path.display(), e);
            RenderError::NotFound(name.to_string())
        })
    }

    /// Resolve a preset into a render request.
    ///
    /// The scene identifier is the preset name unless `scene_override` is given.
    pub fn resolve<K, V>(
        &self,
        name: &str,
        params: &[(K, V)],
        quality: QualityTier,
        scene_override: Option<String>,
    ) -> RenderResult<RenderRequest>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let template = self.load(name)?;
        let code = substitute(&template, params);
        let scene = scene_override.unwrap_or_else(|| name.to_string());
        debug!("Preset {} resolved with {} params", name, params.len());
        Ok(RenderRequest::new(code, scene, quality))
    }
}

/// Replace every `${key}` with its value, one key at a time over the whole text.
///
/// Later keys see the output of earlier replacements. Placeholders with no
/// matching key are left verbatim.
pub fn substitute<K, V>(template: &str, params: &[(K, V)]) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut code = template.to_string();
    for (key, value) in params {
        let placeholder = format!("${{{}}}", key.as_ref());
        code = code.replace(&placeholder, value.as_ref());
    }
    code
}

// Preset names come from URLs; keep them inside the scenes dir.
fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\'])
        && !name.contains("..")
}
