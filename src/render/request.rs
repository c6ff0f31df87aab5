//! Canonical render requests and quality tiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Scene identifier used when a direct submission names none.
pub const DEFAULT_SCENE: &str = "MainScene";

/// Resolution/framerate profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    /// 480p, 15fps
    #[default]
    Low,
    /// 720p, 30fps
    Medium,
    /// 1080p, 60fps
    High,
}

impl QualityTier {
    /// Parse a client-supplied tier; anything unrecognised is `Low`.
    pub fn parse_lenient(s: &str) -> Self {
        match s {
            "low" => QualityTier::Low,
            "medium" => QualityTier::Medium,
            "high" => QualityTier::High,
            _ => QualityTier::Low,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            QualityTier::Low => "low",
            QualityTier::Medium => "medium",
            QualityTier::High => "high",
        }
    }

    /// Renderer command-line flag for this tier.
    pub fn renderer_flag(&self) -> &'static str {
        match self {
            QualityTier::Low => "-ql",
            QualityTier::Medium => "-qm",
            QualityTier::High => "-qh",
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One normalized render request. Immutable once built.
///
/// `scene_identifier` is expected to name a scene the source defines; that is
/// only checked by the renderer itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    source_code: String,
    scene_identifier: String,
    quality: QualityTier,
}

impl RenderRequest {
    pub fn new(
        source_code: impl Into<String>,
        scene_identifier: impl Into<String>,
        quality: QualityTier,
    ) -> Self {
        Self {
            source_code: source_code.into(),
            scene_identifier: scene_identifier.into(),
            quality,
        }
    }

    /// Build a request from raw client fields.
    ///
    /// Empty code is accepted and left for the renderer to reject. A missing
    /// scene falls back to [`DEFAULT_SCENE`], a missing or unknown tier to `low`.
    pub fn direct(code: String, scene_identifier: Option<String>, quality: Option<&str>) -> Self {
        let quality = quality.map(QualityTier::parse_lenient).unwrap_or_default();
        let scene = scene_identifier.unwrap_or_else(|| DEFAULT_SCENE.to_string());
        Self::new(code, scene, quality)
    }

    pub fn source_code(&self) -> &str {
        &self.source_code
    }

    pub fn scene_identifier(&self) -> &str {
        &self.scene_identifier
    }

    pub fn quality(&self) -> QualityTier {
        self.quality
    }
}
