//! Server configuration and filesystem roots.
//!
//! One [`ServerConfig`] is built at startup and shared by `Arc` with every
//! component. Nothing reads directories or settings from globals.
//!
//! Root directory priority:
//! 1. CLI `--root` argument
//! 2. `SCENECAST_ROOT` environment variable
//! 3. Current directory IF `scenecast.json` exists there
//! 4. Platform data directory from dirs-next (default)
//!
//! Platform paths:
//! - Linux: ~/.local/share/scenecast
//! - macOS: ~/Library/Application Support/scenecast
//! - Windows: %APPDATA%\scenecast

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the optional config file looked up in the root directory.
pub const CONFIG_FILE: &str = "scenecast.json";

const ROOT_ENV: &str = "SCENECAST_ROOT";

/// Runtime settings for the render server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Preset scene sources (read-only)
    pub scenes_dir: PathBuf,
    /// Scratch tree the renderer writes into
    pub output_dir: PathBuf,
    /// Durable fingerprint-named videos
    pub cache_dir: PathBuf,
    /// Optional frontend files served on `/`
    pub static_dir: Option<PathBuf>,
    /// Renderer executable
    pub renderer: String,
    pub render_timeout_secs: u64,
    pub probe_timeout_secs: u64,
    pub video_extension: String,
    pub scene_extension: String,
    pub max_scan_depth: usize,
    /// Share one render between concurrent identical requests
    pub coalesce_inflight: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::with_root(Path::new("."))
    }
}

impl ServerConfig {
    /// Default settings with the three roots placed under `root`.
    pub fn with_root(root: &Path) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            scenes_dir: root.join("scenes"),
            output_dir: root.join("render_output"),
            cache_dir: root.join("cache"),
            static_dir: None,
            renderer: "manim".to_string(),
            render_timeout_secs: 120,
            probe_timeout_secs: 10,
            video_extension: "mp4".to_string(),
            scene_extension: "py".to_string(),
            max_scan_depth: 8,
            coalesce_inflight: false,
        }
    }

    /// Load settings for `root`, reading `config_file` (or `<root>/scenecast.json`) when present.
    ///
    /// Relative directories in the file are resolved against `root`.
    pub fn load(root: &Path, config_file: Option<&Path>) -> Result<Self> {
        let default_file = root.join(CONFIG_FILE);
        let file = match config_file {
            Some(p) => Some(p.to_path_buf()),
            None if default_file.is_file() => Some(default_file),
            None => None,
        };

        let Some(file) = file else {
            return Ok(Self::with_root(root));
        };

        let text = std::fs::read_to_string(&file)
            .with_context(|| format!("Failed to read config file: {}", file.display()))?;
        let mut cfg = Self::from_json(&text, root)
            .with_context(|| format!("Failed to parse config file: {}", file.display()))?;
        cfg.absolutize(root);
        Ok(cfg)
    }

    /// Parse JSON settings; missing fields take defaults rooted at `root`.
    pub fn from_json(text: &str, root: &Path) -> Result<Self> {
        let mut value: serde_json::Value = serde_json::from_str(text)?;
        let defaults = serde_json::to_value(Self::with_root(root))?;
        // Fill gaps from the rooted defaults rather than from `Default` (which uses ".")
        if let (Some(obj), serde_json::Value::Object(defaults)) = (value.as_object_mut(), defaults) {
            for (k, v) in defaults {
                obj.entry(k).or_insert(v);
            }
        }
        Ok(serde_json::from_value(value)?)
    }

    fn absolutize(&mut self, root: &Path) {
        for dir in [&mut self.scenes_dir, &mut self.output_dir, &mut self.cache_dir] {
            if dir.is_relative() {
                *dir = root.join(&*dir);
            }
        }
        if let Some(dir) = self.static_dir.as_mut() {
            if dir.is_relative() {
                *dir = root.join(&*dir);
            }
        }
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Reject settings the render lifecycle cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.render_timeout_secs == 0 || self.probe_timeout_secs == 0 {
            bail!("timeouts must be non-zero");
        }
        if self.renderer.trim().is_empty() {
            bail!("renderer executable must be set");
        }
        if self.video_extension.is_empty() || self.video_extension.contains(['/', '\\', '.']) {
            bail!("invalid video extension: '{}'", self.video_extension);
        }
        let roots = [
            ("scenes_dir", &self.scenes_dir),
            ("output_dir", &self.output_dir),
            ("cache_dir", &self.cache_dir),
        ];
        for (i, (a_name, a)) in roots.iter().enumerate() {
            for (b_name, b) in &roots[i + 1..] {
                if a == b {
                    bail!("{} and {} must be different directories ({})", a_name, b_name, a.display());
                }
                // Component-wise: `/r/cache2` is not inside `/r/cache`.
                if a.starts_with(b) || b.starts_with(a) {
                    bail!(
                        "{} ({}) and {} ({}) must not be nested",
                        a_name,
                        a.display(),
                        b_name,
                        b.display()
                    );
                }
            }
        }
        Ok(())
    }
}

/// Resolve the root directory that holds scenes, output and cache.
pub fn resolve_root(cli_root: Option<PathBuf>) -> PathBuf {
    // Priority 1: CLI, then ENV
    if let Some(dir) = cli_root.or_else(|| std::env::var(ROOT_ENV).ok().map(PathBuf::from)) {
        return dir;
    }

    // Priority 2: Local folder IF a config file exists there
    if let Ok(current_dir) = std::env::current_dir() {
        if current_dir.join(CONFIG_FILE).is_file() {
            return current_dir;
        }
    }

    // Priority 3: Platform-specific data directory
    if let Some(dir) = dirs_next::data_dir() {
        return dir.join("scenecast");
    }

    PathBuf::from(".")
}

/// Ensure scenes, output and cache directories exist.
pub fn ensure_dirs(config: &ServerConfig) -> Result<()> {
    for dir in [&config.scenes_dir, &config.output_dir, &config.cache_dir] {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    }
    Ok(())
}
