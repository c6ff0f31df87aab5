//! Content-addressed store of finished videos.
//!
//! **Used by**: Orchestrator (lookup/commit), API (`/video/<fingerprint>.<ext>`)
//!
//! # Layout
//!
//! One flat directory, one file per fingerprint: `<cache_dir>/<fingerprint>.<ext>`.
//! Entries are never mutated in place and never evicted.
//!
//! # Concurrency
//!
//! No locks. `commit` copies into a private temp file inside the cache dir and
//! renames it over the final name, so readers see either no entry or a complete
//! one. Racing commits of the same fingerprint both succeed; the last rename wins.

use log::debug;
use std::io;
use std::path::{Path, PathBuf};

use super::fingerprint::Fingerprint;

/// Route prefix cached videos are served under.
pub const VIDEO_ROUTE: &str = "/video";

/// Where a cached video lives and how clients fetch it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    pub fingerprint: Fingerprint,
    /// File name inside the cache dir
    pub file_name: String,
    /// Servable URL path, e.g. `/video/0123456789ab.mp4`
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
    extension: String,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Map a fingerprint to its servable reference. Touches no files.
    pub fn resolve(&self, fingerprint: &Fingerprint) -> ArtifactRef {
        let file_name = format!("{}.{}", fingerprint, self.extension);
        ArtifactRef {
            fingerprint: fingerprint.clone(),
            url: format!("{}/{}", VIDEO_ROUTE, file_name),
            file_name,
        }
    }

    /// On-disk location for a fingerprint (whether or not it exists).
    pub fn path_of(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.dir.join(self.resolve(fingerprint).file_name)
    }

    /// Existence check only; a single stat.
    pub fn lookup(&self, fingerprint: &Fingerprint) -> Option<ArtifactRef> {
        self.path_of(fingerprint)
            .is_file()
            .then(|| self.resolve(fingerprint))
    }

    /// Copy `source` into the cache under the fingerprint's name.
    ///
    /// Idempotent per fingerprint. The source file is left in place.
    pub fn commit(&self, fingerprint: &Fingerprint, source: &Path) -> io::Result<ArtifactRef> {
        std::fs::create_dir_all(&self.dir)?;

        let mut staged = tempfile::Builder::new()
            .prefix(&format!(".{}-", fingerprint))
            .suffix(".part")
            .tempfile_in(&self.dir)?;
        let mut src = std::fs::File::open(source)?;
        let bytes = io::copy(&mut src, staged.as_file_mut())?;
        staged.as_file().sync_all()?;

        let dest = self.path_of(fingerprint);
        staged.persist(&dest).map_err(|e| e.error)?;

        debug!(
            "Cache commit {}: {} bytes from {} -> {}",
            fingerprint,
            bytes,
            source.display(),
            dest.display()
        );
        Ok(self.resolve(fingerprint))
    }

    /// Resolve a requested `<fingerprint>.<ext>` file name to a cached file.
    ///
    /// Returns `None` for anything not shaped like a cache entry, or absent.
    pub fn open_path(&self, file_name: &str) -> Option<PathBuf> {
        let (stem, ext) = file_name.rsplit_once('.')?;
        if ext != self.extension {
            return None;
        }
        let fingerprint = Fingerprint::parse(stem)?;
        let path = self.path_of(&fingerprint);
        path.is_file().then_some(path)
    }
}
