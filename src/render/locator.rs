//! Find the video a render produced inside the renderer's output tree.
//!
//! The renderer nests its output under directories derived from the source
//! file name and quality (e.g. `videos/scene-ab12/480p15/<fingerprint>.mp4`),
//! so the path cannot be predicted from the request. The walk is bounded in
//! depth and visits entries in file-name order, making the first match stable.

use log::debug;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::fingerprint::Fingerprint;

#[derive(Debug, Clone)]
pub struct ArtifactLocator {
    extension: String,
    max_depth: usize,
}

impl ArtifactLocator {
    pub fn new(extension: impl Into<String>, max_depth: usize) -> Self {
        Self {
            extension: extension.into(),
            max_depth,
        }
    }

    /// First file under `output_dir` whose name contains `fingerprint` and
    /// carries the expected extension.
    pub fn locate(&self, output_dir: &Path, fingerprint: &Fingerprint) -> Option<PathBuf> {
        let found = WalkDir::new(output_dir)
            .max_depth(self.max_depth)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .find(|entry| self.matches(entry.path(), fingerprint))
            .map(|entry| entry.into_path());

        debug!(
            "Locate {} under {}: {:?}",
            fingerprint,
            output_dir.display(),
            found
        );
        found
    }

    fn matches(&self, path: &Path, fingerprint: &Fingerprint) -> bool {
        let ext_ok = path.extension().and_then(|e| e.to_str()) == Some(self.extension.as_str());
        let name_ok = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.contains(fingerprint.as_str()));
        ext_ok && name_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::request::{QualityTier, RenderRequest};

    fn fp() -> Fingerprint {
        Fingerprint::of(&RenderRequest::new("code", "Scene", QualityTier::Low))
    }

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"x").unwrap();
    }

    /// Test: Nested artifact
    /// Validates: recursive search finds the renderer's nested output
    #[test]
    fn test_locate_nested() {
        let dir = tempfile::tempdir().unwrap();
        let f = fp();
        let expected = dir.path().join(format!("videos/scene-q1/480p15/{}.mp4", f));
        touch(&expected);
        touch(&dir.path().join("videos/scene-q1/480p15/partial_movie_files/Scene/000.mp4"));

        let locator = ArtifactLocator::new("mp4", 8);
        assert_eq!(locator.locate(dir.path(), &f), Some(expected));
    }

    /// Test: Extension and name filters
    /// Validates: wrong extension or foreign fingerprint is not a match
    #[test]
    fn test_locate_filters() {
        let dir = tempfile::tempdir().unwrap();
        let f = fp();
        touch(&dir.path().join(format!("images/{}.png", f)));
        touch(&dir.path().join("videos/aaaaaaaaaaaa.mp4"));

        let locator = ArtifactLocator::new("mp4", 8);
        assert_eq!(locator.locate(dir.path(), &f), None);
    }

    /// Test: Deterministic order
    /// Validates: with several matches, the lexicographically first path wins
    #[test]
    fn test_locate_first_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let f = fp();
        touch(&dir.path().join(format!("b/{}.mp4", f)));
        touch(&dir.path().join(format!("a/{}.mp4", f)));

        let locator = ArtifactLocator::new("mp4", 8);
        assert_eq!(
            locator.locate(dir.path(), &f),
            Some(dir.path().join(format!("a/{}.mp4", f)))
        );
    }

    /// Test: Depth bound
    /// Validates: artifacts deeper than max_depth are not visited
    #[test]
    fn test_locate_depth_bound() {
        let dir = tempfile::tempdir().unwrap();
        let f = fp();
        touch(&dir.path().join(format!("1/2/3/4/{}.mp4", f)));

        assert_eq!(ArtifactLocator::new("mp4", 3).locate(dir.path(), &f), None);
        assert!(ArtifactLocator::new("mp4", 5).locate(dir.path(), &f).is_some());
    }

    /// Test: Missing tree
    /// Validates: absent output dir is simply no match
    #[test]
    fn test_locate_missing_dir() {
        let locator = ArtifactLocator::new("mp4", 8);
        assert_eq!(locator.locate(Path::new("/no/such/output"), &fp()), None);
    }
}
