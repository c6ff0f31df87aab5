//! Deterministic cache key for a render request.
//!
//! SHA-256 over the length-prefixed request fields, in a fixed order:
//! source code, scene identifier, quality label. The key is the first
//! [`FINGERPRINT_LEN`] lowercase hex characters of the digest.
//!
//! Keys are byte-exact: two sources that differ only in whitespace are
//! different cache entries.

use sha2::{Digest, Sha256};
use std::fmt;

use super::request::RenderRequest;

pub const FINGERPRINT_LEN: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(request: &RenderRequest) -> Self {
        let mut hasher = Sha256::new();
        write_field(&mut hasher, request.source_code().as_bytes());
        write_field(&mut hasher, request.scene_identifier().as_bytes());
        write_field(&mut hasher, request.quality().label().as_bytes());
        let digest = hasher.finalize();

        let mut out = String::with_capacity(FINGERPRINT_LEN);
        for b in digest.iter().take(FINGERPRINT_LEN / 2) {
            out.push_str(&format!("{:02x}", b));
        }
        Self(out)
    }

    /// Accept an externally supplied stem (e.g. from a URL) if it is shaped like a key.
    pub fn parse(s: &str) -> Option<Self> {
        let ok = s.len() == FINGERPRINT_LEN
            && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        ok.then(|| Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn write_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}
