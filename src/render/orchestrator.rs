//! Top-level render contract.
//!
//! # States
//!
//! ```text
//! CacheCheck ──hit──────────────────────────────────────────▶ Done(cached)
//!     │ miss
//!     ▼
//! Invoking ──err──▶ Failed(Timeout | RenderFailure | InvocationError)
//!     │ ok
//!     ▼
//! Locating ──none─▶ Failed(ArtifactMissing)
//!     │ path
//!     ▼
//! Committing ─io──▶ Failed(StorageError)
//!     │
//!     ▼
//!   Done(fresh)
//! ```
//!
//! No state retries. The orchestrator never writes into the cache dir itself;
//! that goes through [`CacheStore::commit`].

use log::{debug, info, warn};
use std::fmt;
use std::sync::Arc;

use crate::config::ServerConfig;
use crate::error::{RenderError, RenderResult};

use super::cache::{ArtifactRef, CacheStore};
use super::fingerprint::Fingerprint;
use super::inflight::{Claim, InFlight};
use super::invoker::{RenderEngine, SubprocessRenderer};
use super::locator::ArtifactLocator;
use super::request::RenderRequest;

/// Lifecycle stage of one request, used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    CacheCheck,
    Invoking,
    Locating,
    Committing,
    Done,
}

impl fmt::Display for RenderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Successful result of a render request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderSuccess {
    pub artifact: ArtifactRef,
    pub was_cached: bool,
}

pub type RenderOutcome = RenderResult<RenderSuccess>;

pub struct Orchestrator {
    cache: CacheStore,
    engine: Arc<dyn RenderEngine>,
    locator: ArtifactLocator,
    inflight: Option<InFlight>,
}

impl Orchestrator {
    pub fn new(cache: CacheStore, engine: Arc<dyn RenderEngine>, locator: ArtifactLocator) -> Self {
        Self {
            cache,
            engine,
            locator,
            inflight: None,
        }
    }

    /// Wire the production components from config.
    pub fn from_config(config: &ServerConfig) -> Self {
        let cache = CacheStore::new(&config.cache_dir, &config.video_extension);
        let engine = Arc::new(SubprocessRenderer::from_config(config));
        let locator = ArtifactLocator::new(&config.video_extension, config.max_scan_depth);
        let orchestrator = Self::new(cache, engine, locator);
        if config.coalesce_inflight {
            orchestrator.with_coalescing()
        } else {
            orchestrator
        }
    }

    /// Make concurrent identical requests share a single render.
    pub fn with_coalescing(mut self) -> Self {
        self.inflight = Some(InFlight::new());
        self
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Serve `request` from cache or render it.
    pub fn render(&self, request: &RenderRequest) -> RenderOutcome {
        let fingerprint = Fingerprint::of(request);
        debug!("[{}] {}", fingerprint, RenderState::CacheCheck);

        if let Some(hit) = self.cache_hit(&fingerprint) {
            return Ok(hit);
        }

        let Some(inflight) = &self.inflight else {
            return self.render_fresh(request, &fingerprint);
        };

        match inflight.claim(&fingerprint) {
            Claim::Leader(_guard) => {
                // Another leader may have committed between our check and the claim
                if let Some(hit) = self.cache_hit(&fingerprint) {
                    return Ok(hit);
                }
                self.render_fresh(request, &fingerprint)
            }
            // The leader failed if there is still nothing cached; render ourselves
            Claim::Waited => match self.cache_hit(&fingerprint) {
                Some(hit) => Ok(hit),
                None => self.render_fresh(request, &fingerprint),
            },
        }
    }

    fn cache_hit(&self, fingerprint: &Fingerprint) -> Option<RenderSuccess> {
        let artifact = self.cache.lookup(fingerprint)?;
        info!("[{}] cache hit -> {}", fingerprint, artifact.url);
        Some(RenderSuccess {
            artifact,
            was_cached: true,
        })
    }

    fn render_fresh(&self, request: &RenderRequest, fingerprint: &Fingerprint) -> RenderOutcome {
        let outcome = self.drive(request, fingerprint);
        if let Err(e) = &outcome {
            warn!("[{}] render failed ({}): {}", fingerprint, e.kind(), first_line(&e.to_string()));
        }
        outcome
    }

    fn drive(&self, request: &RenderRequest, fingerprint: &Fingerprint) -> RenderOutcome {
        debug!("[{}] {}", fingerprint, RenderState::Invoking);
        let invoked = self.engine.invoke(request, fingerprint)?;

        debug!("[{}] {}", fingerprint, RenderState::Locating);
        let Some(path) = self.locator.locate(&invoked.output_dir, fingerprint) else {
            return Err(RenderError::ArtifactMissing {
                stdout: invoked.stdout,
                stderr: invoked.stderr,
            });
        };

        debug!("[{}] {} {}", fingerprint, RenderState::Committing, path.display());
        let artifact = self
            .cache
            .commit(fingerprint, &path)
            .map_err(RenderError::StorageError)?;

        info!("[{}] {} -> {}", fingerprint, RenderState::Done, artifact.url);
        Ok(RenderSuccess {
            artifact,
            was_cached: false,
        })
    }
}

fn first_line(s: &str) -> &str {
    s.lines().next().unwrap_or("")
}
