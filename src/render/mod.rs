//! Render-request lifecycle.
//!
//! ```text
//! request ─▶ presets / RenderRequest::direct ─▶ Orchestrator
//!                                                  │
//!                        Fingerprint ─▶ CacheStore::lookup ──hit──▶ ArtifactRef
//!                                                  │ miss
//!                        RenderEngine::invoke ─▶ ArtifactLocator::locate ─▶ CacheStore::commit
//! ```
//!
//! - [`request`] - canonical request and quality tiers
//! - [`fingerprint`] - cache key derivation
//! - [`cache`] - content-addressed video store
//! - [`presets`] - preset templates and `${key}` substitution
//! - [`invoker`] - renderer subprocess with timeout
//! - [`locator`] - artifact search in the renderer's output tree
//! - [`inflight`] - optional sharing of concurrent identical renders
//! - [`orchestrator`] - state machine tying it together

pub mod cache;
pub mod fingerprint;
pub mod inflight;
pub mod invoker;
pub mod locator;
pub mod orchestrator;
pub mod presets;
pub mod request;

pub use cache::{ArtifactRef, CacheStore};
pub use fingerprint::Fingerprint;
pub use invoker::{InvokeResult, RenderEngine, SubprocessRenderer};
pub use locator::ArtifactLocator;
pub use orchestrator::{Orchestrator, RenderOutcome, RenderState, RenderSuccess};
pub use presets::{PresetInfo, PresetLibrary};
pub use request::{QualityTier, RenderRequest};
