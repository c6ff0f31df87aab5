//! SCENECAST - on-demand animation renderer with a content-addressed video cache
//!
//! Re-exports all modules for use by the server binary.

pub mod cli;
pub mod config;
pub mod error;
pub mod render;
pub mod server;

pub use config::ServerConfig;
pub use error::{FailureKind, RenderError, RenderResult};
pub use render::{Fingerprint, Orchestrator, QualityTier, RenderRequest, RenderSuccess};
pub use server::{ApiServer, AppState};
