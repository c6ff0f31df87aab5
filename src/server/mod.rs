//! HTTP API for rendering and serving animations.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────┐                 ┌─────────────────────────────┐
//! │  rouille worker threads  │                 │   Arc<AppState> (read-only) │
//! │  (one request each)      │ ──── & ──────▶  │   config / orchestrator /   │
//! │                          │                 │   presets / renderer probe  │
//! │  POST /render            │                 └─────────────────────────────┘
//! │    blocks up to timeout  │ ──▶ renderer subprocess
//! └──────────────────────────┘
//! ```
//!
//! - **rouille** - sync HTTP server; a blocking render simply occupies its worker
//! - **AppState** - built once at startup, never mutated, no locks held across renders
//!
//! # Endpoints
//!
//! | Method | Path                          | Description                         |
//! |--------|-------------------------------|-------------------------------------|
//! | GET    | `/health`                     | Renderer version probe              |
//! | POST   | `/render`                     | Render `{code, scene_name, quality}`|
//! | POST   | `/render-preset/{name}`       | Render preset with `{params, quality}` |
//! | GET    | `/scenes`                     | List preset scenes                  |
//! | GET    | `/video/{fingerprint}.{ext}`  | Cached video bytes                  |
//! | GET    | `/`, `/{path}`                | Static frontend (if configured)     |

mod api;

pub use api::{ApiServer, AppState};
