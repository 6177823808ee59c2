//! Saffron Server
//!
//! Thin HTTP adapter over the engine: `POST /scrape` triggers the top-level
//! scraping workflow and returns a run id, `GET /message/{messageId}`
//! streams that run's progress as server-sent events, and `GET /` is a
//! welcome payload. The engine does the actual work; this crate only
//! translates between HTTP and the engine's trigger/subscribe operations.

mod app;
mod stream;

pub use app::{ApiError, AppState, build_app};
