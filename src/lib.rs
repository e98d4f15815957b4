// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod app;
pub mod cache;
pub mod classify;
pub mod config;
pub mod content_ideas;
pub mod dedup;
pub mod enhanced;
pub mod error;
pub mod filter;
pub mod llm;
pub mod metrics;
pub mod networks;
pub mod offer;
pub mod research;
pub mod scoring;
pub mod sources;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::app::app;
pub use crate::error::ResearchError;
