//! devjournal - developer journal server
//!
//! Mirrors Linear and notes into a local SQLite cache, keeps AI summaries
//! of the mirrored items and answers questions over a knowledge index built
//! from the journal and the caches.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod state;

pub use config::config;
pub use error::{Error, Result};
pub use state::AppState;
