//! Kometa config wizard backend
//!
//! Profile storage, deterministic Kometa YAML generation and a WebSocket sync
//! hub that keeps every open wizard view consistent and controls the single
//! Kometa run slot.

pub mod api;
pub mod core;
pub mod hub;

// Re-export commonly used types
pub use api::{ApiServer, ServerExit};
pub use crate::core::{Config, Profile, ProfileStore, WizardError};
pub use hub::{HubService, SyncHub};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Result type alias for the binary boundary
pub type Result<T> = anyhow::Result<T>;
