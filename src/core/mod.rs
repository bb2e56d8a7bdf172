//! Core application layer
//!
//! This module provides:
//! - Profile data model, catalogs and the profile store
//! - Kometa config generation
//! - Process runner, scheduler and host requirements probe
//! - Configuration management
//! - Structured logging system
//! - Error handling and type system

pub mod catalog;
pub mod config;
pub mod error;
pub mod generator;
pub mod logging;
pub mod persistence;
pub mod profile;
pub mod profile_store;
pub mod requirements;
pub mod runner;
pub mod scheduler;

pub use config::Config;
pub use error::{ErrorResponse, Result, WizardError};
pub use generator::{generate, summarize, write_config, ConfigSummary};
pub use logging::Logger;
pub use persistence::{JsonFilePersistence, MemoryPersistence, ProfilePersistence};
pub use profile::Profile;
pub use profile_store::ProfileStore;
pub use runner::{KometaProcessRunner, ProcessRunner, RunOutcome, RunRequest};
pub use scheduler::{InMemoryScheduler, ScheduleEntry, TaskScheduler};
