use crate::core::generator::ConfigSummary;
use crate::core::profile::{PlexServer, Profile};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Request body for POST /api/profiles
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateProfileRequest {
    pub name: String,
}

/// List entry for GET /api/profiles
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSummary {
    pub name: String,
    pub root_directory: Option<PathBuf>,
    pub selected_libraries: Vec<String>,
    pub enabled_collections: usize,
    pub enabled_overlays: usize,
    pub created_date: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

impl From<&Profile> for ProfileSummary {
    fn from(profile: &Profile) -> Self {
        Self {
            name: profile.name.clone(),
            root_directory: profile.root_directory.clone(),
            selected_libraries: profile.selected_libraries.clone(),
            enabled_collections: profile.collections.values().filter(|on| **on).count(),
            enabled_overlays: profile.overlays.values().filter(|o| o.is_enabled).count(),
            created_date: profile.created_date,
            last_modified: profile.last_modified,
        }
    }
}

/// Response for POST /api/profiles/:name/config
#[derive(Debug, Serialize)]
pub struct WriteConfigResponse {
    pub path: PathBuf,
    pub summary: ConfigSummary,
}

/// Request body for POST /api/plex/best-server
#[derive(Debug, Deserialize)]
pub struct BestServerRequest {
    pub servers: Vec<PlexServer>,
    /// `http` unless given
    #[serde(default)]
    pub scheme: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BestServerResponse {
    pub name: String,
    pub address: String,
    pub port: u16,
    pub url: String,
}
