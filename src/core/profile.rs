//! Profile data model
//!
//! A [`Profile`] is everything the wizard knows about one Kometa setup. Every
//! nested structure has a default so a freshly created or partially
//! deserialized profile is always complete.

use crate::core::catalog::{self, BuilderLevel, LibraryType, RATING_SOURCES};
use crate::core::error::{Result, WizardError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::PathBuf;

/// Port Plex Media Server listens on inside the LAN
pub const PLEX_LOCAL_PORT: u16 = 32400;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub name: String,
    pub root_directory: Option<PathBuf>,
    pub plex: PlexConnection,
    pub tmdb: TmdbConnection,
    /// Ordered set: first selection first, no duplicates
    pub selected_libraries: Vec<String>,
    /// Chart, award and collection ids mapped to their enabled flag
    pub collections: BTreeMap<String, bool>,
    pub overlays: BTreeMap<String, OverlayConfiguration>,
    pub services: BTreeMap<String, ServiceSettings>,
    pub settings: GeneralSettings,
    pub created_date: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

impl Default for Profile {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            name: String::new(),
            root_directory: None,
            plex: PlexConnection::default(),
            tmdb: TmdbConnection::default(),
            selected_libraries: Vec::new(),
            collections: BTreeMap::new(),
            overlays: BTreeMap::new(),
            services: BTreeMap::new(),
            settings: GeneralSettings::default(),
            created_date: now,
            last_modified: now,
        }
    }
}

impl Profile {
    /// A profile with every field at its default
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Refresh the modification timestamp
    pub fn touch(&mut self) {
        self.last_modified = Utc::now();
    }

    /// Add a library to the selection, keeping first-selected order
    pub fn select_library(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.selected_libraries.contains(&name) {
            self.selected_libraries.push(name);
        }
    }

    pub fn deselect_library(&mut self, name: &str) {
        self.selected_libraries.retain(|l| l != name);
    }

    /// Replace the selection, dropping repeats
    pub fn set_selected_libraries<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selected_libraries.clear();
        for name in names {
            self.select_library(name);
        }
    }

    pub fn set_collection(&mut self, id: impl Into<String>, enabled: bool) {
        self.collections.insert(id.into(), enabled);
    }

    pub fn is_collection_enabled(&self, id: &str) -> bool {
        self.collections.get(id).copied().unwrap_or(false)
    }

    /// Kind of a selected library, falling back to movie when Plex did not report it
    pub fn library_type(&self, name: &str) -> LibraryType {
        self.plex
            .available_libraries
            .iter()
            .find(|l| l.name == name)
            .map(|l| l.library_type)
            .unwrap_or_default()
    }

    /// Drop repeated library selections and key every overlay by its own id
    pub fn normalize(&mut self) {
        let libraries = std::mem::take(&mut self.selected_libraries);
        self.set_selected_libraries(libraries);
        for (id, overlay) in self.overlays.iter_mut() {
            overlay.overlay_type = id.clone();
        }
    }

    /// Check every id and enum-like value against the catalogs
    pub fn validate(&self) -> Result<()> {
        validate_tmdb(&self.tmdb)?;
        validate_collections(&self.collections)?;
        validate_overlays(&self.overlays)?;
        validate_services(&self.services)?;
        validate_settings(&self.settings)
    }
}

pub fn validate_tmdb(tmdb: &TmdbConnection) -> Result<()> {
    if tmdb.cache_expiration == 0 {
        return Err(WizardError::validation(
            "TMDb.CacheExpiration",
            "cache expiration must be at least one minute",
        ));
    }
    Ok(())
}

pub fn validate_collections(collections: &BTreeMap<String, bool>) -> Result<()> {
    match collections.keys().find(|id| catalog::find_collection(id).is_none()) {
        Some(id) => Err(WizardError::validation(format!("Charts.{}", id), "unknown collection")),
        None => Ok(()),
    }
}

/// Overlay ids, builder levels and rating sources
pub fn validate_overlays(overlays: &BTreeMap<String, OverlayConfiguration>) -> Result<()> {
    for (id, overlay) in overlays {
        let info = catalog::find_overlay(id)
            .ok_or_else(|| WizardError::validation(format!("Overlays.{}", id), "unknown overlay"))?;
        if !info.builder_levels.contains(&overlay.builder_level) {
            return Err(WizardError::validation(
                format!("Overlays.{}.BuilderLevel", id),
                format!("{} overlays cannot be applied at {} level", id, overlay.builder_level.as_str()),
            ));
        }
        for (kind, slot) in overlay.ratings.slots() {
            if slot.enabled && !RATING_SOURCES.contains(&slot.source.as_str()) {
                return Err(WizardError::validation(
                    format!("Overlays.{}.Ratings.{}", id, kind),
                    format!("unknown rating source '{}'", slot.source),
                ));
            }
        }
    }
    Ok(())
}

pub fn validate_services(services: &BTreeMap<String, ServiceSettings>) -> Result<()> {
    match services.keys().find(|id| catalog::find_service(id).is_none()) {
        Some(id) => Err(WizardError::validation(format!("Services.{}", id), "unknown service")),
        None => Ok(()),
    }
}

pub fn validate_settings(settings: &GeneralSettings) -> Result<()> {
    if settings.run_order.is_empty() {
        return Err(WizardError::validation("Settings.RunOrder", "run order cannot be empty"));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlexConnection {
    pub url: String,
    pub token: String,
    pub email: String,
    pub is_authenticated: bool,
    pub available_libraries: Vec<PlexLibrary>,
    pub timeout: u32,
    pub db_cache: Option<u32>,
    pub clean_bundles: bool,
    pub empty_trash: bool,
    pub optimize: bool,
    pub verify_ssl: bool,
}

impl Default for PlexConnection {
    fn default() -> Self {
        Self {
            url: String::new(),
            token: String::new(),
            email: String::new(),
            is_authenticated: false,
            available_libraries: Vec::new(),
            timeout: 60,
            db_cache: None,
            clean_bundles: false,
            empty_trash: false,
            optimize: false,
            verify_ssl: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlexLibrary {
    pub name: String,
    #[serde(rename = "type", default)]
    pub library_type: LibraryType,
    #[serde(default)]
    pub is_selected: bool,
}

/// Raw server entry as returned by the plex.tv resources endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlexServer {
    pub name: String,
    pub public_address: String,
    /// Comma separated LAN addresses, may be absent
    #[serde(default)]
    pub local_addresses: Option<String>,
    pub port: u16,
}

impl PlexServer {
    /// First private-range LAN address, if the server advertises one
    fn local_address(&self) -> Option<&str> {
        self.local_addresses
            .as_deref()?
            .split(',')
            .map(str::trim)
            .find(|addr| is_private_address(addr))
    }

    /// Address to reach the server on, LAN first
    pub fn best_address(&self) -> &str {
        self.local_address().unwrap_or(self.public_address.as_str())
    }

    /// 32400 on the LAN, otherwise the advertised port
    pub fn best_port(&self) -> u16 {
        if self.local_address().is_some() {
            PLEX_LOCAL_PORT
        } else {
            self.port
        }
    }

    pub fn connection_url(&self, scheme: &str) -> String {
        format!("{}://{}:{}", scheme, self.best_address(), self.best_port())
    }

    /// First server reachable over the LAN, else the first one listed.
    /// No ranking among several LAN candidates.
    pub fn select_best(servers: &[PlexServer]) -> Option<&PlexServer> {
        servers
            .iter()
            .find(|s| s.local_address().is_some())
            .or_else(|| servers.first())
    }
}

/// 10/8, 172.16/12, 192.168/16 or loopback
pub fn is_private_address(addr: &str) -> bool {
    match addr.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => v4.is_private() || v4.is_loopback(),
        Ok(IpAddr::V6(v6)) => v6.is_loopback(),
        Err(_) => false,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TmdbConnection {
    pub api_key: String,
    pub is_authenticated: bool,
    pub cache_expiration: u32,
    pub language: String,
    pub region: Option<String>,
}

impl Default for TmdbConnection {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            is_authenticated: false,
            cache_expiration: 60,
            language: "en".to_string(),
            region: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfiguration {
    pub overlay_type: String,
    pub builder_level: BuilderLevel,
    pub is_enabled: bool,
    pub use_advanced_variables: bool,
    pub template_variables: BTreeMap<String, serde_yaml::Value>,
    pub ratings: RatingConfiguration,
}

impl Default for OverlayConfiguration {
    fn default() -> Self {
        Self {
            overlay_type: String::new(),
            builder_level: BuilderLevel::Show,
            is_enabled: false,
            use_advanced_variables: false,
            template_variables: BTreeMap::new(),
            ratings: RatingConfiguration::default(),
        }
    }
}

impl OverlayConfiguration {
    pub fn enabled(overlay_type: impl Into<String>) -> Self {
        Self {
            overlay_type: overlay_type.into(),
            is_enabled: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HorizontalPosition {
    #[default]
    Left,
    Right,
}

impl HorizontalPosition {
    pub fn as_str(self) -> &'static str {
        match self {
            HorizontalPosition::Left => "left",
            HorizontalPosition::Right => "right",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RatingSlot {
    pub enabled: bool,
    pub source: String,
    pub custom_font: Option<String>,
    pub font_size: u32,
    pub default_font_size: u32,
    pub horizontal_position: HorizontalPosition,
}

impl RatingSlot {
    fn with_source(source: &str) -> Self {
        Self {
            enabled: false,
            source: source.to_string(),
            custom_font: None,
            font_size: 63,
            default_font_size: 63,
            horizontal_position: HorizontalPosition::Left,
        }
    }
}

impl Default for RatingSlot {
    fn default() -> Self {
        Self::with_source("imdb")
    }
}

/// Plex's three rating kinds, in the order they are numbered in the config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RatingConfiguration {
    pub user: RatingSlot,
    pub critic: RatingSlot,
    pub audience: RatingSlot,
}

impl Default for RatingConfiguration {
    fn default() -> Self {
        Self {
            user: RatingSlot::with_source("imdb"),
            critic: RatingSlot::with_source("rt_tomato"),
            audience: RatingSlot::with_source("rt_popcorn"),
        }
    }
}

impl RatingConfiguration {
    /// `(kind, slot)` pairs in user, critic, audience order
    pub fn slots(&self) -> [(&'static str, &RatingSlot); 3] {
        [("user", &self.user), ("critic", &self.critic), ("audience", &self.audience)]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    pub enabled: bool,
    /// YAML mapping placed under the service key
    pub config: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    #[default]
    Append,
    Sync,
}

/// Kometa `settings:` block. Field order is emission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    pub run_order: Vec<String>,
    pub cache: bool,
    pub cache_expiration: u32,
    pub asset_directory: Vec<String>,
    pub asset_folders: bool,
    pub asset_depth: u32,
    pub create_asset_folders: bool,
    pub prioritize_assets: bool,
    pub dimensional_asset_rename: bool,
    pub download_url_assets: bool,
    pub show_missing_season_assets: bool,
    pub show_missing_episode_assets: bool,
    pub show_asset_not_needed: bool,
    pub sync_mode: SyncMode,
    pub minimum_items: u32,
    pub default_collection_order: Option<String>,
    pub delete_below_minimum: bool,
    pub delete_not_scheduled: bool,
    pub run_again_delay: u32,
    pub missing_only_released: bool,
    pub only_filter_missing: bool,
    pub show_unmanaged: bool,
    pub show_unconfigured: bool,
    pub show_filtered: bool,
    pub show_options: bool,
    pub show_missing: bool,
    pub show_missing_assets: bool,
    pub save_report: bool,
    pub tvdb_language: String,
    pub ignore_ids: Vec<String>,
    pub ignore_imdb_ids: Vec<String>,
    pub item_refresh_delay: u32,
    pub playlist_sync_to_users: String,
    pub playlist_exclude_users: Option<String>,
    pub playlist_report: bool,
    pub verify_ssl: bool,
    pub custom_repo: Option<String>,
    pub overlay_artwork_filetype: String,
    pub overlay_artwork_quality: Option<u8>,
    pub check_nightly: bool,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            run_order: ["operations", "metadata", "collections", "overlays"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            cache: true,
            cache_expiration: 60,
            asset_directory: vec!["config/assets".to_string()],
            asset_folders: true,
            asset_depth: 0,
            create_asset_folders: false,
            prioritize_assets: false,
            dimensional_asset_rename: false,
            download_url_assets: false,
            show_missing_season_assets: false,
            show_missing_episode_assets: false,
            show_asset_not_needed: true,
            sync_mode: SyncMode::Append,
            minimum_items: 1,
            default_collection_order: None,
            delete_below_minimum: true,
            delete_not_scheduled: false,
            run_again_delay: 2,
            missing_only_released: false,
            only_filter_missing: false,
            show_unmanaged: true,
            show_unconfigured: true,
            show_filtered: false,
            show_options: true,
            show_missing: true,
            show_missing_assets: true,
            save_report: false,
            tvdb_language: "eng".to_string(),
            ignore_ids: Vec::new(),
            ignore_imdb_ids: Vec::new(),
            item_refresh_delay: 0,
            playlist_sync_to_users: "all".to_string(),
            playlist_exclude_users: None,
            playlist_report: false,
            verify_ssl: true,
            custom_repo: None,
            overlay_artwork_filetype: "jpg".to_string(),
            overlay_artwork_quality: None,
            check_nightly: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(local: Option<&str>) -> PlexServer {
        PlexServer {
            name: "Living Room".to_string(),
            public_address: "203.0.113.4".to_string(),
            local_addresses: local.map(str::to_string),
            port: 41234,
        }
    }

    #[test]
    fn test_best_address_prefers_lan() {
        let s = server(Some("192.168.1.5, 10.0.0.9"));
        assert_eq!(s.best_address(), "192.168.1.5");
        assert_eq!(s.best_port(), 32400);
        assert_eq!(s.connection_url("http"), "http://192.168.1.5:32400");
    }

    #[test]
    fn test_best_address_public_only() {
        let s = server(None);
        assert_eq!(s.best_address(), "203.0.113.4");
        assert_eq!(s.best_port(), 41234);
    }

    #[test]
    fn test_best_address_skips_non_private_locals() {
        let s = server(Some("198.51.100.7, 172.20.1.1"));
        assert_eq!(s.best_address(), "172.20.1.1");

        let s = server(Some("172.32.0.1"));
        assert_eq!(s.best_address(), "203.0.113.4");
        assert_eq!(s.best_port(), 41234);
    }

    #[test]
    fn test_loopback_counts_as_local() {
        assert!(is_private_address("127.0.0.1"));
        assert!(is_private_address("10.1.2.3"));
        assert!(!is_private_address("8.8.8.8"));
        assert!(!is_private_address("plex.local"));
    }

    #[test]
    fn test_select_best_takes_first_lan_server() {
        let remote = server(None);
        let mut lan_a = server(Some("10.0.0.2"));
        lan_a.name = "A".to_string();
        let mut lan_b = server(Some("10.0.0.3"));
        lan_b.name = "B".to_string();

        let servers = vec![remote.clone(), lan_a, lan_b];
        assert_eq!(PlexServer::select_best(&servers).unwrap().name, "A");

        let servers = vec![remote];
        assert_eq!(PlexServer::select_best(&servers).unwrap().best_address(), "203.0.113.4");
        assert!(PlexServer::select_best(&[]).is_none());
    }

    #[test]
    fn test_library_selection_is_an_ordered_set() {
        let mut profile = Profile::new("Foo");
        profile.select_library("Movies");
        profile.select_library("TV Shows");
        profile.select_library("Movies");
        assert_eq!(profile.selected_libraries, vec!["Movies", "TV Shows"]);

        profile.deselect_library("Movies");
        assert_eq!(profile.selected_libraries, vec!["TV Shows"]);

        profile.set_selected_libraries(["Anime", "Anime", "4K"]);
        assert_eq!(profile.selected_libraries, vec!["Anime", "4K"]);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let profile: Profile = serde_json::from_str(r#"{"name":"Foo","plex":{"url":"http://x"}}"#).unwrap();
        assert_eq!(profile.plex.url, "http://x");
        assert_eq!(profile.plex.timeout, 60);
        assert!(profile.plex.verify_ssl);
        assert_eq!(profile.tmdb.language, "en");
        assert_eq!(profile.settings.run_order.len(), 4);
    }

    #[test]
    fn test_library_type_lookup() {
        let mut profile = Profile::new("Foo");
        profile.plex.available_libraries.push(PlexLibrary {
            name: "TV".to_string(),
            library_type: LibraryType::Show,
            is_selected: true,
        });
        assert_eq!(profile.library_type("TV"), LibraryType::Show);
        assert_eq!(profile.library_type("Unknown"), LibraryType::Movie);
    }
}
