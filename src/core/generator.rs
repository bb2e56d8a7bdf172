//! Kometa config generator
//!
//! Renders a [`Profile`] into a Kometa `config.yml`. Output is built as a
//! `serde_yaml` value tree whose mappings preserve insertion order, and every
//! list is walked in catalog order, so the same profile always renders to the
//! same bytes no matter how its selections were toggled.

use crate::core::catalog::{BuilderLevel, LibraryType, COLLECTIONS, OVERLAYS, RATINGS_OVERLAY, SERVICES};
use crate::core::error::{Result, WizardError};
use crate::core::profile::{OverlayConfiguration, PlexConnection, Profile, TmdbConnection};
use serde::Serialize;
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// File name written by [`write_config`]
pub const CONFIG_FILE_NAME: &str = "config.yml";

/// Render the profile as Kometa YAML
pub fn generate(profile: &Profile) -> Result<String> {
    validate(profile)?;

    let mut root = Mapping::new();
    root.insert("libraries".into(), Value::Mapping(libraries(profile)));
    root.insert("plex".into(), to_value(profile, &PlexBlock::from(&profile.plex))?);
    root.insert("tmdb".into(), to_value(profile, &TmdbBlock::from(&profile.tmdb))?);

    for service in SERVICES.iter() {
        let settings = match profile.services.get(service.id) {
            Some(settings) if settings.enabled => settings,
            _ => continue,
        };
        root.insert(service.id.into(), service_block(profile, service.id, &settings.config)?);
    }

    root.insert("settings".into(), to_value(profile, &profile.settings)?);

    let body = serde_yaml::to_string(&Value::Mapping(root))
        .map_err(|e| WizardError::generation(&profile.name, e))?;
    let title = profile.name.replace(['\r', '\n'], " ");
    Ok(format!("## Kometa configuration for profile: {}\n{}", title, body))
}

/// Required connection fields
fn validate(profile: &Profile) -> Result<()> {
    let url = profile.plex.url.trim();
    if url.is_empty() {
        return Err(WizardError::validation("Plex.Url", "Plex URL is required"));
    }
    match url::Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
        Ok(parsed) => {
            return Err(WizardError::validation(
                "Plex.Url",
                format!("unsupported scheme '{}'", parsed.scheme()),
            ))
        }
        Err(e) => return Err(WizardError::validation("Plex.Url", e.to_string())),
    }
    if profile.plex.token.trim().is_empty() {
        return Err(WizardError::validation("Plex.Token", "Plex token is required"));
    }
    Ok(())
}

fn to_value<T: Serialize>(profile: &Profile, value: &T) -> Result<Value> {
    serde_yaml::to_value(value).map_err(|e| WizardError::generation(&profile.name, e))
}

fn libraries(profile: &Profile) -> Mapping {
    let mut libraries = Mapping::new();
    for name in &profile.selected_libraries {
        let library_type = profile.library_type(name);
        let mut library = Mapping::new();

        let collection_files: Vec<Value> = COLLECTIONS
            .iter()
            .filter(|c| c.scope.includes(library_type) && profile.is_collection_enabled(c.id))
            .map(|c| default_entry(c.id))
            .collect();
        if !collection_files.is_empty() {
            library.insert("collection_files".into(), Value::Sequence(collection_files));
        }

        let overlay_files: Vec<Value> = OVERLAYS
            .iter()
            .filter(|o| o.scope.includes(library_type))
            .filter_map(|o| {
                profile
                    .overlays
                    .get(o.id)
                    .filter(|config| config.is_enabled)
                    .map(|config| overlay_entry(o.id, config, library_type))
            })
            .collect();
        if !overlay_files.is_empty() {
            library.insert("overlay_files".into(), Value::Sequence(overlay_files));
        }

        libraries.insert(name.as_str().into(), Value::Mapping(library));
    }
    libraries
}

fn default_entry(id: &str) -> Value {
    let mut entry = Mapping::new();
    entry.insert("default".into(), id.into());
    Value::Mapping(entry)
}

fn overlay_entry(id: &str, config: &OverlayConfiguration, library_type: LibraryType) -> Value {
    let mut variables = Mapping::new();

    // show level is Kometa's default, so only season and episode are written
    if library_type == LibraryType::Show && config.builder_level != BuilderLevel::Show {
        variables.insert("builder_level".into(), config.builder_level.as_str().into());
    }

    if config.use_advanced_variables {
        for (key, value) in &config.template_variables {
            variables.insert(key.as_str().into(), value.clone());
        }
    }

    if id == RATINGS_OVERLAY {
        let mut position = None;
        let mut n = 1;
        for (kind, slot) in config.ratings.slots() {
            if !slot.enabled {
                continue;
            }
            variables.insert(format!("rating{}", n).into(), kind.into());
            variables.insert(format!("rating{}_image", n).into(), slot.source.as_str().into());
            if let Some(font) = slot.custom_font.as_deref().filter(|f| !f.trim().is_empty()) {
                variables.insert(format!("rating{}_font", n).into(), font.into());
            }
            variables.insert(format!("rating{}_font_size", n).into(), slot.font_size.into());
            position.get_or_insert(slot.horizontal_position);
            n += 1;
        }
        if let Some(position) = position {
            variables.insert("horizontal_position".into(), position.as_str().into());
        }
    }

    let mut entry = Mapping::new();
    entry.insert("default".into(), id.into());
    if !variables.is_empty() {
        entry.insert("template_variables".into(), Value::Mapping(variables));
    }
    Value::Mapping(entry)
}

fn service_block(profile: &Profile, id: &str, config: &str) -> Result<Value> {
    if config.trim().is_empty() {
        return Ok(Value::Mapping(Mapping::new()));
    }
    match serde_yaml::from_str::<Value>(config) {
        Ok(Value::Mapping(mapping)) => Ok(Value::Mapping(mapping)),
        Ok(Value::Null) => Ok(Value::Mapping(Mapping::new())),
        Ok(_) => Err(WizardError::generation(
            &profile.name,
            format!("{} settings must be a YAML mapping", id),
        )),
        Err(e) => Err(WizardError::generation(
            &profile.name,
            format!("{} settings are not valid YAML: {}", id, e),
        )),
    }
}

#[derive(Serialize)]
struct PlexBlock<'a> {
    url: &'a str,
    token: &'a str,
    timeout: u32,
    db_cache: Option<u32>,
    clean_bundles: bool,
    empty_trash: bool,
    optimize: bool,
    verify_ssl: bool,
}

impl<'a> From<&'a PlexConnection> for PlexBlock<'a> {
    fn from(plex: &'a PlexConnection) -> Self {
        Self {
            url: plex.url.trim(),
            token: plex.token.trim(),
            timeout: plex.timeout,
            db_cache: plex.db_cache,
            clean_bundles: plex.clean_bundles,
            empty_trash: plex.empty_trash,
            optimize: plex.optimize,
            verify_ssl: plex.verify_ssl,
        }
    }
}

#[derive(Serialize)]
struct TmdbBlock<'a> {
    apikey: &'a str,
    cache_expiration: u32,
    language: &'a str,
    region: Option<&'a str>,
}

impl<'a> From<&'a TmdbConnection> for TmdbBlock<'a> {
    fn from(tmdb: &'a TmdbConnection) -> Self {
        Self {
            apikey: tmdb.api_key.as_str(),
            cache_expiration: tmdb.cache_expiration,
            language: tmdb.language.as_str(),
            region: tmdb.region.as_deref(),
        }
    }
}

/// What a rendered config selects, per library
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConfigSummary {
    pub libraries: Vec<LibrarySummary>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LibrarySummary {
    pub name: String,
    pub collections: Vec<String>,
    pub overlays: Vec<String>,
}

impl ConfigSummary {
    pub fn collection_count(&self) -> usize {
        self.libraries.iter().map(|l| l.collections.len()).sum()
    }

    pub fn overlay_count(&self) -> usize {
        self.libraries.iter().map(|l| l.overlays.len()).sum()
    }
}

/// Read libraries, collection ids and overlay ids back out of a rendered config
pub fn summarize(yaml: &str) -> Result<ConfigSummary> {
    let root: Value =
        serde_yaml::from_str(yaml).map_err(|e| WizardError::Serialization(e.to_string()))?;

    let mut summary = ConfigSummary::default();
    let libraries = match root.get("libraries").and_then(Value::as_mapping) {
        Some(libraries) => libraries,
        None => return Ok(summary),
    };

    for (name, library) in libraries {
        let name = name
            .as_str()
            .ok_or_else(|| WizardError::Serialization("library name is not a string".to_string()))?;
        summary.libraries.push(LibrarySummary {
            name: name.to_string(),
            collections: default_ids(library.get("collection_files")),
            overlays: default_ids(library.get("overlay_files")),
        });
    }

    Ok(summary)
}

fn default_ids(files: Option<&Value>) -> Vec<String> {
    files
        .and_then(Value::as_sequence)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| entry.get("default").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Render and write `<dir>/config.yml`
#[instrument(skip(profile), fields(profile = %profile.name))]
pub async fn write_config(profile: &Profile, dir: &Path) -> Result<(PathBuf, ConfigSummary)> {
    let yaml = generate(profile)?;
    let summary = summarize(&yaml)?;

    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(CONFIG_FILE_NAME);
    tokio::fs::write(&path, yaml.as_bytes()).await?;

    debug!(
        path = %path.display(),
        libraries = summary.libraries.len(),
        "Config written"
    );
    Ok((path, summary))
}
