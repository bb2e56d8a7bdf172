//! Durable storage for profiles
//!
//! The profile store keeps everything in memory and calls a
//! [`ProfilePersistence`] after each change. The default backend writes one
//! JSON document per profile.

use crate::core::error::{Result, WizardError};
use crate::core::profile::Profile;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Save hook for the profile store
#[async_trait]
pub trait ProfilePersistence: Send + Sync {
    /// Every stored profile
    async fn load_all(&self) -> Result<Vec<Profile>>;

    /// Write (or overwrite) one profile
    async fn save(&self, profile: &Profile) -> Result<()>;

    /// Remove a profile; absent profiles are not an error
    async fn remove(&self, name: &str) -> Result<()>;
}

/// One `<name>.json` file per profile under a directory
pub struct JsonFilePersistence {
    dir: PathBuf,
}

impl JsonFilePersistence {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File a profile is stored in
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", safe_file_stem(name)))
    }
}

/// Profile name encoded into a file or directory name.
///
/// Distinct names always give distinct stems. Everything outside
/// `[A-Za-z0-9._~-]` is percent-encoded, and a leading dot is encoded too so
/// `.` and `..` never name a directory.
pub fn safe_file_stem(name: &str) -> String {
    let stem = urlencoding::encode(name);
    match stem.strip_prefix('.') {
        Some(rest) => format!("%2E{}", rest),
        None => stem.into_owned(),
    }
}

#[async_trait]
impl ProfilePersistence for JsonFilePersistence {
    async fn load_all(&self) -> Result<Vec<Profile>> {
        let mut profiles = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }

            let raw = tokio::fs::read_to_string(&path).await?;
            match serde_json::from_str::<Profile>(&raw) {
                Ok(profile) if !profile.name.trim().is_empty() => profiles.push(profile),
                Ok(_) => warn!(path = %path.display(), "Skipping profile file without a name"),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable profile file"),
            }
        }

        debug!(count = profiles.len(), dir = %self.dir.display(), "Loaded saved profiles");
        Ok(profiles)
    }

    async fn save(&self, profile: &Profile) -> Result<()> {
        let path = self.path_for(&profile.name);
        let body = serde_json::to_vec_pretty(profile)?;

        // write then rename so a crash never leaves a truncated profile
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(WizardError::Io(e)),
        }
    }
}

/// Keeps saved copies in memory; used when no profile directory is wanted
#[derive(Default)]
pub struct MemoryPersistence {
    saved: Mutex<BTreeMap<String, Profile>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn saved(&self, name: &str) -> Option<Profile> {
        self.saved.lock().await.get(name).cloned()
    }
}

#[async_trait]
impl ProfilePersistence for MemoryPersistence {
    async fn load_all(&self) -> Result<Vec<Profile>> {
        Ok(self.saved.lock().await.values().cloned().collect())
    }

    async fn save(&self, profile: &Profile) -> Result<()> {
        self.saved
            .lock()
            .await
            .insert(profile.name.clone(), profile.clone());
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<()> {
        self.saved.lock().await.remove(name);
        Ok(())
    }
}
