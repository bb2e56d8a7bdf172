//! Profile store
//!
//! Authoritative in-memory copy of every profile. Each profile sits behind
//! its own async mutex, so concurrent edits to one profile are serialized
//! while different profiles never wait on each other. After a successful
//! change the profile is persisted and the change event is handed to the
//! [`EventSink`] before the profile lock is released, which keeps the event
//! order seen by viewers identical to the order changes were applied in.

use crate::core::error::{Result, WizardError};
use crate::core::persistence::ProfilePersistence;
use crate::core::profile::Profile;
use crate::hub::{EventSink, Origin, Scope, ServerEvent};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument};

/// `None` once the profile has been deleted, so late writers see NotFound
type Slot = Arc<Mutex<Option<Profile>>>;

pub struct ProfileStore {
    profiles: RwLock<BTreeMap<String, Slot>>,
    persistence: Arc<dyn ProfilePersistence>,
    sink: Option<Arc<dyn EventSink>>,
}

impl ProfileStore {
    /// Empty store without event delivery
    pub fn new(persistence: Arc<dyn ProfilePersistence>) -> Self {
        Self {
            profiles: RwLock::new(BTreeMap::new()),
            persistence,
            sink: None,
        }
    }

    /// Load every persisted profile and deliver change events to `sink`
    pub async fn open(
        persistence: Arc<dyn ProfilePersistence>,
        sink: Option<Arc<dyn EventSink>>,
    ) -> Result<Self> {
        let loaded = persistence.load_all().await?;
        let mut profiles = BTreeMap::new();
        for profile in loaded {
            profiles.insert(profile.name.clone(), Arc::new(Mutex::new(Some(profile))));
        }

        info!(count = profiles.len(), "Profile store opened");

        Ok(Self {
            profiles: RwLock::new(profiles),
            persistence,
            sink,
        })
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    async fn emit(&self, scope: Scope, event: ServerEvent, origin: &Origin) {
        if let Some(sink) = &self.sink {
            sink.publish(scope, event, origin).await;
        }
    }

    async fn slot(&self, name: &str) -> Result<Slot> {
        self.profiles
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| WizardError::NotFound(name.to_string()))
    }

    /// Create a profile with default settings
    #[instrument(skip(self, origin))]
    pub async fn create(&self, name: &str, origin: &Origin) -> Result<Profile> {
        let name = name.trim();
        if name.is_empty() {
            return Err(WizardError::validation("Name", "profile name cannot be empty"));
        }

        let profile = Profile::new(name);
        let slot: Slot = Arc::new(Mutex::new(None));

        // claim the name and the profile lock before anyone else can see it
        let mut guard = {
            let mut profiles = self.profiles.write().await;
            if profiles.contains_key(name) {
                return Err(WizardError::DuplicateName(name.to_string()));
            }
            profiles.insert(name.to_string(), slot.clone());
            slot.lock_owned().await
        };

        if let Err(e) = self.persistence.save(&profile).await {
            self.profiles.write().await.remove(name);
            return Err(e);
        }
        *guard = Some(profile.clone());

        info!(profile = %name, "Profile created");
        self.emit(
            Scope::Others,
            ServerEvent::ProfileCreated { profile: profile.clone() },
            origin,
        )
        .await;

        Ok(profile)
    }

    /// Snapshot of one profile; `None` when absent
    pub async fn load(&self, name: &str) -> Option<Profile> {
        let slot = self.slot(name).await.ok()?;
        let guard = slot.lock().await;
        guard.clone()
    }

    /// Like [`load`](Self::load) but absence is a `NotFound` error
    pub async fn get(&self, name: &str) -> Result<Profile> {
        self.load(name)
            .await
            .ok_or_else(|| WizardError::NotFound(name.to_string()))
    }

    /// Replace a stored profile. The creation date is kept from the stored copy.
    /// The replacement is normalized and checked against the catalogs first.
    #[instrument(skip(self, profile, origin), fields(profile = %profile.name))]
    pub async fn update(&self, mut profile: Profile, origin: &Origin) -> Result<Profile> {
        let slot = self.slot(&profile.name).await?;
        let mut guard = slot.lock().await;
        let stored = guard
            .as_ref()
            .ok_or_else(|| WizardError::NotFound(profile.name.clone()))?;

        profile.normalize();
        profile.validate()?;
        profile.created_date = stored.created_date;
        profile.touch();
        self.persistence.save(&profile).await?;
        *guard = Some(profile.clone());

        debug!("Profile replaced");
        self.emit(
            Scope::Group(profile.name.clone()),
            ServerEvent::ProfileUpdated { profile: profile.clone() },
            origin,
        )
        .await;

        Ok(profile)
    }

    /// Apply `change` to a copy of the profile. The copy is committed only
    /// when `change` succeeds and the result is persisted; the event it
    /// returns goes to the profile's group.
    pub async fn mutate<F>(&self, name: &str, origin: &Origin, change: F) -> Result<Profile>
    where
        F: FnOnce(&mut Profile) -> Result<ServerEvent> + Send,
    {
        let slot = self.slot(name).await?;
        let mut guard = slot.lock().await;
        let mut profile = guard
            .clone()
            .ok_or_else(|| WizardError::NotFound(name.to_string()))?;

        let event = change(&mut profile)?;
        profile.touch();
        self.persistence.save(&profile).await?;
        *guard = Some(profile.clone());

        debug!(profile = %name, event = event.name(), "Profile changed");
        self.emit(Scope::Group(name.to_string()), event, origin).await;

        Ok(profile)
    }

    /// Remove a profile. Absent names are a no-op and return `false`.
    #[instrument(skip(self, origin))]
    pub async fn delete(&self, name: &str, origin: &Origin) -> Result<bool> {
        let slot = match self.profiles.write().await.remove(name) {
            Some(slot) => slot,
            None => return Ok(false),
        };

        // waits for any in-flight change to finish first
        let mut guard = slot.lock().await;
        if guard.take().is_none() {
            return Ok(false);
        }
        self.persistence.remove(name).await?;

        info!(profile = %name, "Profile deleted");
        self.emit(
            Scope::Others,
            ServerEvent::ProfileDeleted { name: name.to_string() },
            origin,
        )
        .await;

        Ok(true)
    }

    /// Snapshot of every profile, ordered by name
    pub async fn list_all(&self) -> Vec<Profile> {
        let slots: Vec<Slot> = self.profiles.read().await.values().cloned().collect();
        let mut profiles = Vec::with_capacity(slots.len());
        for slot in slots {
            if let Some(profile) = slot.lock().await.clone() {
                profiles.push(profile);
            }
        }
        profiles
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.profiles.read().await.contains_key(name)
    }
}
