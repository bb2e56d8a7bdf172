//! Inbound message handling
//!
//! [`HubService`] turns one parsed [`ClientMessage`] into store mutations,
//! broadcasts and execution control. Failures are reported to the sending
//! connection only.

use crate::api::server::{ServerControl, ServerExit};
use crate::core::config::{ExecutionConfig, StorageConfig};
use crate::core::error::Result;
use crate::core::generator::{self, ConfigSummary};
use crate::core::persistence::safe_file_stem;
use crate::core::profile::Profile;
use crate::core::profile_store::ProfileStore;
use crate::core::requirements::check_requirements;
use crate::core::runner::RunRequest;
use crate::core::scheduler::{ScheduleEntry, TaskScheduler};
use crate::hub::broadcaster::{EventSink, SyncHub};
use crate::hub::events::{ClientMessage, Origin, Scope, ServerEvent, ServerStatus};
use crate::hub::execution::ExecutionControl;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct HubService {
    store: Arc<ProfileStore>,
    hub: Arc<SyncHub>,
    execution: Arc<ExecutionControl>,
    scheduler: Arc<dyn TaskScheduler>,
    storage: StorageConfig,
    execution_config: ExecutionConfig,
    control: ServerControl,
}

impl HubService {
    pub fn new(
        store: Arc<ProfileStore>,
        hub: Arc<SyncHub>,
        execution: Arc<ExecutionControl>,
        scheduler: Arc<dyn TaskScheduler>,
        storage: StorageConfig,
        execution_config: ExecutionConfig,
        control: ServerControl,
    ) -> Self {
        Self {
            store,
            hub,
            execution,
            scheduler,
            storage,
            execution_config,
            control,
        }
    }

    pub fn hub(&self) -> &Arc<SyncHub> {
        &self.hub
    }

    pub fn store(&self) -> &Arc<ProfileStore> {
        &self.store
    }

    pub fn execution(&self) -> &Arc<ExecutionControl> {
        &self.execution
    }

    /// Resolves once the server has been asked to stop or restart. Socket
    /// tasks stop reading at that point so a retired service takes no more
    /// requests.
    pub async fn closing(&self) -> ServerExit {
        self.control.wait().await
    }

    /// Parse and dispatch one text frame from `connection_id`
    pub async fn handle_text(&self, connection_id: &str, text: &str) {
        let message = match serde_json::from_str::<ClientMessage>(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(connection_id, error = %e, "Rejected malformed hub message");
                self.hub
                    .send_to(
                        connection_id,
                        ServerEvent::Error {
                            kind: "InvalidRequest".to_string(),
                            message: format!("Malformed message: {}", e),
                            profile: None,
                            field: None,
                        },
                    )
                    .await;
                return;
            }
        };

        if let Err(e) = self.dispatch(connection_id, message).await {
            warn!(connection_id, error = %e, kind = e.error_type(), "Hub request failed");
            self.hub.send_to(connection_id, ServerEvent::from_error(&e)).await;
        }
    }

    pub async fn dispatch(&self, connection_id: &str, message: ClientMessage) -> Result<()> {
        let origin = Origin::Connection(connection_id.to_string());

        match message {
            ClientMessage::JoinGroup { group } => self.hub.join_group(connection_id, &group).await,
            ClientMessage::LeaveGroup { group } => self.hub.leave_group(connection_id, &group).await,

            ClientMessage::CreateProfile { name } => {
                self.store.create(&name, &origin).await?;
            }
            ClientMessage::UpdateProfile { profile } => {
                self.store.update(profile, &origin).await?;
            }
            ClientMessage::DeleteProfile { name } => {
                self.store.delete(&name, &origin).await?;
            }
            ClientMessage::SelectProfile { name } => {
                self.store.get(&name).await?;
                self.hub.join_group(connection_id, &name).await;
                self.hub
                    .publish(
                        Scope::Group(name.clone()),
                        ServerEvent::ProfileSelected {
                            name,
                            connection_id: Some(connection_id.to_string()),
                        },
                        &origin,
                    )
                    .await;
            }

            ClientMessage::ChangePage { profile, page } => {
                self.store.get(&profile).await?;
                self.hub
                    .publish(
                        Scope::Group(profile.clone()),
                        ServerEvent::PageChanged { profile, page },
                        &origin,
                    )
                    .await;
            }
            ClientMessage::ReportValidation { profile, page, is_valid } => {
                self.store.get(&profile).await?;
                self.hub
                    .publish(
                        Scope::Group(profile.clone()),
                        ServerEvent::ValidationStatusChanged { profile, page, is_valid },
                        &origin,
                    )
                    .await;
            }
            ClientMessage::UpdateSection { profile, section } => {
                self.store
                    .mutate(&profile, &origin, move |p| section.apply(p))
                    .await?;
            }

            ClientMessage::GenerateConfig { profile } => {
                self.write_config(&profile, &origin).await?;
            }

            ClientMessage::StartExecution { profile } => {
                let store = self.store.clone();
                let dir = self.storage.output_dir.clone();
                let name = profile.clone();
                self.execution
                    .start(&profile, async move {
                        let profile = store.get(&name).await?;
                        let dir = config_dir(&dir, &profile);
                        let (config_path, _) = generator::write_config(&profile, &dir).await?;
                        Ok(RunRequest { profile: name, config_path })
                    })
                    .await?;
            }
            ClientMessage::StopExecution => {
                self.execution.stop().await;
            }

            ClientMessage::CreateSchedule { profile, frequency, interval, time } => {
                self.store.get(&profile).await?;
                let entry = ScheduleEntry::parse(&profile, &frequency, interval, &time)?;
                let schedule = self.scheduler.create(entry).await?;
                self.hub
                    .publish(Scope::Everyone, ServerEvent::ScheduleCreated { schedule }, &origin)
                    .await;
            }
            ClientMessage::RemoveSchedule { profile } => {
                let removed = self.scheduler.remove(&profile).await?;
                debug!(profile = %profile, removed, "Schedule removal");
                self.hub
                    .publish(Scope::Everyone, ServerEvent::ScheduleDeleted { profile }, &origin)
                    .await;
            }

            ClientMessage::CheckRequirements { profile } => {
                let root = match &profile {
                    Some(name) => self.store.get(name).await?.root_directory,
                    None => None,
                };
                let report = check_requirements(&self.execution_config, root.as_deref()).await;
                self.hub
                    .send_to(connection_id, ServerEvent::RequirementsChecked { report })
                    .await;
            }
            ClientMessage::OpenConfigDirectory { profile } => {
                let stored = self.store.get(&profile).await?;
                let path = config_dir(&self.storage.output_dir, &stored);
                tokio::fs::create_dir_all(&path).await?;
                self.hub
                    .send_to(connection_id, ServerEvent::ConfigDirectory { profile, path })
                    .await;
            }

            ClientMessage::RestartServer => {
                self.request_exit(ServerExit::Restart, &origin).await;
            }
            ClientMessage::StopServer => {
                self.request_exit(ServerExit::Stop, &origin).await;
            }
        }

        Ok(())
    }

    /// Render and write a profile's config, then tell its viewers
    pub async fn write_config(&self, name: &str, origin: &Origin) -> Result<(PathBuf, ConfigSummary)> {
        let profile = self.store.get(name).await?;
        let dir = config_dir(&self.storage.output_dir, &profile);
        let (path, summary) = generator::write_config(&profile, &dir).await?;

        let event = ServerEvent::GenerationCompleted {
            profile: name.to_string(),
            path: Some(path.clone()),
            libraries: summary.libraries.len(),
            collection_files: summary.collection_count(),
            overlay_files: summary.overlay_count(),
        };
        self.hub
            .publish(Scope::Group(name.to_string()), event.clone(), origin)
            .await;
        if let Some(id) = origin.connection_id() {
            self.hub.send_to(id, event).await;
        }

        Ok((path, summary))
    }

    /// Start runs for schedules that fell due in `(since, now]`
    pub async fn run_due_schedules(&self, since: DateTime<Utc>, now: DateTime<Utc>) {
        for profile in self.scheduler.due(since, now).await {
            info!(profile = %profile, "Scheduled run due");
            let message = ClientMessage::StartExecution { profile: profile.clone() };
            if let Err(e) = self.dispatch_system(message).await {
                warn!(profile = %profile, error = %e, "Scheduled run not started");
                self.hub
                    .publish(
                        Scope::Everyone,
                        ServerEvent::ExecutionError {
                            profile,
                            run_id: None,
                            message: e.to_string(),
                        },
                        &Origin::System,
                    )
                    .await;
            }
        }
    }

    async fn dispatch_system(&self, message: ClientMessage) -> Result<()> {
        // no connection id, so replies have nowhere to go
        self.dispatch("", message).await
    }

    async fn request_exit(&self, exit: ServerExit, origin: &Origin) {
        let status = match exit {
            ServerExit::Restart => ServerStatus::Restarting,
            ServerExit::Stop => ServerStatus::Stopping,
        };
        info!(status = ?status, "Server exit requested");
        self.hub
            .publish(Scope::Others, ServerEvent::ServerStatusChanged { status }, origin)
            .await;
        self.execution.stop().await;
        self.control.request(exit);
    }
}

/// Where a profile's generated config lives
pub fn config_dir(output_dir: &std::path::Path, profile: &Profile) -> PathBuf {
    match &profile.root_directory {
        Some(root) => root.join("config"),
        None => output_dir.join(safe_file_stem(&profile.name)),
    }
}
