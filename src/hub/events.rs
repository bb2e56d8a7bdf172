//! Hub wire contract
//!
//! Inbound [`ClientMessage`]s and outbound [`ServerEvent`]s travel as JSON
//! text frames. Both are tagged enums so an unexpected shape is rejected at
//! the socket instead of being passed inward.

use crate::core::error::{Result, WizardError};
use crate::core::profile::{
    self, GeneralSettings, OverlayConfiguration, PlexConnection, Profile, ServiceSettings, TmdbConnection,
};
use crate::core::requirements::RequirementsReport;
use crate::core::runner::RunOutcome;
use crate::core::scheduler::ScheduleEntry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Unique identifier for a hub connection
pub type ConnectionId = String;

/// Who caused a change. The origin is left out of most broadcasts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    System,
    Connection(ConnectionId),
}

impl Origin {
    pub fn connection_id(&self) -> Option<&str> {
        match self {
            Origin::System => None,
            Origin::Connection(id) => Some(id),
        }
    }
}

/// Audience of a published event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Every connection except the origin
    Others,
    /// Members of a group except the origin
    Group(String),
    /// Every connection, origin included
    Everyone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Running,
    Restarting,
    Stopping,
}

/// Events pushed to viewers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    ProfileCreated { profile: Profile },
    ProfileUpdated { profile: Profile },
    ProfileDeleted { name: String },
    ProfileSelected { name: String, connection_id: Option<ConnectionId> },
    PageChanged { profile: String, page: String },
    ValidationStatusChanged { profile: String, page: String, is_valid: bool },
    ConnectionsChanged {
        profile: String,
        plex: PlexConnection,
        tmdb: TmdbConnection,
        selected_libraries: Vec<String>,
        root_directory: Option<PathBuf>,
    },
    ChartsChanged { profile: String, collections: BTreeMap<String, bool> },
    OverlaysChanged { profile: String, overlays: BTreeMap<String, OverlayConfiguration> },
    ServicesChanged { profile: String, services: BTreeMap<String, ServiceSettings> },
    SettingsChanged { profile: String, settings: GeneralSettings },
    ExecutionStarted { profile: String, run_id: u64, config_path: PathBuf },
    ExecutionStopped { profile: String, run_id: u64, outcome: RunOutcome },
    ExecutionLog { profile: String, run_id: u64, line: String },
    ExecutionError { profile: String, run_id: Option<u64>, message: String },
    ScheduleCreated { schedule: ScheduleEntry },
    ScheduleDeleted { profile: String },
    GenerationCompleted {
        profile: String,
        path: Option<PathBuf>,
        libraries: usize,
        collection_files: usize,
        overlay_files: usize,
    },
    ServerStatusChanged { status: ServerStatus },
    ClientConnected { connection_id: ConnectionId },
    ClientDisconnected { connection_id: ConnectionId },

    // Replies to the originating connection only
    Connected { connection_id: ConnectionId },
    Error {
        kind: String,
        message: String,
        profile: Option<String>,
        field: Option<String>,
    },
    RequirementsChecked { report: RequirementsReport },
    ConfigDirectory { profile: String, path: PathBuf },
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::ProfileCreated { .. } => "ProfileCreated",
            ServerEvent::ProfileUpdated { .. } => "ProfileUpdated",
            ServerEvent::ProfileDeleted { .. } => "ProfileDeleted",
            ServerEvent::ProfileSelected { .. } => "ProfileSelected",
            ServerEvent::PageChanged { .. } => "PageChanged",
            ServerEvent::ValidationStatusChanged { .. } => "ValidationStatusChanged",
            ServerEvent::ConnectionsChanged { .. } => "ConnectionsChanged",
            ServerEvent::ChartsChanged { .. } => "ChartsChanged",
            ServerEvent::OverlaysChanged { .. } => "OverlaysChanged",
            ServerEvent::ServicesChanged { .. } => "ServicesChanged",
            ServerEvent::SettingsChanged { .. } => "SettingsChanged",
            ServerEvent::ExecutionStarted { .. } => "ExecutionStarted",
            ServerEvent::ExecutionStopped { .. } => "ExecutionStopped",
            ServerEvent::ExecutionLog { .. } => "ExecutionLog",
            ServerEvent::ExecutionError { .. } => "ExecutionError",
            ServerEvent::ScheduleCreated { .. } => "ScheduleCreated",
            ServerEvent::ScheduleDeleted { .. } => "ScheduleDeleted",
            ServerEvent::GenerationCompleted { .. } => "GenerationCompleted",
            ServerEvent::ServerStatusChanged { .. } => "ServerStatusChanged",
            ServerEvent::ClientConnected { .. } => "ClientConnected",
            ServerEvent::ClientDisconnected { .. } => "ClientDisconnected",
            ServerEvent::Connected { .. } => "Connected",
            ServerEvent::Error { .. } => "Error",
            ServerEvent::RequirementsChecked { .. } => "RequirementsChecked",
            ServerEvent::ConfigDirectory { .. } => "ConfigDirectory",
        }
    }

    /// Error reply for the connection whose request failed
    pub fn from_error(error: &WizardError) -> Self {
        ServerEvent::Error {
            kind: error.error_type().to_string(),
            message: error.to_string(),
            profile: error.profile().map(str::to_string),
            field: error.field().map(str::to_string),
        }
    }
}

/// Requests a viewer can send
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", content = "payload", deny_unknown_fields)]
pub enum ClientMessage {
    JoinGroup { group: String },
    LeaveGroup { group: String },
    CreateProfile { name: String },
    UpdateProfile { profile: Profile },
    DeleteProfile { name: String },
    SelectProfile { name: String },
    ChangePage { profile: String, page: String },
    ReportValidation { profile: String, page: String, is_valid: bool },
    UpdateSection { profile: String, section: ConfigSection },
    GenerateConfig { profile: String },
    StartExecution { profile: String },
    StopExecution,
    CreateSchedule { profile: String, frequency: String, interval: u32, time: String },
    RemoveSchedule { profile: String },
    CheckRequirements { profile: Option<String> },
    OpenConfigDirectory { profile: String },
    RestartServer,
    StopServer,
}

/// One wizard page's worth of profile state
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum ConfigSection {
    Connections(ConnectionsSection),
    Charts(ChartsSection),
    Overlays(OverlaysSection),
    Services(ServicesSection),
    Settings(SettingsSection),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionsSection {
    pub plex: PlexConnection,
    pub tmdb: TmdbConnection,
    #[serde(default)]
    pub selected_libraries: Option<Vec<String>>,
    #[serde(default)]
    pub root_directory: Option<PathBuf>,
}

/// Toggles merged into the existing selection map
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChartsSection {
    pub collections: BTreeMap<String, bool>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OverlaysSection {
    pub overlays: BTreeMap<String, OverlayConfiguration>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServicesSection {
    pub services: BTreeMap<String, ServiceSettings>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingsSection {
    pub settings: GeneralSettings,
}

impl ConfigSection {
    /// Check every id and enum-like value against the catalogs
    pub fn validate(&self) -> Result<()> {
        match self {
            ConfigSection::Connections(section) => profile::validate_tmdb(&section.tmdb),
            ConfigSection::Charts(section) => profile::validate_collections(&section.collections),
            ConfigSection::Overlays(section) => profile::validate_overlays(&section.overlays),
            ConfigSection::Services(section) => profile::validate_services(&section.services),
            ConfigSection::Settings(section) => profile::validate_settings(&section.settings),
        }
    }

    /// Apply the section to a profile and describe the change for viewers
    pub fn apply(self, profile: &mut Profile) -> Result<ServerEvent> {
        self.validate()?;
        let name = profile.name.clone();

        let event = match self {
            ConfigSection::Connections(section) => {
                profile.plex = section.plex;
                profile.tmdb = section.tmdb;
                if let Some(libraries) = section.selected_libraries {
                    profile.set_selected_libraries(libraries);
                }
                if section.root_directory.is_some() {
                    profile.root_directory = section.root_directory;
                }
                ServerEvent::ConnectionsChanged {
                    profile: name,
                    plex: profile.plex.clone(),
                    tmdb: profile.tmdb.clone(),
                    selected_libraries: profile.selected_libraries.clone(),
                    root_directory: profile.root_directory.clone(),
                }
            }
            ConfigSection::Charts(section) => {
                profile.collections.extend(section.collections);
                ServerEvent::ChartsChanged {
                    profile: name,
                    collections: profile.collections.clone(),
                }
            }
            ConfigSection::Overlays(section) => {
                for (id, mut overlay) in section.overlays {
                    overlay.overlay_type = id.clone();
                    profile.overlays.insert(id, overlay);
                }
                ServerEvent::OverlaysChanged {
                    profile: name,
                    overlays: profile.overlays.clone(),
                }
            }
            ConfigSection::Services(section) => {
                profile.services.extend(section.services);
                ServerEvent::ServicesChanged {
                    profile: name,
                    services: profile.services.clone(),
                }
            }
            ConfigSection::Settings(section) => {
                profile.settings = section.settings;
                ServerEvent::SettingsChanged {
                    profile: name,
                    settings: profile.settings.clone(),
                }
            }
        };

        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::BuilderLevel;
    use serde_json::json;

    #[test]
    fn test_parse_client_messages() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"JoinGroup","payload":{"group":"Foo"}}"#).unwrap();
        assert_eq!(msg, ClientMessage::JoinGroup { group: "Foo".to_string() });

        let msg: ClientMessage = serde_json::from_str(r#"{"type":"StopExecution"}"#).unwrap();
        assert_eq!(msg, ClientMessage::StopExecution);

        let msg: ClientMessage = serde_json::from_value(json!({
            "type": "UpdateSection",
            "payload": {
                "profile": "Foo",
                "section": { "kind": "charts", "data": { "collections": { "imdb": true } } }
            }
        }))
        .unwrap();
        match msg {
            ClientMessage::UpdateSection { profile, section: ConfigSection::Charts(charts) } => {
                assert_eq!(profile, "Foo");
                assert_eq!(charts.collections.get("imdb"), Some(&true));
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_malformed_messages_are_rejected() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"Explode"}"#).is_err());
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"JoinGroup","payload":{}}"#).is_err());
        assert!(serde_json::from_value::<ClientMessage>(json!({
            "type": "UpdateSection",
            "payload": {
                "profile": "Foo",
                "section": { "kind": "charts", "data": { "collections": {}, "extra": 1 } }
            }
        }))
        .is_err());
    }

    #[test]
    fn test_server_event_wire_shape() {
        let event = ServerEvent::PageChanged { profile: "Foo".to_string(), page: "overlays".to_string() };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value, json!({ "event": "PageChanged", "data": { "profile": "Foo", "page": "overlays" } }));
        assert_eq!(event.name(), "PageChanged");
    }

    #[test]
    fn test_error_event_carries_field() {
        let event = ServerEvent::from_error(&WizardError::validation("Plex.Token", "required"));
        match event {
            ServerEvent::Error { kind, field, .. } => {
                assert_eq!(kind, "ValidationError");
                assert_eq!(field.as_deref(), Some("Plex.Token"));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_charts_section_merges() {
        let mut profile = Profile::new("Foo");
        profile.set_collection("basic", true);

        let section = ConfigSection::Charts(ChartsSection {
            collections: [("imdb".to_string(), true), ("basic".to_string(), false)].into_iter().collect(),
        });
        let event = section.apply(&mut profile).unwrap();

        assert!(profile.is_collection_enabled("imdb"));
        assert!(!profile.is_collection_enabled("basic"));
        assert_eq!(event.name(), "ChartsChanged");
    }

    #[test]
    fn test_unknown_collection_is_rejected() {
        let mut profile = Profile::new("Foo");
        let section = ConfigSection::Charts(ChartsSection {
            collections: [("bogus".to_string(), true)].into_iter().collect(),
        });
        let err = section.apply(&mut profile).unwrap_err();
        assert_eq!(err.field(), Some("Charts.bogus"));
        assert!(profile.collections.is_empty());
    }

    #[test]
    fn test_overlay_builder_level_is_checked() {
        let mut profile = Profile::new("Foo");
        let mut overlay = OverlayConfiguration::enabled("status");
        overlay.builder_level = BuilderLevel::Episode;
        let section = ConfigSection::Overlays(OverlaysSection {
            overlays: [("status".to_string(), overlay)].into_iter().collect(),
        });
        let err = section.apply(&mut profile).unwrap_err();
        assert_eq!(err.field(), Some("Overlays.status.BuilderLevel"));
    }

    #[test]
    fn test_overlay_type_follows_key() {
        let mut profile = Profile::new("Foo");
        let overlay = OverlayConfiguration { is_enabled: true, ..Default::default() };
        let section = ConfigSection::Overlays(OverlaysSection {
            overlays: [("resolution".to_string(), overlay)].into_iter().collect(),
        });
        section.apply(&mut profile).unwrap();
        assert_eq!(profile.overlays["resolution"].overlay_type, "resolution");
    }

    #[test]
    fn test_connections_section_replaces_libraries() {
        let mut profile = Profile::new("Foo");
        profile.select_library("Old");
        let mut plex = PlexConnection::default();
        plex.url = "http://10.0.0.2:32400".to_string();

        let section = ConfigSection::Connections(ConnectionsSection {
            plex,
            tmdb: TmdbConnection::default(),
            selected_libraries: Some(vec!["Movies".to_string(), "Movies".to_string(), "TV".to_string()]),
            root_directory: None,
        });
        section.apply(&mut profile).unwrap();

        assert_eq!(profile.plex.url, "http://10.0.0.2:32400");
        assert_eq!(profile.selected_libraries, vec!["Movies", "TV"]);
    }
}
