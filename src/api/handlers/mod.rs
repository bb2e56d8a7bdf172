pub mod catalog;
pub mod profiles;
pub mod system;

pub use catalog::*;
pub use profiles::*;
pub use system::*;

use crate::core::config::Config;
use crate::core::profile_store::ProfileStore;
use crate::hub::HubService;
use axum::extract::FromRef;
use std::sync::Arc;

/// Shared application state for handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ProfileStore>,
    pub hub_service: Arc<HubService>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(hub_service: Arc<HubService>, config: Config) -> Self {
        Self {
            store: hub_service.store().clone(),
            hub_service,
            config: Arc::new(config),
        }
    }
}

impl FromRef<AppState> for Arc<HubService> {
    fn from_ref(state: &AppState) -> Self {
        state.hub_service.clone()
    }
}
