use super::AppState;
use crate::api::models::{
    BestServerRequest, BestServerResponse, CreateProfileRequest, ProfileSummary, WriteConfigResponse,
};
use crate::core::error::{Result, WizardError};
use crate::core::generator;
use crate::core::profile::{PlexServer, Profile};
use crate::hub::Origin;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};

/// Handler for GET /api/profiles
pub async fn list_profiles(State(state): State<AppState>) -> Json<Vec<ProfileSummary>> {
    let profiles = state.store.list_all().await;
    Json(profiles.iter().map(ProfileSummary::from).collect())
}

/// Handler for POST /api/profiles
pub async fn create_profile(
    State(state): State<AppState>,
    Json(req): Json<CreateProfileRequest>,
) -> Result<impl IntoResponse> {
    let profile = state.store.create(&req.name, &Origin::System).await?;
    Ok((StatusCode::CREATED, Json(profile)))
}

/// Handler for GET /api/profiles/:name
pub async fn get_profile(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Profile>> {
    Ok(Json(state.store.get(&name).await?))
}

/// Handler for PUT /api/profiles/:name
pub async fn update_profile(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(profile): Json<Profile>,
) -> Result<Json<Profile>> {
    if profile.name != name {
        return Err(WizardError::InvalidRequest(format!(
            "Body names profile '{}' but the path names '{}'",
            profile.name, name
        )));
    }
    Ok(Json(state.store.update(profile, &Origin::System).await?))
}

/// Handler for DELETE /api/profiles/:name
pub async fn delete_profile(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode> {
    state.store.delete(&name, &Origin::System).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for GET /api/profiles/:name/config - Render without writing
pub async fn preview_config(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse> {
    let profile = state.store.get(&name).await?;
    let yaml = generator::generate(&profile)?;
    Ok(([(header::CONTENT_TYPE, "text/yaml; charset=utf-8")], yaml))
}

/// Handler for POST /api/profiles/:name/config - Write config.yml
pub async fn write_config(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<WriteConfigResponse>> {
    let (path, summary) = state.hub_service.write_config(&name, &Origin::System).await?;
    Ok(Json(WriteConfigResponse { path, summary }))
}

/// Handler for POST /api/plex/best-server
pub async fn best_server(Json(req): Json<BestServerRequest>) -> Result<Json<BestServerResponse>> {
    let server = PlexServer::select_best(&req.servers)
        .ok_or_else(|| WizardError::validation("Plex.Servers", "No servers to choose from"))?;
    let scheme = req.scheme.as_deref().unwrap_or("http");
    if scheme != "http" && scheme != "https" {
        return Err(WizardError::validation("Plex.Scheme", "Scheme must be http or https"));
    }

    Ok(Json(BestServerResponse {
        name: server.name.clone(),
        address: server.best_address().to_string(),
        port: server.best_port(),
        url: server.connection_url(scheme),
    }))
}
