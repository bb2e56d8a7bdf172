//! API routes

use crate::api::handlers::{
    best_server, create_profile, delete_profile, get_profile, health_check, list_collections,
    list_overlays, list_profiles, list_services, preview_config, update_profile, write_config,
    AppState,
};
use crate::hub::hub_socket;
use axum::{
    routing::{get, post},
    Router,
};

/// Build the API routes
pub fn build_api_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        // Profiles
        .route("/api/profiles", get(list_profiles).post(create_profile))
        .route(
            "/api/profiles/:name",
            get(get_profile).put(update_profile).delete(delete_profile),
        )
        .route("/api/profiles/:name/config", get(preview_config).post(write_config))
        // Catalogs
        .route("/api/catalog/collections", get(list_collections))
        .route("/api/catalog/overlays", get(list_overlays))
        .route("/api/catalog/services", get(list_services))
        .route("/api/plex/best-server", post(best_server))
        // Sync hub
        .route("/hub", get(hub_socket))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::server::ServerControl;
    use crate::core::config::{ExecutionConfig, StorageConfig};
    use crate::core::persistence::MemoryPersistence;
    use crate::core::profile_store::ProfileStore;
    use crate::core::runner::KometaProcessRunner;
    use crate::core::scheduler::InMemoryScheduler;
    use crate::core::Config;
    use crate::hub::{EventSink, ExecutionControl, HubService, ServerEvent, SyncHub};
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::util::ServiceExt;

    struct TestApp {
        router: Router,
        state: AppState,
        _dir: tempfile::TempDir,
    }

    async fn app() -> TestApp {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::defaults().unwrap();
        config.storage = StorageConfig {
            profiles_dir: dir.path().join("profiles"),
            output_dir: dir.path().join("configs"),
        };
        config.execution = ExecutionConfig {
            kometa_command: "definitely-not-kometa-binary".to_string(),
            kometa_args: Vec::new(),
            working_dir: None,
        };

        let hub = Arc::new(SyncHub::new());
        let store = Arc::new(
            ProfileStore::open(Arc::new(MemoryPersistence::new()), Some(hub.clone() as Arc<dyn EventSink>))
                .await
                .unwrap(),
        );
        let runner = Arc::new(KometaProcessRunner::new(&config.execution));
        let execution = Arc::new(ExecutionControl::new(runner, hub.clone()));
        let service = Arc::new(HubService::new(
            store,
            hub,
            execution,
            Arc::new(InMemoryScheduler::new()),
            config.storage.clone(),
            config.execution.clone(),
            ServerControl::new(),
        ));
        let state = AppState::new(service, config);
        TestApp {
            router: build_api_routes(state.clone()),
            state,
            _dir: dir,
        }
    }

    async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        let response = router.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    fn json_of(bytes: &[u8]) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = app().await;
        let (status, body) = send(&app.router, "GET", "/health", None).await;

        assert_eq!(status, StatusCode::OK);
        let value = json_of(&body);
        assert_eq!(value["status"], "ok");
        assert!(value["version"].is_string());
        assert_eq!(value["connections"], 0);
        assert!(value["running_profile"].is_null());
    }

    #[tokio::test]
    async fn test_profile_crud() {
        let app = app().await;

        let (status, _) = send(&app.router, "POST", "/api/profiles", Some(json!({ "name": "Foo" }))).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = send(&app.router, "POST", "/api/profiles", Some(json!({ "name": "Foo" }))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json_of(&body)["error"], "DuplicateNameError");

        let (status, body) = send(&app.router, "GET", "/api/profiles/Foo", None).await;
        assert_eq!(status, StatusCode::OK);
        let mut profile = json_of(&body);
        profile["plex"]["timeout"] = json!(90);

        let (status, body) = send(&app.router, "PUT", "/api/profiles/Foo", Some(profile)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_of(&body)["plex"]["timeout"], 90);

        let (_, body) = send(&app.router, "GET", "/api/profiles", None).await;
        let list = json_of(&body);
        assert_eq!(list.as_array().unwrap().len(), 1);
        assert_eq!(list[0]["name"], "Foo");

        let (status, _) = send(&app.router, "DELETE", "/api/profiles/Foo", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app.router, "DELETE", "/api/profiles/Foo", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app.router, "GET", "/api/profiles/Foo", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_put_with_mismatched_name_is_rejected() {
        let app = app().await;
        send(&app.router, "POST", "/api/profiles", Some(json!({ "name": "Foo" }))).await;
        let (_, body) = send(&app.router, "GET", "/api/profiles/Foo", None).await;

        let (status, _) = send(&app.router, "PUT", "/api/profiles/Bar", Some(json_of(&body))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_put_normalizes_and_validates_profile() {
        let app = app().await;
        send(&app.router, "POST", "/api/profiles", Some(json!({ "name": "Foo" }))).await;
        let (_, body) = send(&app.router, "GET", "/api/profiles/Foo", None).await;
        let original = json_of(&body);

        let mut profile = original.clone();
        profile["selected_libraries"] = json!(["Movies", "TV Shows", "Movies"]);
        let (status, body) = send(&app.router, "PUT", "/api/profiles/Foo", Some(profile)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_of(&body)["selected_libraries"], json!(["Movies", "TV Shows"]));

        let mut profile = original;
        profile["collections"] = json!({ "bogus": true });
        let (status, body) = send(&app.router, "PUT", "/api/profiles/Foo", Some(profile)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json_of(&body)["details"]["field"], "Charts.bogus");

        let (_, body) = send(&app.router, "GET", "/api/profiles/Foo", None).await;
        assert!(json_of(&body)["collections"].get("bogus").is_none());
    }

    #[tokio::test]
    async fn test_config_preview_and_write() {
        let app = app().await;
        let mut profile = app.state.store.create("Foo", &crate::hub::Origin::System).await.unwrap();
        profile.plex.url = "http://192.168.1.5:32400".to_string();
        profile.plex.token = "token".to_string();
        profile.select_library("Movies");
        profile.set_collection("imdb", true);
        app.state.store.update(profile, &crate::hub::Origin::System).await.unwrap();

        let (status, body) = send(&app.router, "GET", "/api/profiles/Foo/config", None).await;
        assert_eq!(status, StatusCode::OK);
        let yaml = String::from_utf8(body).unwrap();
        assert!(yaml.starts_with("## Kometa configuration for profile: Foo"));

        let (status, body) = send(&app.router, "POST", "/api/profiles/Foo/config", None).await;
        assert_eq!(status, StatusCode::OK);
        let value = json_of(&body);
        assert_eq!(value["summary"]["libraries"][0]["name"], "Movies");
        let path = std::path::PathBuf::from(value["path"].as_str().unwrap());
        assert_eq!(std::fs::read_to_string(path).unwrap(), yaml);
    }

    #[tokio::test]
    async fn test_preview_without_plex_url_is_validation_error() {
        let app = app().await;
        send(&app.router, "POST", "/api/profiles", Some(json!({ "name": "Foo" }))).await;

        let (status, body) = send(&app.router, "GET", "/api/profiles/Foo/config", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let value = json_of(&body);
        assert_eq!(value["error"], "ValidationError");
        assert_eq!(value["details"]["field"], "Plex.Url");
    }

    #[tokio::test]
    async fn test_rest_create_reaches_hub_clients() {
        let app = app().await;
        let (_id, mut rx) = app.state.hub_service.hub().connect().await;
        assert_eq!(rx.recv().await.unwrap().name(), "Connected");

        send(&app.router, "POST", "/api/profiles", Some(json!({ "name": "Foo" }))).await;

        assert!(matches!(rx.try_recv(), Ok(ServerEvent::ProfileCreated { .. })));
    }

    #[tokio::test]
    async fn test_catalog_filtering() {
        let app = app().await;

        let (_, all) = send(&app.router, "GET", "/api/catalog/overlays", None).await;
        let (_, movies) = send(&app.router, "GET", "/api/catalog/overlays?library_type=movie", None).await;
        let all = json_of(&all);
        let movies = json_of(&movies);
        assert!(movies.as_array().unwrap().len() < all.as_array().unwrap().len());
        assert!(movies
            .as_array()
            .unwrap()
            .iter()
            .all(|o| o["scope"] == "movie" || o["scope"] == "both"));

        let (status, services) = send(&app.router, "GET", "/api/catalog/services", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(!json_of(&services).as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_best_server_prefers_lan() {
        let app = app().await;
        let body = json!({
            "servers": [
                { "name": "remote", "public_address": "198.51.100.7", "port": 40000 },
                {
                    "name": "home",
                    "public_address": "203.0.113.4",
                    "local_addresses": "192.168.1.5, 10.0.0.9",
                    "port": 12345
                }
            ]
        });

        let (status, response) = send(&app.router, "POST", "/api/plex/best-server", Some(body)).await;
        assert_eq!(status, StatusCode::OK);
        let value = json_of(&response);
        assert_eq!(value["name"], "home");
        assert_eq!(value["url"], "http://192.168.1.5:32400");

        let (status, _) =
            send(&app.router, "POST", "/api/plex/best-server", Some(json!({ "servers": [] }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
