use crate::core::catalog::{
    DefaultCollection, LibraryType, OverlayInfo, ServiceInfo, COLLECTIONS, OVERLAYS, SERVICES,
};
use axum::{extract::Query, Json};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct CatalogQuery {
    /// Only entries that apply to this library kind
    pub library_type: Option<LibraryType>,
}

/// Handler for GET /api/catalog/collections
pub async fn list_collections(Query(query): Query<CatalogQuery>) -> Json<Vec<&'static DefaultCollection>> {
    Json(
        COLLECTIONS
            .iter()
            .filter(|c| query.library_type.map_or(true, |t| c.scope.includes(t)))
            .collect(),
    )
}

/// Handler for GET /api/catalog/overlays
pub async fn list_overlays(Query(query): Query<CatalogQuery>) -> Json<Vec<&'static OverlayInfo>> {
    Json(
        OVERLAYS
            .iter()
            .filter(|o| query.library_type.map_or(true, |t| o.scope.includes(t)))
            .collect(),
    )
}

/// Handler for GET /api/catalog/services
pub async fn list_services() -> Json<&'static [ServiceInfo]> {
    Json(SERVICES.as_slice())
}
