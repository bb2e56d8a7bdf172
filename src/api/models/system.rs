use serde::Serialize;

/// Overall health status
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
}

/// Response for GET /health
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: &'static str,
    /// Unix seconds
    pub timestamp: i64,
    /// Open hub connections
    pub connections: usize,
    /// Profile whose Kometa run is in flight, if any
    pub running_profile: Option<String>,
}
