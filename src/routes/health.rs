use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::resource::ResourceSnapshot;
use crate::state::SharedState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub cache_enabled: bool,
}

pub async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        cache_enabled: state.cache.is_enabled(),
    })
}

#[derive(Serialize)]
pub struct ServerStatusResponse {
    pub resources: ResourceSnapshot,
    pub cache_enabled: bool,
    pub port: u16,
}

/// Current host resource usage, taken fresh on every call.
pub async fn server_status(State(state): State<SharedState>) -> Json<ServerStatusResponse> {
    Json(ServerStatusResponse {
        resources: state.sensor.snapshot(),
        cache_enabled: state.cache.is_enabled(),
        port: state.config.port,
    })
}
