use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::SharedState;

pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health
        .route("/health", get(crate::routes::health::health))
        .route("/server-status", get(crate::routes::health::server_status))
        // Jobs
        .route("/durations", get(crate::routes::jobs::list_durations))
        .route("/jobs", post(crate::routes::jobs::start_job))
        .route("/jobs", get(crate::routes::jobs::list_jobs))
        .route("/jobs/{id}", get(crate::routes::jobs::get_job))
        .route("/jobs/{id}", delete(crate::routes::jobs::delete_job))
        .route("/jobs/{id}/poll", post(crate::routes::jobs::poll_job))
        .route("/jobs/{id}/stop", post(crate::routes::jobs::stop_job))
        // Comparison
        .route("/comparison", post(crate::routes::comparison::compare))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
