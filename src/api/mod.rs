//! Control API using Axum
//!
//! Exposes the session control surface for UI-equivalent clients. All
//! responses use the envelope in [`envelope`].

pub mod envelope;
pub mod handlers;
mod routes;

pub use handlers::ApiState;

use axum::http::{header, Method};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Requests handled concurrently. Utterance requests wait on the coaching
/// backend, so this bounds outstanding backend calls from the API.
const MAX_CONCURRENT_REQUESTS: usize = 32;

/// Build a CORS layer that is restrictive by default (same-origin only).
///
/// Set `CHIMERA_CORS_ORIGINS` to a comma-separated list of allowed origins
/// for development (e.g., `http://localhost:5173`).
fn build_cors_layer() -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    match std::env::var("CHIMERA_CORS_ORIGINS") {
        Ok(origins) => {
            let allowed: Vec<_> = origins
                .split(',')
                .filter_map(|o| o.trim().parse().ok())
                .collect();
            tracing::info!(origins = %origins, "CORS: allowing configured origins");
            base.allow_origin(allowed)
        }
        Err(_) => base,
    }
}

/// Create the complete application router.
pub fn create_app(state: ApiState) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_routes(state.clone()))
        .merge(routes::health_routes(state))
        .layer(ConcurrencyLimitLayer::new(MAX_CONCURRENT_REQUESTS))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer())
}
