//! Router assembly.

use axum::extract::Extension;
use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::kernel::CourierDeps;
use crate::server::routes::{get_command, health_handler, submit_command};

/// Build the axum application router.
pub fn build_router(deps: CourierDeps) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/commands/:name", post(submit_command).get(get_command))
        .route("/health", get(health_handler))
        .layer(Extension(deps))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
