// libs/scheduling-cell/src/router.rs
use std::sync::Arc;

use axum::{middleware, routing::post, Router};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn scheduling_routes(state: Arc<AppConfig>) -> Router {
    // Every scheduling operation requires an authenticated clinic member.
    let protected_routes = Router::new()
        .route("/validate", post(handlers::validate_booking))
        .route("/", post(handlers::book_appointment))
        .route("/suggest", post(handlers::suggest_slots))
        .route("/{appointment_id}/cancel", post(handlers::cancel_appointment))
        .route(
            "/{appointment_id}/reschedule-request",
            post(handlers::request_reschedule),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
