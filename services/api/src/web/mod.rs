pub mod downloads;
pub mod exams;
pub mod materials;
pub mod middleware;
pub mod protocol;
pub mod rest;
pub mod state;

pub use downloads::{download_exam_handler, preview_exam_handler};
pub use exams::{generate_exam_handler, get_exam_handler};
pub use materials::{get_submission_handler, upload_materials_handler};
pub use middleware::require_auth;
pub use rest::{health_handler, ApiDoc};

use crate::web::state::AppState;
use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// All API routes. Everything except `/health` requires a bearer token.
pub fn router(state: Arc<AppState>) -> Router {
    let public_routes = Router::new().route("/health", get(health_handler));

    let protected_routes = Router::new()
        .route("/materials", post(upload_materials_handler))
        .route("/submissions/{id}", get(get_submission_handler))
        .route("/exams", post(generate_exam_handler))
        .route("/exams/{id}", get(get_exam_handler))
        .route("/exams/{id}/download", get(download_exam_handler))
        .route("/exams/{id}/preview", get(preview_exam_handler))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
