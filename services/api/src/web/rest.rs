//! services/api/src/web/rest.rs
//!
//! The health probe and the master definition for the OpenAPI specification.

use crate::web::protocol::{
    DownloadResponse, ErrorBody, ExamResponse, ExamView, GenerateExamPayload, HealthResponse,
    PaymentRequiredResponse, SubmissionResponse, SubmissionView,
};
use axum::response::Json;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        health_handler,
        crate::web::materials::upload_materials_handler,
        crate::web::materials::get_submission_handler,
        crate::web::exams::generate_exam_handler,
        crate::web::exams::get_exam_handler,
        crate::web::downloads::download_exam_handler,
        crate::web::downloads::preview_exam_handler,
    ),
    components(
        schemas(
            GenerateExamPayload,
            SubmissionView,
            SubmissionResponse,
            ExamView,
            ExamResponse,
            DownloadResponse,
            PaymentRequiredResponse,
            ErrorBody,
            HealthResponse
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Mock Exam API", description = "Upload course materials, generate mock exams and download them as PDF.")
    )
)]
pub struct ApiDoc;

/// Registers the bearer scheme referenced by the protected paths.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Liveness probe. Needs no authentication.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "The service is up", body = HealthResponse))
)]
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_every_route() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        for expected in [
            "/health",
            "/materials",
            "/submissions/{id}",
            "/exams",
            "/exams/{id}",
            "/exams/{id}/download",
            "/exams/{id}/preview",
        ] {
            assert!(
                paths.iter().any(|p| p.as_str() == expected),
                "missing {}",
                expected
            );
        }
        let components = doc.components.unwrap();
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let Json(body) = health_handler().await;
        assert_eq!(body.status, "ok");
    }
}
