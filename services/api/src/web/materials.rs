//! services/api/src/web/materials.rs
//!
//! Upload and lookup of course material submissions.

use crate::error::ApiError;
use crate::pipeline::submissions::{store_submission, IncomingFile, MaterialUpload};
use crate::web::protocol::{parse_id, ErrorBody, SubmissionResponse};
use crate::web::state::AppState;
use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use mock_exam_core::ports::PortError;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Reads the whole form before anything is validated or stored.
async fn read_form(mut multipart: Multipart) -> Result<MaterialUpload, ApiError> {
    let mut upload = MaterialUpload::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Failed to read multipart data: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "courseTitle" => {
                upload.course_title = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(e.to_string()))?;
            }
            "courseDescription" => {
                upload.course_description = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::bad_request(e.to_string()))?,
                );
            }
            "slides" | "sampleExam" => {
                // Plain text values under a file field are ignored.
                let Some(file_name) = field.file_name().map(str::to_string) else {
                    continue;
                };
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(|e| {
                    ApiError::bad_request(format!("Failed to read {}: {}", file_name, e))
                })?;
                let file = IncomingFile {
                    file_name,
                    content_type,
                    bytes,
                };
                if name == "slides" {
                    upload.slides.push(file);
                } else {
                    upload.sample_exams.push(file);
                }
            }
            _ => {}
        }
    }

    Ok(upload)
}

/// Upload course materials.
///
/// Accepts `courseTitle`, an optional `courseDescription`, one or more `slides`
/// files and any number of `sampleExam` files.
#[utoipa::path(
    post,
    path = "/materials",
    request_body(content_type = "multipart/form-data", description = "Course title, description, slides and sample exams."),
    responses(
        (status = 201, description = "Materials stored", body = SubmissionResponse),
        (status = 400, description = "Invalid form or storage failure", body = ErrorBody),
        (status = 401, description = "Missing or invalid access token", body = ErrorBody)
    ),
    security(("bearer_auth" = []))
)]
pub async fn upload_materials_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let upload = read_form(multipart).await?.validate()?;
    let submission = store_submission(state.db.as_ref(), state.store.as_ref(), user_id, upload).await?;
    info!("User {} uploaded submission {}", user_id, submission.id);

    Ok((
        StatusCode::CREATED,
        Json(SubmissionResponse {
            submission: submission.into(),
        }),
    ))
}

/// Fetch one of the caller's submissions.
#[utoipa::path(
    get,
    path = "/submissions/{id}",
    params(("id" = Uuid, Path, description = "Submission id")),
    responses(
        (status = 200, description = "The submission", body = SubmissionResponse),
        (status = 401, description = "Missing or invalid access token", body = ErrorBody),
        (status = 403, description = "Owned by someone else", body = ErrorBody),
        (status = 404, description = "No such submission", body = ErrorBody)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_submission_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(raw_id): Path<String>,
) -> Result<Json<SubmissionResponse>, ApiError> {
    let submission_id = parse_id(&raw_id)?;
    let submission = state.db.get_submission_by_id(submission_id).await?;
    if submission.owner_id != user_id {
        return Err(PortError::Forbidden(
            "You do not have access to these course materials.".to_string(),
        )
        .into());
    }
    Ok(Json(SubmissionResponse {
        submission: submission.into(),
    }))
}
