//! services/api/src/web/exams.rs
//!
//! Exam generation (streamed as NDJSON) and exam lookup.

use crate::error::ApiError;
use crate::pipeline::downloads::load_owned_exam;
use crate::pipeline::events::{ndjson_body, EventSink};
use crate::pipeline::job::{drive, validate};
use crate::web::protocol::{parse_id, ErrorBody, ExamResponse, GenerateExamPayload};
use crate::web::state::AppState;
use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Path, State},
    http::header,
    response::{IntoResponse, Json, Response},
    Extension,
};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Events buffered between the job and a slow reader.
const EVENT_BUFFER: usize = 64;

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson; charset=utf-8";

/// Generate a mock exam from a submission.
///
/// Validation failures are answered synchronously with a JSON error. Once the
/// job starts, the response is a stream of newline-delimited JSON events:
/// `status` and `chunk` events in order, then exactly one `done` or `error`.
#[utoipa::path(
    post,
    path = "/exams",
    request_body = GenerateExamPayload,
    responses(
        (status = 200, description = "NDJSON event stream", content_type = "application/x-ndjson"),
        (status = 400, description = "Missing or malformed submissionId", body = ErrorBody),
        (status = 401, description = "Missing or invalid access token", body = ErrorBody),
        (status = 403, description = "Submission owned by someone else", body = ErrorBody),
        (status = 404, description = "No such submission", body = ErrorBody)
    ),
    security(("bearer_auth" = []))
)]
pub async fn generate_exam_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    payload: Result<Json<GenerateExamPayload>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(payload) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let request = payload.into_request(&state.providers)?;

    let ctx = state.job_context();
    let job = validate(&ctx, user_id, request).await?;
    info!(
        "Starting exam generation for submission {} (provider {})",
        job.submission.id, job.request.provider
    );

    let (sink, rx) = EventSink::channel(EVENT_BUFFER);
    tokio::spawn(drive(job, ctx, sink));

    Ok((
        [
            (header::CONTENT_TYPE, NDJSON_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(ndjson_body(rx)),
    )
        .into_response())
}

/// Fetch one of the caller's generated exams.
#[utoipa::path(
    get,
    path = "/exams/{id}",
    params(("id" = Uuid, Path, description = "Exam id")),
    responses(
        (status = 200, description = "The exam record", body = ExamResponse),
        (status = 401, description = "Missing or invalid access token", body = ErrorBody),
        (status = 403, description = "Owned by someone else", body = ErrorBody),
        (status = 404, description = "No such exam", body = ErrorBody)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_exam_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(raw_id): Path<String>,
) -> Result<Json<ExamResponse>, ApiError> {
    let exam = load_owned_exam(state.db.as_ref(), user_id, parse_id(&raw_id)?).await?;
    Ok(Json(ExamResponse { exam: exam.into() }))
}
