//! services/api/src/web/downloads.rs
//!
//! Paid/free download links and first-page previews.

use crate::error::ApiError;
use crate::pipeline::downloads::issue_download;
use crate::pipeline::preview::load_preview;
use crate::web::protocol::{
    parse_id, DownloadQuery, DownloadReply, DownloadResponse, ErrorBody, PaymentRequiredResponse,
};
use crate::web::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    Extension,
};
use std::sync::Arc;
use uuid::Uuid;

/// Get a short-lived download link for an exam PDF.
///
/// The first downloads are free; after that each one costs a fixed fee and
/// must be confirmed with `confirmPaid=true`.
#[utoipa::path(
    get,
    path = "/exams/{id}/download",
    params(("id" = Uuid, Path, description = "Exam id"), DownloadQuery),
    responses(
        (status = 200, description = "Signed link issued", body = DownloadResponse),
        (status = 400, description = "The exam has no PDF yet", body = ErrorBody),
        (status = 401, description = "Missing or invalid access token", body = ErrorBody),
        (status = 402, description = "Payment confirmation required", body = PaymentRequiredResponse),
        (status = 403, description = "Owned by someone else", body = ErrorBody),
        (status = 404, description = "No such exam", body = ErrorBody)
    ),
    security(("bearer_auth" = []))
)]
pub async fn download_exam_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(raw_id): Path<String>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, ApiError> {
    let exam_id = parse_id(&raw_id)?;
    let outcome = issue_download(
        state.db.as_ref(),
        state.store.as_ref(),
        user_id,
        exam_id,
        query.confirmed(),
    )
    .await?;

    Ok(match DownloadReply::from(outcome) {
        DownloadReply::Issued(body) => Json(body).into_response(),
        DownloadReply::PaymentRequired(body) => {
            (StatusCode::PAYMENT_REQUIRED, Json(body)).into_response()
        }
    })
}

/// Get the first page of an exam PDF.
#[utoipa::path(
    get,
    path = "/exams/{id}/preview",
    params(("id" = Uuid, Path, description = "Exam id")),
    responses(
        (status = 200, description = "Single-page PDF", content_type = "application/pdf"),
        (status = 400, description = "No PDF, or the PDF is empty", body = ErrorBody),
        (status = 401, description = "Missing or invalid access token", body = ErrorBody),
        (status = 403, description = "Owned by someone else", body = ErrorBody),
        (status = 404, description = "No such exam", body = ErrorBody)
    ),
    security(("bearer_auth" = []))
)]
pub async fn preview_exam_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(raw_id): Path<String>,
) -> Result<Response, ApiError> {
    let exam_id = parse_id(&raw_id)?;
    let pdf = load_preview(state.db.as_ref(), state.store.as_ref(), user_id, exam_id).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf"),
            (header::CONTENT_DISPOSITION, "inline; filename=preview.pdf"),
            (header::CACHE_CONTROL, "private, max-age=300"),
        ],
        pdf,
    )
        .into_response())
}
