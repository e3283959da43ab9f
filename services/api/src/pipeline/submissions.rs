//! services/api/src/pipeline/submissions.rs
//!
//! Validation and storage of uploaded course materials.

use bytes::Bytes;
use mock_exam_core::domain::{NewSubmission, Submission};
use mock_exam_core::ports::{DatabaseService, ObjectStore, PortError, PortResult};
use mock_exam_core::OneOrMany;
use regex::Regex;
use std::sync::LazyLock;
use tracing::info;
use uuid::Uuid;

pub const MAX_FILE_BYTES: usize = 40 * 1024 * 1024;
pub const TITLE_MIN_CHARS: usize = 3;
pub const TITLE_MAX_CHARS: usize = 120;
pub const DESCRIPTION_MAX_CHARS: usize = 500;

pub const ACCEPTED_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
];

/// One file part of the upload form.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// The parsed upload form, before validation.
#[derive(Debug, Clone, Default)]
pub struct MaterialUpload {
    pub course_title: String,
    pub course_description: Option<String>,
    pub slides: Vec<IncomingFile>,
    pub sample_exams: Vec<IncomingFile>,
}

/// An upload that passed every check; nothing has been written yet.
#[derive(Debug, Clone)]
pub struct ValidUpload {
    course_title: String,
    course_description: Option<String>,
    slides: Vec<IncomingFile>,
    sample_exams: Vec<IncomingFile>,
}

fn check_file(file: &IncomingFile, field: &str) -> PortResult<()> {
    let mime = file.content_type.as_deref().unwrap_or("");
    if !ACCEPTED_MIME_TYPES.contains(&mime) {
        return Err(PortError::BadRequest(format!(
            "{} must be a PDF or PowerPoint file. Received {}",
            field,
            if mime.is_empty() { "an unknown type" } else { mime }
        )));
    }
    if file.bytes.len() > MAX_FILE_BYTES {
        return Err(PortError::BadRequest(format!(
            "{} exceeds the {}MB limit.",
            field,
            MAX_FILE_BYTES / (1024 * 1024)
        )));
    }
    Ok(())
}

impl MaterialUpload {
    pub fn validate(self) -> PortResult<ValidUpload> {
        let course_title = self.course_title.trim().to_string();
        let title_len = course_title.chars().count();
        if title_len < TITLE_MIN_CHARS || title_len > TITLE_MAX_CHARS {
            return Err(PortError::BadRequest(format!(
                "Course title must be between {} and {} characters.",
                TITLE_MIN_CHARS, TITLE_MAX_CHARS
            )));
        }

        let course_description = self
            .course_description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        if let Some(description) = &course_description {
            if description.chars().count() > DESCRIPTION_MAX_CHARS {
                return Err(PortError::BadRequest(format!(
                    "Course description must be at most {} characters.",
                    DESCRIPTION_MAX_CHARS
                )));
            }
        }

        if self.slides.is_empty() {
            return Err(PortError::BadRequest("Slides file is required.".to_string()));
        }
        for file in &self.slides {
            check_file(file, "slides")?;
        }
        for file in &self.sample_exams {
            check_file(file, "sampleExam")?;
        }

        Ok(ValidUpload {
            course_title,
            course_description,
            slides: self.slides,
            sample_exams: self.sample_exams,
        })
    }
}

static UNSAFE_KEY_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("valid key character pattern"));

/// Replaces anything outside `[A-Za-z0-9._-]` so the name is a safe object key segment.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned = UNSAFE_KEY_CHARS.replace_all(base, "_");
    let cleaned = cleaned.trim_matches(['_', '.']).to_string();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

/// Object key for an uploaded material: `{user}/{category}/{random}-{name}`.
pub fn storage_key(user_id: Uuid, category: &str, file_name: &str) -> String {
    format!(
        "{}/{}/{}-{}",
        user_id,
        category,
        Uuid::new_v4(),
        sanitize_file_name(file_name)
    )
}

async fn upload_all(
    store: &dyn ObjectStore,
    user_id: Uuid,
    category: &str,
    files: Vec<IncomingFile>,
) -> PortResult<Vec<String>> {
    let mut paths = Vec::with_capacity(files.len());
    for file in files {
        let path = storage_key(user_id, category, &file.file_name);
        let content_type = file
            .content_type
            .unwrap_or_else(|| "application/octet-stream".to_string());
        store
            .upload(&path, file.bytes, &content_type)
            .await
            .map_err(|e| match e {
                PortError::Upstream(message) => PortError::Upstream(format!(
                    "Failed to upload {}: {}",
                    file.file_name, message
                )),
                other => other,
            })?;
        paths.push(path);
    }
    Ok(paths)
}

/// Uploads slides, then sample exams, then records the submission.
pub async fn store_submission(
    db: &dyn DatabaseService,
    store: &dyn ObjectStore,
    user_id: Uuid,
    upload: ValidUpload,
) -> PortResult<Submission> {
    store.ensure_bucket().await?;

    let slide_paths = upload_all(store, user_id, "slides", upload.slides).await?;
    let sample_paths = upload_all(store, user_id, "samples", upload.sample_exams).await?;

    let submission = db
        .create_submission(NewSubmission {
            owner_id: user_id,
            course_title: upload.course_title,
            course_description: upload.course_description,
            slide_paths: OneOrMany::new(slide_paths),
            sample_paths: OneOrMany::new(sample_paths),
        })
        .await?;

    info!(
        "Stored submission {} ({} slide file(s), {} sample exam(s))",
        submission.id,
        submission.slide_paths.len(),
        submission.sample_paths.len()
    );
    Ok(submission)
}
