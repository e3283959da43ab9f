//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mock_exam_core::domain::{
    DownloadEvent, ExamGeneration, NewExamGeneration, NewSubmission, Profile, Submission,
    FREE_DOWNLOAD_GRANT, STATUS_COMPLETED,
};
use mock_exam_core::ports::{DatabaseService, PortError, PortResult};
use mock_exam_core::OneOrMany;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn not_found_or_unexpected(e: sqlx::Error, what: String) -> PortError {
    match e {
        sqlx::Error::RowNotFound => PortError::NotFound(what),
        _ => PortError::Unexpected(e.to_string()),
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct ProfileRecord {
    id: Uuid,
    free_downloads_remaining: i32,
}
impl ProfileRecord {
    fn to_domain(self) -> Profile {
        Profile {
            id: self.id,
            free_downloads_remaining: self.free_downloads_remaining,
        }
    }
}

#[derive(FromRow)]
struct SubmissionRecord {
    id: Uuid,
    owner_id: Uuid,
    course_title: String,
    course_description: Option<String>,
    slides_storage_path: String,
    sample_storage_path: Option<String>,
    created_at: DateTime<Utc>,
}
impl SubmissionRecord {
    fn to_domain(self) -> Submission {
        Submission {
            id: self.id,
            owner_id: self.owner_id,
            course_title: self.course_title,
            course_description: self.course_description,
            slide_paths: OneOrMany::parse(Some(&self.slides_storage_path)),
            sample_paths: OneOrMany::parse(self.sample_storage_path.as_deref()),
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct ExamGenerationRecord {
    id: Uuid,
    submission_id: Uuid,
    owner_id: Uuid,
    status: String,
    model: Option<String>,
    prompt: Option<String>,
    output_markdown: Option<String>,
    pdf_storage_path: Option<String>,
    metadata: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
}
impl ExamGenerationRecord {
    fn to_domain(self) -> ExamGeneration {
        ExamGeneration {
            id: self.id,
            submission_id: self.submission_id,
            owner_id: self.owner_id,
            status: self.status,
            model: self.model,
            prompt: self.prompt,
            output_markdown: self.output_markdown,
            pdf_storage_path: self.pdf_storage_path,
            metadata: self.metadata,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct DownloadEventRecord {
    id: i64,
    generation_id: Uuid,
    user_id: Uuid,
    cost_cents: i32,
    created_at: DateTime<Utc>,
}
impl DownloadEventRecord {
    fn to_domain(self) -> DownloadEvent {
        DownloadEvent {
            id: self.id,
            generation_id: self.generation_id,
            user_id: self.user_id,
            cost_cents: self.cost_cents,
            created_at: self.created_at,
        }
    }
}

const SUBMISSION_COLUMNS: &str = "id, owner_id, course_title, course_description, \
     slides_storage_path, sample_storage_path, created_at";

const EXAM_COLUMNS: &str = "id, submission_id, owner_id, status, model, prompt, \
     output_markdown, pdf_storage_path, metadata, created_at";

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn get_or_create_profile(&self, user_id: Uuid) -> PortResult<Profile> {
        sqlx::query(
            "INSERT INTO profiles (id, free_downloads_remaining) VALUES ($1, $2) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(user_id)
        .bind(FREE_DOWNLOAD_GRANT)
        .execute(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let record = sqlx::query_as::<_, ProfileRecord>(
            "SELECT id, free_downloads_remaining FROM profiles WHERE id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_or_unexpected(e, format!("Profile {} not found", user_id)))?;

        Ok(record.to_domain())
    }

    async fn try_consume_free_download(&self, user_id: Uuid) -> PortResult<bool> {
        // Conditional decrement: racing requests can never both take the last credit.
        let consumed = sqlx::query_scalar::<_, i32>(
            "UPDATE profiles \
             SET free_downloads_remaining = free_downloads_remaining - 1, updated_at = now() \
             WHERE id = $1 AND free_downloads_remaining > 0 \
             RETURNING free_downloads_remaining",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        Ok(consumed.is_some())
    }

    async fn create_submission(&self, submission: NewSubmission) -> PortResult<Submission> {
        let slides_column = submission.slide_paths.to_column().ok_or_else(|| {
            PortError::BadRequest("At least one slides file is required.".to_string())
        })?;

        let record = sqlx::query_as::<_, SubmissionRecord>(&format!(
            "INSERT INTO course_submissions \
             (id, owner_id, course_title, course_description, slides_storage_path, sample_storage_path) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {SUBMISSION_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(submission.owner_id)
        .bind(&submission.course_title)
        .bind(&submission.course_description)
        .bind(slides_column)
        .bind(submission.sample_paths.to_column())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        Ok(record.to_domain())
    }

    async fn get_submission_by_id(&self, submission_id: Uuid) -> PortResult<Submission> {
        let record = sqlx::query_as::<_, SubmissionRecord>(&format!(
            "SELECT {SUBMISSION_COLUMNS} FROM course_submissions WHERE id = $1"
        ))
        .bind(submission_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            not_found_or_unexpected(e, format!("Submission {} not found", submission_id))
        })?;
        Ok(record.to_domain())
    }

    async fn create_exam_generation(
        &self,
        generation: NewExamGeneration,
    ) -> PortResult<ExamGeneration> {
        let metadata = serde_json::to_value(&generation.metadata)
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let record = sqlx::query_as::<_, ExamGenerationRecord>(&format!(
            "INSERT INTO exam_generations \
             (id, submission_id, owner_id, status, model, prompt, output_markdown, pdf_storage_path, metadata) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING {EXAM_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(generation.submission_id)
        .bind(generation.owner_id)
        .bind(STATUS_COMPLETED)
        .bind(&generation.model)
        .bind(&generation.prompt)
        .bind(&generation.output_markdown)
        .bind(&generation.pdf_storage_path)
        .bind(metadata)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        Ok(record.to_domain())
    }

    async fn get_exam_generation_by_id(&self, exam_id: Uuid) -> PortResult<ExamGeneration> {
        let record = sqlx::query_as::<_, ExamGenerationRecord>(&format!(
            "SELECT {EXAM_COLUMNS} FROM exam_generations WHERE id = $1"
        ))
        .bind(exam_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_or_unexpected(e, format!("Exam {} not found", exam_id)))?;
        Ok(record.to_domain())
    }

    async fn record_download(
        &self,
        generation_id: Uuid,
        user_id: Uuid,
        cost_cents: i32,
    ) -> PortResult<DownloadEvent> {
        let record = sqlx::query_as::<_, DownloadEventRecord>(
            "INSERT INTO download_events (generation_id, user_id, cost_cents) VALUES ($1, $2, $3) \
             RETURNING id, generation_id, user_id, cost_cents, created_at",
        )
        .bind(generation_id)
        .bind(user_id)
        .bind(cost_cents)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(record.to_domain())
    }
}
