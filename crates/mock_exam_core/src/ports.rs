//! crates/mock_exam_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or APIs.

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use uuid::Uuid;

use crate::domain::{
    Attachment, DownloadEvent, ExamGeneration, NewExamGeneration, NewSubmission, Profile,
    StoredObject, Submission,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    /// Missing credentials or an unusable provider selection. Never retried.
    #[error("{0}")]
    Configuration(String),
    #[error("Failed to fetch material {path}: {message}")]
    MaterialFetch { path: String, message: String },
    #[error("No attachments were available for analysis; please upload the course materials again.")]
    NoAttachments,
    #[error("Failed to upload attachment {file_name}: {message}")]
    AttachmentUpload { file_name: String, message: String },
    #[error("The model returned no exam content: {0}")]
    EmptyGeneration(String),
    #[error("Failed to render PDF: {0}")]
    Render(String),
    #[error("Upstream service error: {0}")]
    Upstream(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// Incremental text produced by a streaming backend.
pub type FragmentStream = Pin<Box<dyn Stream<Item = PortResult<String>> + Send>>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- Profiles / Entitlement ---
    /// Returns the profile, creating it with the free grant on first sight.
    async fn get_or_create_profile(&self, user_id: Uuid) -> PortResult<Profile>;

    /// Decrements the free-download counter iff it is positive, atomically.
    /// Returns whether a credit was actually consumed.
    async fn try_consume_free_download(&self, user_id: Uuid) -> PortResult<bool>;

    // --- Submissions ---
    async fn create_submission(&self, submission: NewSubmission) -> PortResult<Submission>;

    async fn get_submission_by_id(&self, submission_id: Uuid) -> PortResult<Submission>;

    // --- Exam Generations ---
    async fn create_exam_generation(
        &self,
        generation: NewExamGeneration,
    ) -> PortResult<ExamGeneration>;

    async fn get_exam_generation_by_id(&self, exam_id: Uuid) -> PortResult<ExamGeneration>;

    // --- Download Audit ---
    async fn record_download(
        &self,
        generation_id: Uuid,
        user_id: Uuid,
        cost_cents: i32,
    ) -> PortResult<DownloadEvent>;
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Makes sure the bucket exists. Idempotent and cheap after the first call.
    async fn ensure_bucket(&self) -> PortResult<()>;

    async fn download(&self, path: &str) -> PortResult<StoredObject>;

    /// Uploads without overwriting an existing object.
    async fn upload(&self, path: &str, bytes: Bytes, content_type: &str) -> PortResult<()>;

    /// Issues a credential-free link valid for `expires_in_secs`.
    async fn create_signed_url(&self, path: &str, expires_in_secs: u64) -> PortResult<String>;
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolves a bearer access token to the user it was issued for.
    async fn verify_access_token(&self, token: &str) -> PortResult<Uuid>;
}

/// Everything a backend needs to author one exam, independent of its protocol.
#[derive(Debug, Clone)]
pub struct ExamPrompt {
    pub model: String,
    pub system_instructions: String,
    pub instructions: String,
}

/// What a backend hands back: either the whole text at once or a stream of fragments.
pub enum Composition {
    Complete(String),
    Streaming(FragmentStream),
}

#[async_trait]
pub trait ExamWriter: Send + Sync {
    /// Ships the attachments to the backend and starts exam generation.
    async fn compose(
        &self,
        attachments: &[Attachment],
        prompt: &ExamPrompt,
    ) -> PortResult<Composition>;
}

#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    /// Converts Markdown into a paginated PDF.
    async fn render(&self, markdown: &str) -> PortResult<Vec<u8>>;
}
