//! crates/mock_exam_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format,
//! apart from the small value types that travel over the wire as-is.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use crate::storage_path::OneOrMany;

/// Number of free downloads granted to every new profile.
pub const FREE_DOWNLOAD_GRANT: i32 = 3;

/// Price of one download once the free grant is exhausted.
pub const PAID_DOWNLOAD_COST_CENTS: i32 = 100;

//=========================================================================================
// Persisted Entities
//=========================================================================================

/// One upload of course materials by a user.
#[derive(Debug, Clone)]
pub struct Submission {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub course_title: String,
    pub course_description: Option<String>,
    pub slide_paths: OneOrMany,
    pub sample_paths: OneOrMany,
    pub created_at: DateTime<Utc>,
}

/// The fields needed to insert a new `Submission`.
#[derive(Debug, Clone)]
pub struct NewSubmission {
    pub owner_id: Uuid,
    pub course_title: String,
    pub course_description: Option<String>,
    pub slide_paths: OneOrMany,
    pub sample_paths: OneOrMany,
}

/// The durable output of one successful generation job.
#[derive(Debug, Clone)]
pub struct ExamGeneration {
    pub id: Uuid,
    pub submission_id: Uuid,
    pub owner_id: Uuid,
    pub status: String,
    pub model: Option<String>,
    pub prompt: Option<String>,
    pub output_markdown: Option<String>,
    pub pdf_storage_path: Option<String>,
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
}

/// The fields needed to insert a new `ExamGeneration`.
#[derive(Debug, Clone)]
pub struct NewExamGeneration {
    pub submission_id: Uuid,
    pub owner_id: Uuid,
    pub model: String,
    pub prompt: Option<String>,
    pub output_markdown: String,
    pub pdf_storage_path: String,
    pub metadata: ExamMetadata,
}

/// The only status a generation record is ever written with.
pub const STATUS_COMPLETED: &str = "completed";

/// The metadata bag stored alongside a generation record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamMetadata {
    pub question_count: u32,
    pub difficulty: Difficulty,
    pub provider: AiProvider,
    pub model: String,
    pub slide_count: usize,
    pub sample_count: usize,
}

/// An audit record of one issued download link.
#[derive(Debug, Clone)]
pub struct DownloadEvent {
    pub id: i64,
    pub generation_id: Uuid,
    pub user_id: Uuid,
    pub cost_cents: i32,
    pub created_at: DateTime<Utc>,
}

/// The slice of a user profile this service cares about.
#[derive(Debug, Clone)]
pub struct Profile {
    pub id: Uuid,
    pub free_downloads_remaining: i32,
}

//=========================================================================================
// Transient Values
//=========================================================================================

/// An in-memory view of one stored attachment, owned by the request that fetched it.
#[derive(Debug, Clone)]
pub struct StoredMaterialFile {
    pub bytes: Bytes,
    pub mime_type: Option<String>,
    pub file_name: String,
    pub storage_path: String,
}

impl StoredMaterialFile {
    /// The MIME type to declare to a backend that insists on one.
    pub fn mime_type_or_default(&self) -> &str {
        self.mime_type
            .as_deref()
            .unwrap_or("application/octet-stream")
    }
}

/// Raw bytes and content type as returned by the object store.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub bytes: Bytes,
    pub content_type: Option<String>,
}

/// Which role an attachment plays in the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Slides,
    SampleExam,
}

/// A fetched file labelled for the LLM backend.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub kind: AttachmentKind,
    /// One-based position within its kind.
    pub position: usize,
    pub file: StoredMaterialFile,
}

impl Attachment {
    pub fn label(&self) -> String {
        match self.kind {
            AttachmentKind::Slides => format!("Course slides ({})", self.position),
            AttachmentKind::SampleExam => format!("Sample exam ({})", self.position),
        }
    }

    /// Labels slides before samples, numbering each kind from one.
    pub fn from_materials(
        slides: Vec<StoredMaterialFile>,
        samples: Vec<StoredMaterialFile>,
    ) -> Vec<Attachment> {
        let slides = slides.into_iter().enumerate().map(|(i, file)| Attachment {
            kind: AttachmentKind::Slides,
            position: i + 1,
            file,
        });
        let samples = samples.into_iter().enumerate().map(|(i, file)| Attachment {
            kind: AttachmentKind::SampleExam,
            position: i + 1,
            file,
        });
        slides.chain(samples).collect()
    }
}

//=========================================================================================
// Generation Parameters
//=========================================================================================

/// Exam difficulty. Only the exact lowercase names are recognised; anything else is `Medium`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn from_input(raw: Option<&str>) -> Self {
        match raw {
            Some("easy") => Difficulty::Easy,
            Some("hard") => Difficulty::Hard,
            _ => Difficulty::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target number of questions, always within `[MIN, MAX]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct QuestionCount(u32);

impl QuestionCount {
    pub const MIN: u32 = 5;
    pub const MAX: u32 = 50;
    pub const DEFAULT: u32 = 20;

    pub fn clamped(value: i64) -> Self {
        Self(value.clamp(Self::MIN as i64, Self::MAX as i64) as u32)
    }

    /// Reads a loosely-typed JSON value: numbers and numeric strings are clamped,
    /// anything else (including absence) falls back to the default.
    pub fn from_json(raw: Option<&Value>) -> Self {
        let parsed = match raw {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        match parsed {
            Some(n) if n.is_finite() => Self::clamped(n.round() as i64),
            _ => Self(Self::DEFAULT),
        }
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl Default for QuestionCount {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

impl fmt::Display for QuestionCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The LLM backends the service knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiProvider {
    OpenAi,
    Qwen,
    Gemini,
}

impl AiProvider {
    /// Used when neither the request nor the environment names a provider.
    pub const FALLBACK: AiProvider = AiProvider::OpenAi;

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "openai" => Some(AiProvider::OpenAi),
            "qwen" => Some(AiProvider::Qwen),
            "gemini" => Some(AiProvider::Gemini),
            _ => None,
        }
    }

    /// Explicit request value, then the process default, then `FALLBACK`.
    pub fn resolve(requested: Option<&str>, process_default: Option<&str>) -> Self {
        requested
            .and_then(Self::parse)
            .or_else(|| process_default.and_then(Self::parse))
            .unwrap_or(Self::FALLBACK)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AiProvider::OpenAi => "openai",
            AiProvider::Qwen => "qwen",
            AiProvider::Gemini => "gemini",
        }
    }
}

impl fmt::Display for AiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The validated input to one generation job.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub submission_id: Uuid,
    pub question_count: QuestionCount,
    pub difficulty: Difficulty,
    pub extra_instructions: Option<String>,
    pub provider: AiProvider,
    pub model: Option<String>,
}
