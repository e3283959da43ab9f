//! services/api/src/web/protocol.rs
//!
//! Request and response bodies of the HTTP API. Field names are camelCase on
//! the wire.

use crate::pipeline::downloads::DownloadOutcome;
use crate::pipeline::ProviderRegistry;
use chrono::{DateTime, Utc};
use mock_exam_core::domain::{Difficulty, ExamGeneration, GenerationRequest, QuestionCount, Submission};
use mock_exam_core::ports::{PortError, PortResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

//=========================================================================================
// Requests
//=========================================================================================

/// Body of `POST /exams`. Everything but `submissionId` is optional.
#[derive(Deserialize, Debug, Default, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateExamPayload {
    pub submission_id: Option<String>,
    /// Clamped into 5..=50; anything non-numeric means 20.
    #[schema(value_type = Option<f64>)]
    pub question_count: Option<Value>,
    /// `easy`, `medium` or `hard`; anything else means `medium`.
    pub difficulty: Option<String>,
    pub extra_instructions: Option<String>,
    /// `qwen`, `gemini` or `openai`. Defaults to the server's `AI_PROVIDER`.
    pub provider: Option<String>,
    pub model: Option<String>,
}

impl GenerateExamPayload {
    /// Normalizes the payload. Only a missing or malformed `submissionId` is an error.
    pub fn into_request(self, providers: &ProviderRegistry) -> PortResult<GenerationRequest> {
        let raw_id = self
            .submission_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| PortError::BadRequest("submissionId is required.".to_string()))?;
        let submission_id = Uuid::parse_str(raw_id)
            .map_err(|_| PortError::BadRequest(format!("Invalid submissionId: {}", raw_id)))?;

        Ok(GenerationRequest {
            submission_id,
            question_count: QuestionCount::from_json(self.question_count.as_ref()),
            difficulty: Difficulty::from_input(self.difficulty.as_deref()),
            extra_instructions: self.extra_instructions.filter(|s| !s.trim().is_empty()),
            provider: providers.resolve_provider(self.provider.as_deref()),
            model: self.model.filter(|m| !m.trim().is_empty()),
        })
    }
}

/// Parses a path id; a malformed id is a `BadRequest` with a JSON body.
pub fn parse_id(raw: &str) -> PortResult<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|_| PortError::BadRequest(format!("Invalid id: {}", raw)))
}

#[derive(Deserialize, Debug, Default, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct DownloadQuery {
    /// Set to `true` once the user agreed to pay for a download beyond the free grant.
    #[serde(default)]
    pub confirm_paid: Option<String>,
}

impl DownloadQuery {
    pub fn confirmed(&self) -> bool {
        self.confirm_paid.as_deref() == Some("true")
    }
}

//=========================================================================================
// Responses
//=========================================================================================

#[derive(Serialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionView {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub course_title: String,
    pub course_description: Option<String>,
    pub slides_storage_paths: Vec<String>,
    pub sample_storage_paths: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Submission> for SubmissionView {
    fn from(s: Submission) -> Self {
        Self {
            id: s.id,
            owner_id: s.owner_id,
            course_title: s.course_title,
            course_description: s.course_description,
            slides_storage_paths: s.slide_paths.paths().to_vec(),
            sample_storage_paths: s.sample_paths.paths().to_vec(),
            created_at: s.created_at,
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
pub struct SubmissionResponse {
    pub submission: SubmissionView,
}

#[derive(Serialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExamView {
    pub id: Uuid,
    pub submission_id: Uuid,
    pub owner_id: Uuid,
    pub status: String,
    pub model: Option<String>,
    pub prompt: Option<String>,
    pub output_markdown: Option<String>,
    pub pdf_storage_path: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl From<ExamGeneration> for ExamView {
    fn from(e: ExamGeneration) -> Self {
        Self {
            id: e.id,
            submission_id: e.submission_id,
            owner_id: e.owner_id,
            status: e.status,
            model: e.model,
            prompt: e.prompt,
            output_markdown: e.output_markdown,
            pdf_storage_path: e.pdf_storage_path,
            metadata: e.metadata,
            created_at: e.created_at,
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
pub struct ExamResponse {
    pub exam: ExamView,
}

#[derive(Serialize, Debug, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResponse {
    pub signed_url: String,
    pub cost_cents: i32,
    pub free_downloads_remaining: i32,
}

#[derive(Serialize, Debug, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequiredResponse {
    pub message: String,
    pub requires_payment: bool,
    pub free_downloads_remaining: i32,
}

/// Either body of the download endpoint.
pub enum DownloadReply {
    Issued(DownloadResponse),
    PaymentRequired(PaymentRequiredResponse),
}

impl From<DownloadOutcome> for DownloadReply {
    fn from(outcome: DownloadOutcome) -> Self {
        match outcome {
            DownloadOutcome::Issued {
                signed_url,
                cost_cents,
                free_downloads_remaining,
            } => DownloadReply::Issued(DownloadResponse {
                signed_url,
                cost_cents,
                free_downloads_remaining,
            }),
            DownloadOutcome::PaymentRequired {
                free_downloads_remaining,
            } => DownloadReply::PaymentRequired(PaymentRequiredResponse {
                message: "Your free downloads are used up. Each mock exam costs 1.00; \
                          pay and repeat the request with confirmPaid=true."
                    .to_string(),
                requires_payment: true,
                free_downloads_remaining,
            }),
        }
    }
}

/// The JSON body of every non-2xx response.
#[derive(Serialize, Debug, ToSchema)]
pub struct ErrorBody {
    pub message: String,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ProviderSettings;
    use mock_exam_core::domain::AiProvider;
    use serde_json::json;

    fn registry() -> ProviderRegistry {
        ProviderRegistry::new(ProviderSettings::default())
    }

    fn payload(value: Value) -> GenerateExamPayload {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn payload_is_normalized() {
        let id = Uuid::new_v4();
        let request = payload(json!({
            "submissionId": id.to_string(),
            "questionCount": 100,
            "difficulty": "insane",
            "extraInstructions": "  ",
            "provider": "Gemini",
        }))
        .into_request(&registry())
        .unwrap();

        assert_eq!(request.submission_id, id);
        assert_eq!(request.question_count.get(), 50);
        assert_eq!(request.difficulty, Difficulty::Medium);
        assert_eq!(request.extra_instructions, None);
        assert_eq!(request.provider, AiProvider::Gemini);
        assert_eq!(request.model, None);
    }

    #[test]
    fn defaults_apply_to_a_bare_payload() {
        let id = Uuid::new_v4();
        let request = payload(json!({ "submissionId": id.to_string(), "questionCount": null }))
            .into_request(&registry())
            .unwrap();
        assert_eq!(request.question_count.get(), 20);
        assert_eq!(request.provider, AiProvider::OpenAi);
    }

    #[test]
    fn submission_id_is_required_and_parsed() {
        assert!(matches!(
            payload(json!({})).into_request(&registry()),
            Err(PortError::BadRequest(_))
        ));
        assert!(matches!(
            payload(json!({ "submissionId": "  " })).into_request(&registry()),
            Err(PortError::BadRequest(_))
        ));
        assert!(matches!(
            payload(json!({ "submissionId": "not-a-uuid" })).into_request(&registry()),
            Err(PortError::BadRequest(_))
        ));
    }

    #[test]
    fn payment_required_body_shape() {
        let reply = DownloadReply::from(DownloadOutcome::PaymentRequired {
            free_downloads_remaining: 0,
        });
        let DownloadReply::PaymentRequired(body) = reply else {
            panic!("expected a payment-required reply");
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["requiresPayment"], true);
        assert_eq!(value["freeDownloadsRemaining"], 0);
        assert!(value["message"].as_str().unwrap().contains("confirmPaid=true"));
    }

    #[test]
    fn confirm_paid_must_be_literal_true() {
        let query = |v: Option<&str>| DownloadQuery {
            confirm_paid: v.map(str::to_string),
        };
        assert!(query(Some("true")).confirmed());
        assert!(!query(Some("1")).confirmed());
        assert!(!query(None).confirmed());
    }
}
