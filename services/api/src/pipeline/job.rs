//! services/api/src/pipeline/job.rs
//!
//! One exam generation job: validation, material fetching, generation,
//! rendering and persistence, reported stage by stage through an `EventSink`.

use crate::pipeline::composer::{build_prompt, compose_exam, ExamBrief};
use crate::pipeline::events::EventSink;
use crate::pipeline::gateway::ProviderRegistry;
use crate::pipeline::materials::{fetch_materials, fetch_optional_materials};
use bytes::Bytes;
use mock_exam_core::domain::{
    Attachment, ExamGeneration, ExamMetadata, GenerationRequest, NewExamGeneration, Submission,
};
use mock_exam_core::ports::{DatabaseService, DocumentRenderer, ObjectStore, PortError, PortResult};
use std::fmt;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Where a job is. Each stage runs at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStage {
    Validating,
    FetchingMaterials,
    Generating,
    Rendering,
    Persisting,
    Done,
    Failed,
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JobStage::Validating => "validating",
            JobStage::FetchingMaterials => "fetching materials",
            JobStage::Generating => "generating",
            JobStage::Rendering => "rendering",
            JobStage::Persisting => "persisting",
            JobStage::Done => "done",
            JobStage::Failed => "failed",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error(transparent)]
    Port(#[from] PortError),
    #[error("Failed to upload the exam PDF: {0}")]
    Upload(PortError),
    #[error("Failed to save the generation record: {0}")]
    Persistence(PortError),
}

/// A job error tagged with the stage it happened in.
#[derive(Debug)]
pub struct JobFailure {
    pub stage: JobStage,
    pub error: JobError,
}

impl JobFailure {
    fn at(stage: JobStage) -> impl FnOnce(PortError) -> JobFailure {
        move |error| JobFailure {
            stage,
            error: JobError::Port(error),
        }
    }
}

/// The collaborators a job needs. Cheap to clone.
#[derive(Clone)]
pub struct JobContext {
    pub db: Arc<dyn DatabaseService>,
    pub store: Arc<dyn ObjectStore>,
    pub providers: Arc<ProviderRegistry>,
    pub renderer: Arc<dyn DocumentRenderer>,
}

/// A request that passed validation and may start streaming.
#[derive(Debug)]
pub struct ValidatedJob {
    pub user_id: Uuid,
    pub submission: Submission,
    pub request: GenerationRequest,
}

/// Loads the submission and checks that `user_id` owns it.
pub async fn validate(
    ctx: &JobContext,
    user_id: Uuid,
    request: GenerationRequest,
) -> PortResult<ValidatedJob> {
    let submission = ctx.db.get_submission_by_id(request.submission_id).await?;
    if submission.owner_id != user_id {
        return Err(PortError::Forbidden(
            "You do not have access to these course materials.".to_string(),
        ));
    }
    Ok(ValidatedJob {
        user_id,
        submission,
        request,
    })
}

/// Object key for a rendered exam.
pub fn exam_pdf_key(user_id: Uuid) -> String {
    format!("{}/exams/{}.pdf", user_id, Uuid::new_v4())
}

impl ValidatedJob {
    /// Runs the remaining stages. Nothing is rolled back on failure.
    #[instrument(skip_all, fields(submission_id = %self.submission.id, user_id = %self.user_id))]
    pub async fn run(
        self,
        ctx: &JobContext,
        sink: &EventSink,
    ) -> Result<ExamGeneration, JobFailure> {
        let ValidatedJob {
            user_id,
            submission,
            request,
        } = self;

        // --- Fetching materials ---
        let (slides, samples) = tokio::join!(
            fetch_materials(ctx.store.as_ref(), &submission.slide_paths),
            fetch_optional_materials(ctx.store.as_ref(), &submission.sample_paths),
        );
        let slides = slides.map_err(JobFailure::at(JobStage::FetchingMaterials))?;
        let (slide_count, sample_count) = (slides.len(), samples.len());
        let attachments = Attachment::from_materials(slides, samples);
        sink.status(format!(
            "Course materials loaded ({} slide file(s), {} sample exam(s))",
            slide_count, sample_count
        ))
        .await;

        // --- Generating ---
        let provider = request.provider;
        let model = ctx
            .providers
            .resolve_model(provider, request.model.as_deref());
        let writer = ctx
            .providers
            .writer(provider)
            .map_err(JobFailure::at(JobStage::Generating))?;
        info!("Generating exam with {} ({})", provider, model);
        sink.status(format!("Generating the exam with {} ({})", provider, model))
            .await;

        let brief = ExamBrief {
            course_title: &submission.course_title,
            course_description: submission.course_description.as_deref(),
            question_count: request.question_count,
            difficulty: request.difficulty,
            extra_instructions: request.extra_instructions.as_deref(),
        };
        let prompt = build_prompt(&brief, model.clone());
        let markdown = compose_exam(writer.as_ref(), &attachments, &prompt, sink)
            .await
            .map_err(JobFailure::at(JobStage::Generating))?;
        drop(attachments);
        sink.status("Exam text generated; rendering the PDF").await;

        // --- Rendering ---
        let pdf = ctx
            .renderer
            .render(&markdown)
            .await
            .map_err(JobFailure::at(JobStage::Rendering))?;
        sink.status("PDF rendered; saving the exam").await;

        // --- Persisting ---
        let pdf_path = exam_pdf_key(user_id);
        ctx.store
            .upload(&pdf_path, Bytes::from(pdf), PDF_CONTENT_TYPE)
            .await
            .map_err(|e| JobFailure {
                stage: JobStage::Persisting,
                error: JobError::Upload(e),
            })?;

        let generation = ctx
            .db
            .create_exam_generation(NewExamGeneration {
                submission_id: submission.id,
                owner_id: user_id,
                model: model.clone(),
                prompt: request.extra_instructions.clone(),
                output_markdown: markdown,
                pdf_storage_path: pdf_path,
                metadata: ExamMetadata {
                    question_count: request.question_count.get(),
                    difficulty: request.difficulty,
                    provider,
                    model,
                    slide_count,
                    sample_count,
                },
            })
            .await
            .map_err(|e| JobFailure {
                stage: JobStage::Persisting,
                error: JobError::Persistence(e),
            })?;
        sink.status("Exam saved").await;

        info!("Exam {} generated", generation.id);
        Ok(generation)
    }
}

/// Runs a validated job to completion and closes the stream with its outcome.
pub async fn drive(job: ValidatedJob, ctx: JobContext, sink: EventSink) {
    let outcome = job.run(&ctx, &sink).await.map(|generation| generation.id);
    sink.finish(outcome).await;
}
