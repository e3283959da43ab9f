use crate::pipeline::composer::FragmentSink;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::stream;
use lopdf::{dictionary, Document, Object};
use mock_exam_core::domain::{
    Attachment, DownloadEvent, ExamGeneration, NewExamGeneration, NewSubmission, Profile,
    StoredMaterialFile, StoredObject, Submission, FREE_DOWNLOAD_GRANT, STATUS_COMPLETED,
};
use mock_exam_core::ports::{
    Composition, DatabaseService, DocumentRenderer, ExamPrompt, ExamWriter, IdentityProvider,
    ObjectStore, PortError, PortResult,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

//=========================================================================================
// Database
//=========================================================================================

#[derive(Default)]
pub struct FakeDb {
    profiles: Mutex<HashMap<Uuid, i32>>,
    submissions: Mutex<HashMap<Uuid, Submission>>,
    exams: Mutex<HashMap<Uuid, ExamGeneration>>,
    downloads: Mutex<Vec<DownloadEvent>>,
    fail_exam_inserts: AtomicBool,
}

impl FakeDb {
    pub fn set_credits(&self, user_id: Uuid, credits: i32) {
        self.profiles.lock().unwrap().insert(user_id, credits);
    }

    pub fn credits(&self, user_id: Uuid) -> Option<i32> {
        self.profiles.lock().unwrap().get(&user_id).copied()
    }

    pub fn fail_exam_inserts(&self) {
        self.fail_exam_inserts.store(true, Ordering::SeqCst);
    }

    pub fn exam_count(&self) -> usize {
        self.exams.lock().unwrap().len()
    }

    pub fn download_costs(&self) -> Vec<i32> {
        self.downloads.lock().unwrap().iter().map(|d| d.cost_cents).collect()
    }

    /// Inserts a finished exam directly, bypassing the job.
    pub fn seed_exam(&self, owner_id: Uuid, pdf_path: Option<&str>) -> Uuid {
        let id = Uuid::new_v4();
        self.exams.lock().unwrap().insert(
            id,
            ExamGeneration {
                id,
                submission_id: Uuid::new_v4(),
                owner_id,
                status: STATUS_COMPLETED.to_string(),
                model: Some("qwen-plus".into()),
                prompt: None,
                output_markdown: Some("# Exam".into()),
                pdf_storage_path: pdf_path.map(str::to_string),
                metadata: None,
                created_at: Utc::now(),
            },
        );
        id
    }
}

#[async_trait]
impl DatabaseService for FakeDb {
    async fn get_or_create_profile(&self, user_id: Uuid) -> PortResult<Profile> {
        // Give concurrent callers a chance to interleave.
        tokio::task::yield_now().await;
        let mut profiles = self.profiles.lock().unwrap();
        let credits = *profiles.entry(user_id).or_insert(FREE_DOWNLOAD_GRANT);
        Ok(Profile {
            id: user_id,
            free_downloads_remaining: credits,
        })
    }

    async fn try_consume_free_download(&self, user_id: Uuid) -> PortResult<bool> {
        tokio::task::yield_now().await;
        let mut profiles = self.profiles.lock().unwrap();
        match profiles.get_mut(&user_id) {
            Some(credits) if *credits > 0 => {
                *credits -= 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn create_submission(&self, submission: NewSubmission) -> PortResult<Submission> {
        if submission.slide_paths.is_empty() {
            return Err(PortError::BadRequest(
                "At least one slides file is required.".to_string(),
            ));
        }
        let record = Submission {
            id: Uuid::new_v4(),
            owner_id: submission.owner_id,
            course_title: submission.course_title,
            course_description: submission.course_description,
            slide_paths: submission.slide_paths,
            sample_paths: submission.sample_paths,
            created_at: Utc::now(),
        };
        self.submissions
            .lock()
            .unwrap()
            .insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_submission_by_id(&self, submission_id: Uuid) -> PortResult<Submission> {
        self.submissions
            .lock()
            .unwrap()
            .get(&submission_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Submission {}", submission_id)))
    }

    async fn create_exam_generation(
        &self,
        generation: NewExamGeneration,
    ) -> PortResult<ExamGeneration> {
        if self.fail_exam_inserts.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("insert rejected".to_string()));
        }
        let metadata = serde_json::to_value(&generation.metadata)
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        let record = ExamGeneration {
            id: Uuid::new_v4(),
            submission_id: generation.submission_id,
            owner_id: generation.owner_id,
            status: STATUS_COMPLETED.to_string(),
            model: Some(generation.model),
            prompt: generation.prompt,
            output_markdown: Some(generation.output_markdown),
            pdf_storage_path: Some(generation.pdf_storage_path),
            metadata: Some(metadata),
            created_at: Utc::now(),
        };
        self.exams.lock().unwrap().insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_exam_generation_by_id(&self, exam_id: Uuid) -> PortResult<ExamGeneration> {
        self.exams
            .lock()
            .unwrap()
            .get(&exam_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Exam {}", exam_id)))
    }

    async fn record_download(
        &self,
        generation_id: Uuid,
        user_id: Uuid,
        cost_cents: i32,
    ) -> PortResult<DownloadEvent> {
        let mut downloads = self.downloads.lock().unwrap();
        let event = DownloadEvent {
            id: downloads.len() as i64 + 1,
            generation_id,
            user_id,
            cost_cents,
            created_at: Utc::now(),
        };
        downloads.push(event.clone());
        Ok(event)
    }
}

//=========================================================================================
// Object Storage
//=========================================================================================

#[derive(Default)]
pub struct FakeObjectStore {
    objects: Mutex<HashMap<String, StoredObject>>,
    upload_log: Mutex<Vec<String>>,
    signed: Mutex<Vec<u64>>,
    ensure_calls: AtomicUsize,
    fail_uploads: AtomicBool,
}

impl FakeObjectStore {
    pub fn put(&self, path: &str, bytes: &[u8], content_type: Option<&str>) {
        self.objects.lock().unwrap().insert(
            path.to_string(),
            StoredObject {
                bytes: Bytes::copy_from_slice(bytes),
                content_type: content_type.map(str::to_string),
            },
        );
    }

    pub fn contains(&self, path: &str) -> bool {
        self.objects.lock().unwrap().contains_key(path)
    }

    pub fn fail_uploads(&self) {
        self.fail_uploads.store(true, Ordering::SeqCst);
    }

    /// Paths passed to `upload`, in call order.
    pub fn upload_log(&self) -> Vec<String> {
        self.upload_log.lock().unwrap().clone()
    }

    pub fn uploads_under(&self, prefix: &str) -> usize {
        self.upload_log
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.starts_with(prefix))
            .count()
    }

    pub fn ensure_calls(&self) -> usize {
        self.ensure_calls.load(Ordering::SeqCst)
    }

    pub fn signed_ttls(&self) -> Vec<u64> {
        self.signed.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    async fn ensure_bucket(&self) -> PortResult<()> {
        self.ensure_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn download(&self, path: &str) -> PortResult<StoredObject> {
        self.objects
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Object {}", path)))
    }

    async fn upload(&self, path: &str, bytes: Bytes, content_type: &str) -> PortResult<()> {
        self.upload_log.lock().unwrap().push(path.to_string());
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(PortError::Upstream("storage unavailable".to_string()));
        }
        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(path) {
            return Err(PortError::BadRequest(format!("{} already exists", path)));
        }
        objects.insert(
            path.to_string(),
            StoredObject {
                bytes,
                content_type: Some(content_type.to_string()),
            },
        );
        Ok(())
    }

    async fn create_signed_url(&self, path: &str, expires_in_secs: u64) -> PortResult<String> {
        if !self.contains(path) {
            return Err(PortError::NotFound(format!("Object {}", path)));
        }
        self.signed.lock().unwrap().push(expires_in_secs);
        Ok(format!(
            "https://storage.test/object/sign/bucket/{}?token=t",
            path
        ))
    }
}

//=========================================================================================
// Identity
//=========================================================================================

#[derive(Default)]
pub struct FakeIdentity {
    tokens: Mutex<HashMap<String, Uuid>>,
}

impl FakeIdentity {
    pub fn issue(&self, token: &str) -> Uuid {
        let user_id = Uuid::new_v4();
        self.tokens
            .lock()
            .unwrap()
            .insert(token.to_string(), user_id);
        user_id
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn verify_access_token(&self, token: &str) -> PortResult<Uuid> {
        self.tokens
            .lock()
            .unwrap()
            .get(token)
            .copied()
            .ok_or(PortError::Unauthorized)
    }
}

//=========================================================================================
// Exam Writing and Rendering
//=========================================================================================

enum Script {
    Complete(String),
    Streaming {
        fragments: Vec<String>,
        error: Option<String>,
    },
}

/// An `ExamWriter` that replays a fixed answer.
pub struct ScriptedWriter {
    script: Script,
    calls: AtomicUsize,
    seen_attachments: AtomicUsize,
}

impl ScriptedWriter {
    fn with(script: Script) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
            seen_attachments: AtomicUsize::new(0),
        }
    }

    pub fn complete(text: &str) -> Self {
        Self::with(Script::Complete(text.to_string()))
    }

    pub fn streaming(fragments: &[&str]) -> Self {
        Self::with(Script::Streaming {
            fragments: fragments.iter().map(|f| f.to_string()).collect(),
            error: None,
        })
    }

    /// Streams `fragments`, then fails with an upstream error.
    pub fn failing_stream(fragments: &[&str], message: &str) -> Self {
        Self::with(Script::Streaming {
            fragments: fragments.iter().map(|f| f.to_string()).collect(),
            error: Some(message.to_string()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Attachment count of the most recent call.
    pub fn seen_attachment_count(&self) -> usize {
        self.seen_attachments.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExamWriter for ScriptedWriter {
    async fn compose(
        &self,
        attachments: &[Attachment],
        _prompt: &ExamPrompt,
    ) -> PortResult<Composition> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_attachments
            .store(attachments.len(), Ordering::SeqCst);

        Ok(match &self.script {
            Script::Complete(text) => Composition::Complete(text.clone()),
            Script::Streaming { fragments, error } => {
                let items: Vec<PortResult<String>> = fragments
                    .iter()
                    .cloned()
                    .map(Ok)
                    .chain(error.iter().map(|m| Err(PortError::Upstream(m.clone()))))
                    .collect();
                Composition::Streaming(Box::pin(stream::iter(items)))
            }
        })
    }
}

#[derive(Default)]
pub struct CollectingSink {
    fragments: Mutex<Vec<String>>,
}

impl CollectingSink {
    pub fn fragments(&self) -> Vec<String> {
        self.fragments.lock().unwrap().clone()
    }
}

#[async_trait]
impl FragmentSink for CollectingSink {
    async fn fragment(&self, text: &str) {
        self.fragments.lock().unwrap().push(text.to_string());
    }
}

/// Renders every document as a one-page PDF.
#[derive(Default)]
pub struct FakeRenderer;

#[async_trait]
impl DocumentRenderer for FakeRenderer {
    async fn render(&self, markdown: &str) -> PortResult<Vec<u8>> {
        if markdown.trim().is_empty() {
            return Err(PortError::Render("nothing to render".to_string()));
        }
        Ok(pdf_with_pages(1))
    }
}

//=========================================================================================
// Fixtures
//=========================================================================================

pub fn sample_attachments(slides: usize, samples: usize) -> Vec<Attachment> {
    let file = |name: String| StoredMaterialFile {
        bytes: Bytes::from_static(b"%PDF-1.7"),
        mime_type: Some("application/pdf".into()),
        storage_path: format!("u/materials/{}", name),
        file_name: name,
    };
    Attachment::from_materials(
        (1..=slides).map(|i| file(format!("slides-{}.pdf", i))).collect(),
        (1..=samples).map(|i| file(format!("sample-{}.pdf", i))).collect(),
    )
}

/// A minimal valid PDF with `count` blank A4 pages.
pub fn pdf_with_pages(count: usize) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let kids: Vec<Object> = (0..count)
        .map(|_| {
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(595),
                    Object::Integer(842),
                ],
            });
            Object::Reference(page_id)
        })
        .collect();

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}
