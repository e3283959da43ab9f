//! services/api/src/pipeline/preview.rs
//!
//! First-page previews of rendered exams.

use crate::pipeline::downloads::{load_owned_exam, pdf_path};
use mock_exam_core::ports::{DatabaseService, ObjectStore, PortError, PortResult};
use tracing::debug;
use uuid::Uuid;

/// Returns a new PDF holding only the first page of `source`.
pub fn first_page_pdf(source: &[u8]) -> PortResult<Vec<u8>> {
    let mut document = lopdf::Document::load_mem(source)
        .map_err(|e| PortError::BadRequest(format!("The stored PDF could not be read: {}", e)))?;

    let page_numbers: Vec<u32> = document.get_pages().keys().copied().collect();
    let Some((_first, rest)) = page_numbers.split_first() else {
        return Err(PortError::BadRequest("The PDF has no pages.".to_string()));
    };

    if !rest.is_empty() {
        document.delete_pages(rest);
        document.prune_objects();
    }

    let mut output = Vec::new();
    document
        .save_to(&mut output)
        .map_err(|e| PortError::Unexpected(format!("Failed to write preview PDF: {}", e)))?;
    Ok(output)
}

/// Loads the caller's exam PDF and cuts it down to its first page.
pub async fn load_preview(
    db: &dyn DatabaseService,
    store: &dyn ObjectStore,
    user_id: Uuid,
    exam_id: Uuid,
) -> PortResult<Vec<u8>> {
    let exam = load_owned_exam(db, user_id, exam_id).await?;
    let path = pdf_path(&exam)?;

    let object = store
        .download(path)
        .await
        .map_err(|e| PortError::BadRequest(format!("Could not load the exam PDF: {}", e)))?;
    let preview = first_page_pdf(&object.bytes)?;
    debug!("Built preview of exam {} ({} bytes)", exam.id, preview.len());
    Ok(preview)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::fakes::{pdf_with_pages, FakeDb, FakeObjectStore};

    fn page_count(bytes: &[u8]) -> usize {
        lopdf::Document::load_mem(bytes).unwrap().get_pages().len()
    }

    #[test]
    fn keeps_only_the_first_page() {
        let source = pdf_with_pages(3);
        assert_eq!(page_count(&source), 3);

        let preview = first_page_pdf(&source).unwrap();
        assert_eq!(page_count(&preview), 1);
    }

    #[test]
    fn single_page_document_is_kept() {
        let preview = first_page_pdf(&pdf_with_pages(1)).unwrap();
        assert_eq!(page_count(&preview), 1);
    }

    #[test]
    fn empty_or_garbage_input_is_a_bad_request() {
        assert!(matches!(first_page_pdf(b""), Err(PortError::BadRequest(_))));
        assert!(matches!(
            first_page_pdf(b"not a pdf at all"),
            Err(PortError::BadRequest(_))
        ));
        assert!(matches!(
            first_page_pdf(&pdf_with_pages(0)),
            Err(PortError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn preview_is_built_from_the_stored_exam() {
        let db = FakeDb::default();
        let store = FakeObjectStore::default();
        let owner = Uuid::new_v4();
        store.put("o/exams/e.pdf", &pdf_with_pages(2), Some("application/pdf"));
        let exam_id = db.seed_exam(owner, Some("o/exams/e.pdf"));

        let preview = load_preview(&db, &store, owner, exam_id).await.unwrap();
        assert_eq!(page_count(&preview), 1);

        assert!(matches!(
            load_preview(&db, &store, Uuid::new_v4(), exam_id).await,
            Err(PortError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn missing_object_is_a_bad_request() {
        let db = FakeDb::default();
        let store = FakeObjectStore::default();
        let owner = Uuid::new_v4();
        let exam_id = db.seed_exam(owner, Some("o/exams/gone.pdf"));

        assert!(matches!(
            load_preview(&db, &store, owner, exam_id).await,
            Err(PortError::BadRequest(_))
        ));
    }
}
