//! services/api/src/pipeline/materials.rs
//!
//! Resolves stored course materials into in-memory attachments.

use futures::future::try_join_all;
use mock_exam_core::domain::StoredMaterialFile;
use mock_exam_core::ports::{ObjectStore, PortError, PortResult};
use mock_exam_core::OneOrMany;
use tracing::warn;

/// Display name for a stored object: its final path segment.
pub fn display_name(path: &str) -> String {
    match path.rsplit('/').next() {
        Some(segment) if !segment.is_empty() => segment.to_string(),
        _ => "source".to_string(),
    }
}

async fn fetch_one(store: &dyn ObjectStore, path: &str) -> PortResult<StoredMaterialFile> {
    let object = store
        .download(path)
        .await
        .map_err(|e| PortError::MaterialFetch {
            path: path.to_string(),
            message: e.to_string(),
        })?;

    Ok(StoredMaterialFile {
        bytes: object.bytes,
        mime_type: object.content_type,
        file_name: display_name(path),
        storage_path: path.to_string(),
    })
}

/// Fetches every path concurrently, keeping the stored order.
/// Fails on the first path that cannot be fetched; no paths means no files.
pub async fn fetch_materials(
    store: &dyn ObjectStore,
    paths: &OneOrMany,
) -> PortResult<Vec<StoredMaterialFile>> {
    try_join_all(paths.paths().iter().map(|path| fetch_one(store, path))).await
}

/// Like `fetch_materials`, but a failure means "no material" instead of an error.
pub async fn fetch_optional_materials(
    store: &dyn ObjectStore,
    paths: &OneOrMany,
) -> Vec<StoredMaterialFile> {
    match fetch_materials(store, paths).await {
        Ok(files) => files,
        Err(e) => {
            warn!("Ignoring optional material that could not be fetched: {}", e);
            Vec::new()
        }
    }
}
