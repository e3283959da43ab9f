//! services/api/src/adapters/storage.rs
//!
//! Object-store adapter backed by the Supabase Storage REST API.
//! Implements the `ObjectStore` port using `reqwest` and the service-role key.

use async_trait::async_trait;
use bytes::Bytes;
use mock_exam_core::domain::StoredObject;
use mock_exam_core::ports::{ObjectStore, PortError, PortResult};
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Mutex;
use tracing::{debug, info};

/// Per-file upload limit, mirrored on the bucket itself.
pub const MAX_OBJECT_BYTES: u64 = 40 * 1024 * 1024;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A Supabase Storage client bound to one bucket.
pub struct SupabaseStorage {
    http: Client,
    base_url: String,
    service_key: String,
    bucket: String,
    /// Buckets already created or verified by this process.
    ensured: Mutex<HashSet<String>>,
}

#[derive(Deserialize)]
struct SignedUrlResponse {
    #[serde(rename = "signedURL")]
    signed_url: String,
}

#[derive(Deserialize)]
struct StorageErrorBody {
    message: Option<String>,
    error: Option<String>,
}

impl SupabaseStorage {
    pub fn new(http: Client, supabase_url: &str, service_key: String, bucket: String) -> Self {
        Self {
            http,
            base_url: format!("{}/storage/v1", supabase_url.trim_end_matches('/')),
            service_key,
            bucket,
            ensured: Mutex::new(HashSet::new()),
        }
    }

    fn object_url(&self, path: &str) -> String {
        format!("{}/object/{}/{}", self.base_url, self.bucket, path)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
    }

    fn is_ensured(&self) -> bool {
        self.ensured
            .lock()
            .map(|set| set.contains(&self.bucket))
            .unwrap_or(false)
    }

    fn mark_ensured(&self) {
        if let Ok(mut set) = self.ensured.lock() {
            set.insert(self.bucket.clone());
        }
    }
}

/// Pulls the most useful message out of a failed storage response.
async fn error_message(response: reqwest::Response) -> String {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    match serde_json::from_str::<StorageErrorBody>(&text) {
        Ok(body) => body
            .message
            .or(body.error)
            .unwrap_or_else(|| format!("HTTP {}", status)),
        Err(_) if !text.is_empty() => text,
        Err(_) => format!("HTTP {}", status),
    }
}

//=========================================================================================
// `ObjectStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl ObjectStore for SupabaseStorage {
    async fn ensure_bucket(&self) -> PortResult<()> {
        if self.is_ensured() {
            return Ok(());
        }

        let response = self
            .authorized(self.http.post(format!("{}/bucket", self.base_url)))
            .json(&json!({
                "id": self.bucket,
                "name": self.bucket,
                "public": false,
                "file_size_limit": MAX_OBJECT_BYTES,
            }))
            .send()
            .await
            .map_err(|e| PortError::Upstream(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let message = error_message(response).await;
            // Concurrent or repeated creation is fine.
            let exists = status == StatusCode::CONFLICT
                || message.contains("already exists");
            if !exists {
                return Err(PortError::Upstream(format!(
                    "Unable to create or verify storage bucket '{}': {}",
                    self.bucket, message
                )));
            }
        }

        info!("Storage bucket '{}' is ready.", self.bucket);
        self.mark_ensured();
        Ok(())
    }

    async fn download(&self, path: &str) -> PortResult<StoredObject> {
        let response = self
            .authorized(self.http.get(self.object_url(path)))
            .send()
            .await
            .map_err(|e| PortError::Upstream(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(PortError::NotFound(format!("Object {} not found", path)));
        }
        if !response.status().is_success() {
            return Err(PortError::Upstream(error_message(response).await));
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        let bytes = response
            .bytes()
            .await
            .map_err(|e| PortError::Upstream(e.to_string()))?;

        debug!("Downloaded {} ({} bytes)", path, bytes.len());
        Ok(StoredObject {
            bytes,
            content_type,
        })
    }

    async fn upload(&self, path: &str, bytes: Bytes, content_type: &str) -> PortResult<()> {
        let response = self
            .authorized(self.http.post(self.object_url(path)))
            .header(header::CONTENT_TYPE, content_type)
            .header("x-upsert", "false")
            .body(bytes)
            .send()
            .await
            .map_err(|e| PortError::Upstream(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PortError::Upstream(error_message(response).await));
        }
        debug!("Uploaded {}", path);
        Ok(())
    }

    async fn create_signed_url(&self, path: &str, expires_in_secs: u64) -> PortResult<String> {
        let response = self
            .authorized(
                self.http
                    .post(format!("{}/object/sign/{}/{}", self.base_url, self.bucket, path)),
            )
            .json(&json!({ "expiresIn": expires_in_secs }))
            .send()
            .await
            .map_err(|e| PortError::Upstream(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PortError::Upstream(error_message(response).await));
        }

        let signed: SignedUrlResponse = response
            .json()
            .await
            .map_err(|e| PortError::Upstream(e.to_string()))?;

        Ok(absolute_signed_url(&self.base_url, &signed.signed_url))
    }
}

/// Storage returns the signed path relative to `/storage/v1`.
fn absolute_signed_url(base_url: &str, signed: &str) -> String {
    if signed.starts_with("http://") || signed.starts_with("https://") {
        signed.to_string()
    } else {
        format!("{}/{}", base_url, signed.trim_start_matches('/'))
    }
}
