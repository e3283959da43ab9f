//! services/api/src/adapters/gemini_llm.rs
//!
//! This module contains the adapter for the Gemini multimodal API.
//! It implements the `ExamWriter` port from the `core` crate.
//!
//! Protocol: each attachment goes through the resumable file-staging endpoint,
//! which returns a content URI. The generation call embeds those URIs next to the
//! text prompt and is streamed back as server-sent events.

use async_trait::async_trait;
use futures::StreamExt;
use mock_exam_core::domain::Attachment;
use mock_exam_core::ports::{Composition, ExamPrompt, ExamWriter, PortError, PortResult};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `ExamWriter` using the Gemini REST API.
#[derive(Clone)]
pub struct GeminiExamAdapter {
    http: Client,
    api_key: String,
    api_base: String,
}

/// A staged file reference usable inside a generation request.
#[derive(Debug, Clone)]
struct StagedFile {
    uri: String,
    mime_type: String,
}

#[derive(Deserialize)]
struct UploadResponse {
    file: UploadedFileInfo,
}

#[derive(Deserialize)]
struct UploadedFileInfo {
    uri: String,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    error: Option<StreamError>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<ContentPart>,
}

#[derive(Deserialize)]
struct ContentPart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct StreamError {
    message: String,
}

impl GeminiExamAdapter {
    /// Creates a new `GeminiExamAdapter`.
    pub fn new(http: Client, api_key: String) -> Self {
        Self {
            http,
            api_key,
            api_base: GEMINI_API_BASE.to_string(),
        }
    }

    /// Points the adapter at a different host, e.g. a regional endpoint or a proxy.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    async fn stage_attachment(&self, attachment: &Attachment) -> PortResult<StagedFile> {
        let file = &attachment.file;
        let mime_type = file.mime_type_or_default().to_string();
        let upload_error = |message: String| PortError::AttachmentUpload {
            file_name: file.file_name.clone(),
            message,
        };

        // 1. Open a resumable upload session.
        let start = self
            .http
            .post(format!("{}/upload/v1beta/files", self.api_base))
            .header("x-goog-api-key", &self.api_key)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", file.bytes.len().to_string())
            .header("X-Goog-Upload-Header-Content-Type", &mime_type)
            .json(&json!({ "file": { "display_name": file.file_name } }))
            .send()
            .await
            .map_err(|e| upload_error(e.to_string()))?;

        if !start.status().is_success() {
            let status = start.status();
            let body = start.text().await.unwrap_or_default();
            return Err(upload_error(format!("HTTP {}: {}", status, body)));
        }

        let session_url = start
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string())
            .ok_or_else(|| upload_error("upload session URL missing".to_string()))?;

        // 2. Send the bytes and finalize in one request.
        let finished = self
            .http
            .post(session_url)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(file.bytes.clone())
            .send()
            .await
            .map_err(|e| upload_error(e.to_string()))?;

        if !finished.status().is_success() {
            let status = finished.status();
            let body = finished.text().await.unwrap_or_default();
            return Err(upload_error(format!("HTTP {}: {}", status, body)));
        }

        let uploaded: UploadResponse = finished
            .json()
            .await
            .map_err(|e| upload_error(e.to_string()))?;

        debug!("Staged {} at {}", file.file_name, uploaded.file.uri);
        Ok(StagedFile {
            uri: uploaded.file.uri,
            mime_type,
        })
    }
}

/// Builds the single multimodal request: the text prompt followed by one part per file.
fn build_request_body(prompt_text: &str, staged: &[StagedFile]) -> Value {
    let mut parts = vec![json!({ "text": prompt_text })];
    parts.extend(staged.iter().map(|file| {
        json!({ "fileData": { "mimeType": file.mime_type, "fileUri": file.uri } })
    }));
    json!({ "contents": [ { "role": "user", "parts": parts } ] })
}

fn attachment_summary(attachments: &[Attachment]) -> String {
    attachments
        .iter()
        .enumerate()
        .map(|(i, a)| format!("Attachment {} ({}) is uploaded with this message for reference.", i + 1, a.label()))
        .collect::<Vec<_>>()
        .join("\n")
}

//=========================================================================================
// Server-Sent Events Decoding
//=========================================================================================

/// Splits a byte stream into complete `data:` payloads.
///
/// Bytes are buffered until a newline arrives, so a UTF-8 sequence split across
/// network chunks is decoded only once it is whole.
#[derive(Default)]
struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Feeds raw bytes and returns every payload completed by them.
    fn push(&mut self, chunk: &[u8]) -> PortResult<Vec<String>> {
        self.buffer.extend_from_slice(chunk);
        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(payload) = data_payload(decode_line(&line)?) {
                payloads.push(payload);
            }
        }
        Ok(payloads)
    }

    /// Flushes a trailing line that was not newline-terminated.
    fn finish(&mut self) -> PortResult<Option<String>> {
        let rest = std::mem::take(&mut self.buffer);
        Ok(data_payload(decode_line(&rest)?))
    }
}

fn decode_line(line: &[u8]) -> PortResult<&str> {
    std::str::from_utf8(line)
        .map_err(|e| PortError::Upstream(format!("Gemini stream is not valid UTF-8: {}", e)))
}

fn data_payload(line: &str) -> Option<String> {
    let line = line.trim_end_matches(['\r', '\n']);
    let payload = line.strip_prefix("data:")?.trim_start();
    if payload.is_empty() {
        None
    } else {
        Some(payload.to_string())
    }
}

/// Extracts the text carried by one streamed JSON chunk.
fn chunk_text(payload: &str) -> PortResult<Option<String>> {
    let chunk: StreamChunk = serde_json::from_str(payload)
        .map_err(|e| PortError::Upstream(format!("Malformed Gemini stream chunk: {}", e)))?;
    if let Some(error) = chunk.error {
        return Err(PortError::EmptyGeneration(error.message));
    }
    let text: String = chunk
        .candidates
        .into_iter()
        .filter_map(|c| c.content)
        .flat_map(|c| c.parts)
        .filter_map(|p| p.text)
        .collect();
    Ok(if text.is_empty() { None } else { Some(text) })
}

//=========================================================================================
// `ExamWriter` Trait Implementation
//=========================================================================================

#[async_trait]
impl ExamWriter for GeminiExamAdapter {
    async fn compose(
        &self,
        attachments: &[Attachment],
        prompt: &ExamPrompt,
    ) -> PortResult<Composition> {
        if attachments.is_empty() {
            return Err(PortError::NoAttachments);
        }

        let mut staged = Vec::with_capacity(attachments.len());
        for attachment in attachments {
            staged.push(self.stage_attachment(attachment).await?);
        }
        info!("Staged {} attachments with Gemini", staged.len());

        let prompt_text = format!(
            "{}\n{}\n{}",
            attachment_summary(attachments),
            prompt.system_instructions,
            prompt.instructions
        );
        let body = build_request_body(&prompt_text, &staged);

        let response = self
            .http
            .post(format!(
                "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
                self.api_base, prompt.model
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| PortError::Upstream(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PortError::EmptyGeneration(format!(
                "Gemini returned HTTP {}: {}",
                status, body
            )));
        }

        let mut bytes = response.bytes_stream();
        let fragments = async_stream::try_stream! {
            let mut decoder = SseDecoder::default();
            while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(|e| PortError::Upstream(e.to_string()))?;
                for payload in decoder.push(&chunk)? {
                    if let Some(text) = chunk_text(&payload)? {
                        yield text;
                    }
                }
            }
            if let Some(payload) = decoder.finish()? {
                if let Some(text) = chunk_text(&payload)? {
                    yield text;
                }
            }
        };

        Ok(Composition::Streaming(Box::pin(fragments)))
    }
}
