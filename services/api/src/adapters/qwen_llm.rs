//! services/api/src/adapters/qwen_llm.rs
//!
//! This module contains the adapter for the Qwen (DashScope) backend, an
//! OpenAI-compatible chat-completions API that only reads documents which were
//! uploaded beforehand. It implements the `ExamWriter` port from the `core` crate.
//!
//! Protocol: upload every attachment to `/files` (purpose `file-extract`), then
//! reference the returned ids as `fileid://<id>` system messages in one
//! chat-completion call.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use mock_exam_core::domain::Attachment;
use mock_exam_core::ports::{Composition, ExamPrompt, ExamWriter, PortError, PortResult};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{debug, info};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `ExamWriter` against a DashScope-compatible endpoint.
#[derive(Clone)]
pub struct QwenExamAdapter {
    chat: Client<OpenAIConfig>,
    http: reqwest::Client,
    api_base: String,
    api_key: String,
}

/// A file handle returned by the upload endpoint.
#[derive(Debug, Clone)]
struct UploadedFile {
    id: String,
    label: String,
}

#[derive(Deserialize)]
struct FileObject {
    id: String,
}

impl QwenExamAdapter {
    /// Creates a new `QwenExamAdapter`.
    pub fn new(http: reqwest::Client, api_key: String, api_base: String) -> Self {
        let api_base = api_base.trim_end_matches('/').to_string();
        let openai_config = OpenAIConfig::new()
            .with_api_key(&api_key)
            .with_api_base(&api_base);
        Self {
            chat: Client::with_config(openai_config),
            http,
            api_base,
            api_key,
        }
    }

    async fn upload_attachment(&self, attachment: &Attachment) -> PortResult<UploadedFile> {
        let file = &attachment.file;
        let upload_error = |message: String| PortError::AttachmentUpload {
            file_name: file.file_name.clone(),
            message,
        };

        let part = Part::bytes(file.bytes.to_vec())
            .file_name(file.file_name.clone())
            .mime_str(file.mime_type_or_default())
            .map_err(|e| upload_error(e.to_string()))?;
        let form = Form::new()
            .part("file", part)
            .text("purpose", "file-extract");

        let response = self
            .http
            .post(format!("{}/files", self.api_base))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| upload_error(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(upload_error(format!("HTTP {}: {}", status, body)));
        }

        let uploaded: FileObject = response
            .json()
            .await
            .map_err(|e| upload_error(e.to_string()))?;

        debug!("Uploaded {} as {}", file.file_name, uploaded.id);
        Ok(UploadedFile {
            id: uploaded.id,
            label: attachment.label(),
        })
    }
}

/// Builds the message list: persona, one system message per file handle, then the request.
fn build_messages(
    uploaded: &[UploadedFile],
    prompt: &ExamPrompt,
) -> Result<Vec<ChatCompletionRequestMessage>, OpenAIError> {
    let mut messages = Vec::with_capacity(uploaded.len() + 2);

    messages.push(ChatCompletionRequestMessage::System(
        ChatCompletionRequestSystemMessageArgs::default()
            .content(prompt.system_instructions.as_str())
            .build()?,
    ));

    for file in uploaded {
        messages.push(ChatCompletionRequestMessage::System(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(format!("fileid://{}", file.id))
                .build()?,
        ));
    }

    let summary = uploaded
        .iter()
        .enumerate()
        .map(|(i, file)| format!("Attachment {} ({}): fileid://{}", i + 1, file.label, file.id))
        .collect::<Vec<_>>()
        .join("\n");

    messages.push(ChatCompletionRequestMessage::User(
        ChatCompletionRequestUserMessageArgs::default()
            .content(format!("{}\n{}", summary, prompt.instructions))
            .build()?,
    ));

    Ok(messages)
}

//=========================================================================================
// `ExamWriter` Trait Implementation
//=========================================================================================

#[async_trait]
impl ExamWriter for QwenExamAdapter {
    async fn compose(
        &self,
        attachments: &[Attachment],
        prompt: &ExamPrompt,
    ) -> PortResult<Composition> {
        if attachments.is_empty() {
            return Err(PortError::NoAttachments);
        }

        // Slides before samples; handles are referenced in attachment order.
        let mut uploaded = Vec::with_capacity(attachments.len());
        for attachment in attachments {
            uploaded.push(self.upload_attachment(attachment).await?);
        }
        info!("Uploaded {} attachments to Qwen", uploaded.len());

        let messages =
            build_messages(&uploaded, prompt).map_err(|e| PortError::Unexpected(e.to_string()))?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&prompt.model)
            .temperature(0.3)
            .messages(messages)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = self
            .chat
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::EmptyGeneration(e.to_string()))?;

        let markdown = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| {
                PortError::EmptyGeneration("Qwen returned no message content.".to_string())
            })?;

        Ok(Composition::Complete(markdown))
    }
}
