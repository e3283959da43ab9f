//! services/api/src/pipeline/events.rs
//!
//! The progress protocol of a generation job, written to the client as
//! newline-delimited JSON.

use crate::pipeline::composer::FragmentSink;
use crate::pipeline::job::JobFailure;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use serde::Serialize;
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, error};
use uuid::Uuid;

/// One line of the job stream.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    /// A stage finished; human-readable progress.
    Status { message: String },

    /// Generated exam text, in generation order.
    Chunk { text: String },

    /// Terminal: the job failed.
    Error { message: String },

    /// Terminal: the exam is persisted under `exam_id`.
    Done {
        #[serde(rename = "examId")]
        exam_id: Uuid,
    },
}

impl JobEvent {
    /// Serializes the event as one NDJSON line, newline included.
    pub fn to_ndjson(&self) -> String {
        match serde_json::to_string(self) {
            Ok(mut line) => {
                line.push('\n');
                line
            }
            Err(e) => format!(
                "{{\"type\":\"error\",\"message\":\"failed to encode event: {}\"}}\n",
                e
            ),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobEvent::Error { .. } | JobEvent::Done { .. })
    }
}

/// The writing half of a job stream.
///
/// Dropping the sink closes the stream, so `finish` consumes it: no event can
/// follow the terminal one. A departed client does not stop the job; later
/// writes are discarded.
pub struct EventSink {
    tx: mpsc::Sender<JobEvent>,
    client_gone: AtomicBool,
}

impl EventSink {
    /// Creates a sink and the receiver that feeds the response body.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<JobEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                tx,
                client_gone: AtomicBool::new(false),
            },
            rx,
        )
    }

    async fn send(&self, event: JobEvent) {
        if self.client_gone.load(Ordering::Relaxed) {
            return;
        }
        if self.tx.send(event).await.is_err() {
            debug!("Client disconnected; discarding further job events");
            self.client_gone.store(true, Ordering::Relaxed);
        }
    }

    pub async fn status(&self, message: impl Into<String>) {
        self.send(JobEvent::Status {
            message: message.into(),
        })
        .await;
    }

    pub async fn chunk(&self, text: impl Into<String>) {
        self.send(JobEvent::Chunk { text: text.into() }).await;
    }

    pub fn client_gone(&self) -> bool {
        self.client_gone.load(Ordering::Relaxed)
    }

    /// Emits exactly one terminal event and closes the stream.
    pub async fn finish(self, outcome: Result<Uuid, JobFailure>) {
        let event = match outcome {
            Ok(exam_id) => JobEvent::Done { exam_id },
            Err(failure) => {
                error!("Exam generation failed while {}: {}", failure.stage, failure.error);
                JobEvent::Error {
                    message: failure.error.to_string(),
                }
            }
        };
        self.send(event).await;
    }
}

#[async_trait]
impl FragmentSink for EventSink {
    async fn fragment(&self, text: &str) {
        self.chunk(text).await;
    }
}

/// Turns the receiving half into an NDJSON response body stream.
pub fn ndjson_body(
    mut rx: mpsc::Receiver<JobEvent>,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    async_stream::stream! {
        while let Some(event) = rx.recv().await {
            yield Ok(Bytes::from(event.to_ndjson()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::job::{JobError, JobStage};
    use futures::StreamExt;
    use mock_exam_core::ports::PortError;

    #[test]
    fn events_serialize_with_type_tag() {
        let status = JobEvent::Status {
            message: "Materials loaded".into(),
        };
        assert_eq!(
            status.to_ndjson(),
            "{\"type\":\"status\",\"message\":\"Materials loaded\"}\n"
        );

        let id = Uuid::nil();
        let done = JobEvent::Done { exam_id: id };
        let value: serde_json::Value = serde_json::to_value(&done).unwrap();
        assert_eq!(value["type"], "done");
        assert_eq!(value["examId"], id.to_string());

        let chunk = JobEvent::Chunk { text: "# Exam".into() };
        assert_eq!(serde_json::to_value(&chunk).unwrap()["text"], "# Exam");
        assert!(!chunk.is_terminal());
        assert!(done.is_terminal());
    }

    #[tokio::test]
    async fn stream_ends_after_the_terminal_event() {
        let (sink, rx) = EventSink::channel(8);
        sink.status("Materials loaded").await;
        sink.fragment("# Mock").await;
        sink.finish(Err(JobFailure {
            stage: JobStage::Generating,
            error: JobError::Port(PortError::EmptyGeneration("no output".into())),
        }))
        .await;

        let lines: Vec<String> = ndjson_body(rx)
            .map(|item| String::from_utf8(item.unwrap().to_vec()).unwrap())
            .collect()
            .await;

        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("\"status\""));
        assert!(lines[1].contains("\"chunk\""));
        assert!(lines[2].starts_with("{\"type\":\"error\""));
        assert!(lines[2].contains("no output"));
    }

    #[tokio::test]
    async fn dropped_receiver_marks_client_gone() {
        let (sink, rx) = EventSink::channel(1);
        drop(rx);
        sink.status("anyone there?").await;
        assert!(sink.client_gone());
        sink.chunk("ignored").await;
        sink.finish(Ok(Uuid::new_v4())).await;
    }
}
