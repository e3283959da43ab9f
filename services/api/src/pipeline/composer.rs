//! services/api/src/pipeline/composer.rs
//!
//! Builds the exam-authoring prompt and drives an `ExamWriter`, forwarding
//! generated text to a sink as soon as it arrives.

use async_trait::async_trait;
use futures::StreamExt;
use mock_exam_core::domain::{Attachment, Difficulty, QuestionCount};
use mock_exam_core::ports::{Composition, ExamPrompt, ExamWriter, PortError, PortResult};
use tracing::debug;

pub const SYSTEM_INSTRUCTIONS: &str = "You are an experienced university exam designer. \
You create markdown-formatted mock exams with clear section headings, numbered questions, \
and provide answer keys at the end.";

const TEMPLATE_GUIDANCE: &str = r#"
Organise the output strictly according to this Markdown template:
# Exam title (for example: Linear Algebra Final Mock Exam)
- Duration: XX minutes
- Total score: XX points

## Part I: Single choice (X questions, X points each)
1. **Question stem**
   - A. Option A
   - B. Option B
   - C. Option C
   - D. Option D

## Part II: Fill in the blank (X questions, X points each)
1. Question stem, with underscores or a gap marking where the answer goes

## Part III: Computation / worked problems (if applicable)
1. Question stem, listing the given conditions and what must be solved

## Part IV: Short answer
1. Question stem, listing the points the answer must cover

## Answer key
### Single choice
1. Correct option + brief explanation
### Fill in the blank
1. Expected answer or key points
### Computation / worked problems
1. Solution steps and final result
### Short answer
1. Key points"#;

const RULES: &[&str] = &[
    "Generate a structured Markdown mock exam based on the attachments, making sure that:",
    "- the exam header contains the course name, exam duration and total score;",
    "- single choice, fill in the blank, computation (if applicable) and short answer questions are in separate sections, with question stems and options on separate lines and options labelled A/B/C/D;",
    "- no question refers to or depends on an image; if an original question relies on an image, describe it in words instead;",
    "- the answer key uses second-level headings and lists answers by question number;",
    "- the Markdown syntax is clean so it can be converted to PDF.",
];

/// Course and exam parameters that end up in the prompt.
#[derive(Debug, Clone)]
pub struct ExamBrief<'a> {
    pub course_title: &'a str,
    pub course_description: Option<&'a str>,
    pub question_count: QuestionCount,
    pub difficulty: Difficulty,
    pub extra_instructions: Option<&'a str>,
}

/// The user-facing part of the prompt: course facts, rules, and the fixed template.
pub fn build_instructions(brief: &ExamBrief<'_>) -> String {
    let mut lines = vec![format!("Course name: {}", brief.course_title)];
    if let Some(description) = brief.course_description.filter(|d| !d.trim().is_empty()) {
        lines.push(format!("Course description: {}", description));
    }
    lines.push(format!("Target number of questions: {}", brief.question_count));
    lines.push(format!("Difficulty: {}", brief.difficulty));
    lines.push(match brief.extra_instructions.filter(|i| !i.trim().is_empty()) {
        Some(extra) => format!("Additional requirements: {}", extra),
        None => "Additional requirements: none".to_string(),
    });
    lines.extend(RULES.iter().map(|rule| rule.to_string()));
    lines.push(TEMPLATE_GUIDANCE.to_string());
    lines.join("\n")
}

pub fn build_prompt(brief: &ExamBrief<'_>, model: String) -> ExamPrompt {
    ExamPrompt {
        model,
        system_instructions: SYSTEM_INSTRUCTIONS.to_string(),
        instructions: build_instructions(brief),
    }
}

/// Receives generated text before the whole exam is known.
#[async_trait]
pub trait FragmentSink: Send + Sync {
    async fn fragment(&self, text: &str);
}

/// Runs one generation and returns the assembled Markdown.
///
/// Every fragment is forwarded to `sink` in generation order. Backends that answer
/// in one piece produce a single fragment.
pub async fn compose_exam(
    writer: &dyn ExamWriter,
    attachments: &[Attachment],
    prompt: &ExamPrompt,
    sink: &dyn FragmentSink,
) -> PortResult<String> {
    if attachments.is_empty() {
        return Err(PortError::NoAttachments);
    }

    let markdown = match writer.compose(attachments, prompt).await? {
        Composition::Complete(text) => {
            if !text.trim().is_empty() {
                sink.fragment(&text).await;
            }
            text
        }
        Composition::Streaming(mut fragments) => {
            let mut markdown = String::new();
            while let Some(fragment) = fragments.next().await {
                let fragment = fragment?;
                if fragment.is_empty() {
                    continue;
                }
                sink.fragment(&fragment).await;
                markdown.push_str(&fragment);
            }
            markdown
        }
    };

    if markdown.trim().is_empty() {
        return Err(PortError::EmptyGeneration(
            "the backend produced no exam text".to_string(),
        ));
    }
    debug!("Composed exam of {} characters", markdown.len());
    Ok(markdown)
}
