//! services/api/src/adapters/renderer.rs
//!
//! Markdown to PDF conversion. The Markdown is turned into a small styled HTML
//! document with `pulldown-cmark`, then printed by headless Chromium.
//! Implements the `DocumentRenderer` port from the `core` crate.

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::page::PrintToPdfParams;
use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use mock_exam_core::ports::{DocumentRenderer, PortError, PortResult};
use pulldown_cmark::{html, Options, Parser};
use std::path::PathBuf;
use tracing::{debug, warn};

const STYLESHEET: &str = r#"
html, body { font-family: "Helvetica Neue", Arial, sans-serif; }
h1, h2, h3 { color: #0f172a; }
code { background-color: #f1f5f9; padding: 0.2em 0.4em; border-radius: 4px; }
table { border-collapse: collapse; width: 100%; }
table, th, td { border: 1px solid #cbd5f5; padding: 8px; }
"#;

// A4 in inches, with 20mm margins.
const A4_WIDTH_IN: f64 = 8.27;
const A4_HEIGHT_IN: f64 = 11.69;
const MARGIN_IN: f64 = 20.0 / 25.4;

/// Renders exams through a freshly launched headless browser per document.
pub struct ChromiumRenderer {
    chrome_executable: Option<PathBuf>,
}

impl ChromiumRenderer {
    pub fn new(chrome_executable: Option<PathBuf>) -> Self {
        Self { chrome_executable }
    }

    fn browser_config(&self) -> PortResult<BrowserConfig> {
        let mut builder = BrowserConfig::builder().new_headless_mode().no_sandbox().args(vec![
            "--disable-gpu",
            "--disable-dev-shm-usage",
        ]);
        if let Some(path) = &self.chrome_executable {
            builder = builder.chrome_executable(path);
        }
        builder.build().map_err(PortError::Render)
    }
}

/// Wraps rendered Markdown in a standalone, styled HTML page.
pub fn markdown_to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let mut body = String::with_capacity(markdown.len() * 2);
    html::push_html(&mut body, Parser::new_ext(markdown, options));

    format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><style>{}</style></head><body>\n{}</body></html>",
        STYLESHEET, body
    )
}

fn print_params() -> PrintToPdfParams {
    PrintToPdfParams {
        print_background: Some(true),
        paper_width: Some(A4_WIDTH_IN),
        paper_height: Some(A4_HEIGHT_IN),
        margin_top: Some(MARGIN_IN),
        margin_bottom: Some(MARGIN_IN),
        margin_left: Some(MARGIN_IN),
        margin_right: Some(MARGIN_IN),
        ..Default::default()
    }
}

#[async_trait]
impl DocumentRenderer for ChromiumRenderer {
    async fn render(&self, markdown: &str) -> PortResult<Vec<u8>> {
        let document = markdown_to_html(markdown);

        let (mut browser, mut handler) = Browser::launch(self.browser_config()?)
            .await
            .map_err(|e| PortError::Render(format!("failed to launch browser: {}", e)))?;

        // The CDP handler has to be polled for the browser to make progress.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let printed = async {
            let page = browser.new_page("about:blank").await?;
            page.set_content(document).await?;
            page.pdf(print_params()).await
        }
        .await;

        if let Err(e) = browser.close().await {
            warn!("Failed to close the rendering browser: {}", e);
        }
        if let Err(e) = browser.wait().await {
            warn!("Rendering browser did not exit cleanly: {}", e);
        }
        handler_task.abort();

        let pdf = printed.map_err(|e| PortError::Render(e.to_string()))?;
        if pdf.is_empty() {
            return Err(PortError::Render(
                "the Markdown to PDF conversion produced no output".to_string(),
            ));
        }
        debug!("Rendered PDF ({} bytes)", pdf.len());
        Ok(pdf)
    }
}
