//! Offline completion backend.
//!
//! Answers every mode with the same subscription table after a fixed delay,
//! changing only the status column so the mode is visible in the output.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::llm::{CompletionBackend, CompletionRequest};
use crate::mode::RefineMode;

const HEADERS: [&str; 6] = [
    "SUBSCRIPTION ID",
    "REQUEST TYPE",
    "VM TYPE",
    "REGION",
    "CORES",
    "STATUS",
];

const ROWS: [[&str; 5]; 3] = [
    ["689ebfb2-0f24-4c89-85dd-9f40f58c22a9", "Region Enablement", "Dlsv6 Series", "Brazil South (SB)", "350"],
    ["689ebfb2-0f24-4c89-85dd-9f40f58c22a9", "Region Enablement", "Dadsv5 Series", "Brazil South (SB)", "350"],
    ["689ebfb2-0f24-4c89-85dd-9f40f58c22a9", "Region Enablement", "Dadsv6 Series", "Brazil South (SB)", "350"],
];

const TABLE_STYLE: &str = r#"border-collapse: collapse; font-family: "Calibri Light", "Calibri", sans-serif; font-size: 11pt;"#;
const HEADER_STYLE: &str = "border: 1px solid #bfbfbf; padding: 4px 12px; background-color: #d9e1f2; color: #000000; text-align: center; font-weight: bold; white-space: nowrap;";
const CELL_STYLE: &str = "border: 1px solid #bfbfbf; padding: 4px 12px; background-color: transparent; text-align: center; white-space: nowrap;";

/// Status column value shown for each mode
fn status_for(mode: RefineMode) -> &'static str {
    match mode {
        RefineMode::ProofreadEnglish => "Approved (EN)",
        RefineMode::TranslateToEnglish => "Translated",
        RefineMode::Tabulate => "Approved",
        RefineMode::ProofreadPortuguese => "Aprovado (PT)",
        RefineMode::Summarize => "Summarized",
    }
}

/// Render the demo table with the given status in every row
pub fn table_html(status: &str) -> String {
    let mut html = format!(r#"<table style='{}'><thead><tr>"#, TABLE_STYLE);
    for header in HEADERS {
        html.push_str(&format!(r#"<th style="{}">{}</th>"#, HEADER_STYLE, header));
    }
    html.push_str("</tr></thead><tbody>");

    for row in ROWS {
        html.push_str("<tr>");
        for cell in row.iter().copied().chain(std::iter::once(status)) {
            html.push_str(&format!(r#"<td style="{}">{}</td>"#, CELL_STYLE, cell));
        }
        html.push_str("</tr>");
    }
    html.push_str("</tbody></table>");

    html
}

pub struct MockBackend {
    delay: Duration,
}

impl MockBackend {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new(Duration::from_millis(800))
    }
}

#[async_trait]
impl CompletionBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        tokio::time::sleep(self.delay).await;
        Ok(table_html(status_for(request.mode)))
    }
}
