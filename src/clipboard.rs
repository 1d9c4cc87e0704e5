//! Clipboard export of refined output.
//!
//! Rich targets (word processors, mail clients) read the `text/html` entry;
//! everything else reads the `text/plain` rendering.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;

use crate::error::ClipboardError;

/// Entries written to the clipboard for one copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipboardPayload {
    pub html: String,
    /// Absent when only the HTML entry is written
    pub text: Option<String>,
}

impl ClipboardPayload {
    /// HTML entry plus its plain-text rendering
    pub fn from_html(html: &str) -> Self {
        Self {
            html: html.to_string(),
            text: Some(html_to_text(html)),
        }
    }

    pub fn html_only(html: &str) -> Self {
        Self {
            html: html.to_string(),
            text: None,
        }
    }

    /// `(mime type, data)` pairs in write order
    pub fn entries(&self) -> Vec<(&'static str, &str)> {
        let mut entries = vec![("text/html", self.html.as_str())];
        if let Some(ref text) = self.text {
            entries.push(("text/plain", text.as_str()));
        }
        entries
    }
}

/// Destination of clipboard writes.
#[async_trait]
pub trait ClipboardSink: Send + Sync {
    /// Write a multi-format item
    async fn write_rich(&self, payload: &ClipboardPayload) -> Result<(), ClipboardError>;

    /// Write plain text only
    async fn write_text(&self, text: &str) -> Result<(), ClipboardError>;
}

/// Which entries a copy writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportProfile {
    /// `text/html` and `text/plain` together
    #[default]
    RichWithText,
    /// `text/html` alone; the result is announced with a notice
    HtmlOnly,
}

/// How a successful copy ended up on the clipboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOutcome {
    Rich,
    PlainTextFallback,
}

impl CopyOutcome {
    pub fn notice(self) -> &'static str {
        match self {
            CopyOutcome::Rich => "Copied to clipboard as HTML!",
            CopyOutcome::PlainTextFallback => {
                "Copied as plain text (HTML copy failed check console)."
            }
        }
    }
}

/// Copy `html` to `sink`, falling back to plain text when the rich write is rejected.
pub async fn export(
    sink: &dyn ClipboardSink,
    html: &str,
    profile: ExportProfile,
) -> Result<CopyOutcome, ClipboardError> {
    let payload = match profile {
        ExportProfile::RichWithText => ClipboardPayload::from_html(html),
        ExportProfile::HtmlOnly => ClipboardPayload::html_only(html),
    };

    match sink.write_rich(&payload).await {
        Ok(()) => Ok(CopyOutcome::Rich),
        Err(e) => {
            tracing::warn!("Copy failed: {}", e);
            let text = payload.text.unwrap_or_else(|| html_to_text(html));
            match sink.write_text(&text).await {
                Ok(()) => Ok(CopyOutcome::PlainTextFallback),
                Err(fallback) => {
                    tracing::warn!("Plain-text copy failed: {}", fallback);
                    Err(ClipboardError::Unavailable)
                }
            }
        }
    }
}

fn cached(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static pattern"))
}

/// Render HTML as readable text, roughly what a browser reports as visible text.
pub fn html_to_text(html: &str) -> String {
    static HIDDEN: OnceLock<Regex> = OnceLock::new();
    static SPACE: OnceLock<Regex> = OnceLock::new();
    static BREAK: OnceLock<Regex> = OnceLock::new();
    static ITEM: OnceLock<Regex> = OnceLock::new();
    static CELL_END: OnceLock<Regex> = OnceLock::new();
    static BLOCK_END: OnceLock<Regex> = OnceLock::new();
    static LINE_END: OnceLock<Regex> = OnceLock::new();
    static TAG: OnceLock<Regex> = OnceLock::new();
    static BLANK_RUN: OnceLock<Regex> = OnceLock::new();

    let text = cached(&HIDDEN, r"(?is)<(script|style)\b.*?</(script|style)>").replace_all(html, "");
    let text = cached(&SPACE, r"\s+").replace_all(&text, " ");
    let text = cached(&BREAK, r"(?i)<br\s*/?>").replace_all(&text, "\n");
    let text = cached(&ITEM, r"(?i)<li\b[^>]*>").replace_all(&text, "• ");
    let text = cached(&CELL_END, r"(?i)</t[dh]>").replace_all(&text, "\t");
    let text = cached(&BLOCK_END, r"(?i)</(p|h[1-6]|ul|ol|table)>").replace_all(&text, "\n\n");
    let text = cached(&LINE_END, r"(?i)</(div|li|tr)>").replace_all(&text, "\n");
    let text = cached(&TAG, r"<[^>]*>").replace_all(&text, "");
    let text = decode_entities(&text);

    let lines: Vec<&str> = text
        .split('\n')
        .map(|line| line.trim_matches(' ').trim_end_matches('\t'))
        .collect();
    let joined = lines.join("\n");

    cached(&BLANK_RUN, r"\n{3,}")
        .replace_all(&joined, "\n\n")
        .trim()
        .to_string()
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
