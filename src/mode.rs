//! Refine modes and the prompt templates attached to them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Format rules sent as the system part of every completion request.
pub const SYSTEM_INSTRUCTION: &str = r#"You are an expert executive email assistant.
CRITICAL OUTPUT RULES:
1. Always return the email body as HTML content.
2. Do NOT use markdown code blocks (like ```html). Return raw HTML strings.
3. Use <p> tags for paragraphs.
4. Use <br> for line breaks.
5. For tables, strictly use HTML <table> with inline CSS styles to ensure compatibility when pasted into Outlook or Word.
   - Table style: border-collapse: collapse; width: 100%; font-family: sans-serif; font-size: 14px;
   - Header style: background-color: #dce6f1; border: 1px solid #8e8e8e; padding: 8px; text-align: left; font-weight: bold; color: #1f497d;
   - Cell style: border: 1px solid #8e8e8e; padding: 8px; color: #333;
"#;

/// Transformation applied to the pasted email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RefineMode {
    ProofreadEnglish,
    TranslateToEnglish,
    Tabulate,
    ProofreadPortuguese,
    Summarize,
}

impl RefineMode {
    /// All modes in menu order
    pub const ALL: [RefineMode; 5] = [
        RefineMode::ProofreadEnglish,
        RefineMode::TranslateToEnglish,
        RefineMode::Tabulate,
        RefineMode::ProofreadPortuguese,
        RefineMode::Summarize,
    ];

    /// Mode-specific instruction placed before the input text
    pub fn instruction(self) -> &'static str {
        match self {
            RefineMode::ProofreadEnglish => {
                "Proofread the following email text for standard English. Return the result as clean HTML <p> paragraphs. Correct grammar, spelling, and improve flow."
            }
            RefineMode::TranslateToEnglish => {
                "Translate the following text into professional business English. Return the result as clean HTML <p> paragraphs. Ensure the tone is corporate."
            }
            RefineMode::Tabulate => {
                "Analyze the text. If it contains data/lists, convert them into an HTML table using the specific inline styles defined in the system instructions (Light blue headers #dce6f1, borders). Keep surrounding text as HTML <p> paragraphs."
            }
            RefineMode::ProofreadPortuguese => {
                "Proofread the following email text for Portuguese (Brazil). Return the result as clean HTML <p> paragraphs. Maintain formal business tone."
            }
            RefineMode::Summarize => {
                "Rewrite the email as an Executive Brief. Use an HTML <ul> list for bullet points and <b> tags for emphasis. Return valid HTML."
            }
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RefineMode::ProofreadEnglish => "Proofread (EN)",
            RefineMode::TranslateToEnglish => "Translate to EN",
            RefineMode::Tabulate => "Format Table",
            RefineMode::ProofreadPortuguese => "Proofread (PT)",
            RefineMode::Summarize => "Summarize",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            RefineMode::ProofreadEnglish => "Fix grammar & polish tone",
            RefineMode::TranslateToEnglish => "Portuguese to English",
            RefineMode::Tabulate => "Convert data to tables",
            RefineMode::ProofreadPortuguese => "Revisão em Português",
            RefineMode::Summarize => "Executive bullet points",
        }
    }

    /// Wire tag, identical to the serde representation
    pub fn as_str(self) -> &'static str {
        match self {
            RefineMode::ProofreadEnglish => "proofread-english",
            RefineMode::TranslateToEnglish => "translate-to-english",
            RefineMode::Tabulate => "tabulate",
            RefineMode::ProofreadPortuguese => "proofread-portuguese",
            RefineMode::Summarize => "summarize",
        }
    }
}

impl fmt::Display for RefineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the mode menu shown by the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefineOption {
    pub mode: RefineMode,
    pub label: &'static str,
    pub description: &'static str,
    /// 1-based position, used as the keyboard shortcut badge
    pub shortcut: usize,
}

/// The fixed menu, in display order
pub fn menu() -> Vec<RefineOption> {
    RefineMode::ALL
        .iter()
        .enumerate()
        .map(|(i, &mode)| RefineOption {
            mode,
            label: mode.label(),
            description: mode.description(),
            shortcut: i + 1,
        })
        .collect()
}
