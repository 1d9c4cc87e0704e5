//! UI session state and its transitions.
//!
//! `reduce` is the only place state changes. It returns the effects the
//! caller has to run (calling the refine client, writing the clipboard,
//! arming timers). [`Shell`] is an async driver that runs those effects.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use crate::clipboard::{self, ClipboardSink, CopyOutcome, ExportProfile};
use crate::error::EMPTY_INPUT_MESSAGE;
use crate::llm::RefineClient;
use crate::mode::RefineMode;

/// How long the "copied" indicator stays on
pub const COPIED_RESET_DELAY: Duration = Duration::from_millis(2000);

/// Delay before scrolling the output into view, so it has been painted
pub const SCROLL_DELAY: Duration = Duration::from_millis(100);

/// Fallback when a failure carries no message
pub const GENERIC_ERROR_MESSAGE: &str = "Something went wrong.";

pub const CLEAR_PROMPT: &str = "Are you sure you want to clear both fields?";

/// Everything the UI shows for one tab.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub input: String,
    pub output: String,
    pub loading: bool,
    pub error: Option<String>,
    pub copied: bool,
    /// Bumped on every successful copy; stale reset timers compare against it
    pub copied_generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Loading,
    Success,
    Error,
}

impl SessionState {
    pub fn phase(&self) -> Phase {
        if self.loading {
            Phase::Loading
        } else if self.error.is_some() {
            Phase::Error
        } else if !self.output.is_empty() {
            Phase::Success
        } else {
            Phase::Idle
        }
    }

    /// Mode buttons are disabled exactly while a request is in flight
    pub fn controls_disabled(&self) -> bool {
        self.loading
    }

    pub fn can_copy(&self) -> bool {
        !self.output.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    SetInput(String),
    Submit(RefineMode),
    RefineSucceeded(String),
    RefineFailed(String),
    Clear { confirmed: bool },
    Copy,
    CopySucceeded,
    CopyFailed(String),
    CopiedExpired(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    CallRefine { text: String, mode: RefineMode },
    ScrollOutputIntoView { after: Duration },
    CopyOutput { html: String },
    ResetCopied { generation: u64, after: Duration },
}

pub fn reduce(state: &mut SessionState, action: Action) -> Vec<Effect> {
    match action {
        Action::SetInput(text) => {
            state.input = text;
            Vec::new()
        }
        Action::Submit(mode) => {
            if state.loading {
                return Vec::new();
            }
            if state.input.trim().is_empty() {
                state.error = Some(EMPTY_INPUT_MESSAGE.to_string());
                return Vec::new();
            }
            state.error = None;
            state.copied = false;
            state.loading = true;
            vec![Effect::CallRefine {
                text: state.input.clone(),
                mode,
            }]
        }
        Action::RefineSucceeded(html) => {
            state.output = html;
            state.loading = false;
            vec![Effect::ScrollOutputIntoView {
                after: SCROLL_DELAY,
            }]
        }
        Action::RefineFailed(message) => {
            state.error = Some(if message.is_empty() {
                GENERIC_ERROR_MESSAGE.to_string()
            } else {
                message
            });
            state.loading = false;
            Vec::new()
        }
        Action::Clear { confirmed } => {
            if confirmed {
                state.input.clear();
                state.output.clear();
                state.error = None;
                state.copied = false;
            }
            Vec::new()
        }
        Action::Copy => {
            if !state.can_copy() {
                return Vec::new();
            }
            vec![Effect::CopyOutput {
                html: state.output.clone(),
            }]
        }
        Action::CopySucceeded => {
            state.copied = true;
            state.copied_generation += 1;
            vec![Effect::ResetCopied {
                generation: state.copied_generation,
                after: COPIED_RESET_DELAY,
            }]
        }
        Action::CopyFailed(message) => {
            state.error = Some(message);
            Vec::new()
        }
        Action::CopiedExpired(generation) => {
            if generation == state.copied_generation {
                state.copied = false;
            }
            Vec::new()
        }
    }
}

/// Drives a [`SessionState`] against a refine client and a clipboard.
#[derive(Clone)]
pub struct Shell {
    state: Arc<RwLock<SessionState>>,
    client: RefineClient,
    clipboard: Arc<dyn ClipboardSink>,
    profile: ExportProfile,
}

impl Shell {
    pub fn new(client: RefineClient, clipboard: Arc<dyn ClipboardSink>) -> Self {
        Self {
            state: Arc::new(RwLock::new(SessionState::default())),
            client,
            clipboard,
            profile: ExportProfile::default(),
        }
    }

    pub fn with_export_profile(mut self, profile: ExportProfile) -> Self {
        self.profile = profile;
        self
    }

    pub async fn snapshot(&self) -> SessionState {
        self.state.read().await.clone()
    }

    pub async fn set_input(&self, text: impl Into<String>) {
        self.dispatch(Action::SetInput(text.into())).await;
    }

    pub async fn submit(&self, mode: RefineMode) {
        self.dispatch(Action::Submit(mode)).await;
    }

    /// Copy the output; returns how it landed on the clipboard, if it did
    pub async fn copy(&self) -> Option<CopyOutcome> {
        self.dispatch(Action::Copy).await
    }

    /// Clear everything after asking `confirm` with [`CLEAR_PROMPT`]
    pub async fn clear(&self, confirm: impl FnOnce(&str) -> bool) {
        let confirmed = confirm(CLEAR_PROMPT);
        self.dispatch(Action::Clear { confirmed }).await;
    }

    async fn dispatch(&self, action: Action) -> Option<CopyOutcome> {
        let mut queue = VecDeque::from([action]);
        let mut copied = None;

        while let Some(action) = queue.pop_front() {
            let effects = {
                let mut state = self.state.write().await;
                reduce(&mut state, action)
            };

            for effect in effects {
                match effect {
                    Effect::CallRefine { text, mode } => {
                        let next = match self.client.process(&text, mode).await {
                            Ok(html) => Action::RefineSucceeded(html),
                            Err(e) => Action::RefineFailed(e.to_string()),
                        };
                        queue.push_back(next);
                    }
                    Effect::ScrollOutputIntoView { after } => {
                        tracing::debug!("Output ready, scrolling into view in {:?}", after);
                    }
                    Effect::CopyOutput { html } => {
                        let next =
                            match clipboard::export(self.clipboard.as_ref(), &html, self.profile)
                                .await
                            {
                                Ok(outcome) => {
                                    copied = Some(outcome);
                                    Action::CopySucceeded
                                }
                                Err(e) => Action::CopyFailed(e.to_string()),
                            };
                        queue.push_back(next);
                    }
                    Effect::ResetCopied { generation, after } => {
                        let state = Arc::clone(&self.state);
                        tokio::spawn(async move {
                            tokio::time::sleep(after).await;
                            let mut state = state.write().await;
                            reduce(&mut state, Action::CopiedExpired(generation));
                        });
                    }
                }
            }
        }

        copied
    }
}
