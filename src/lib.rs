//! RefineMail - LLM-backed email refinement
//!
//! Static UI server, refine client, UI session state machine and clipboard export.

pub mod assets;
pub mod clipboard;
pub mod config;
pub mod error;
pub mod llm;
pub mod mock;
pub mod mode;
pub mod server;
pub mod session;
