//! Configuration management for RefineMail
//!
//! Handles loading and parsing of `refinemail.toml` and the `HOST`/`PORT`
//! environment overrides.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::server::ServeProfile;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Static asset server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// LLM provider settings
    #[serde(default)]
    pub llm: LlmConfig,
}

/// Static asset server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory holding the built UI
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Document served for `/` and for the SPA fallback
    #[serde(default = "default_index")]
    pub index: String,

    /// How unknown paths are answered
    #[serde(default)]
    pub profile: ServeProfile,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            root: default_root(),
            index: default_index(),
            profile: ServeProfile::default(),
        }
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// LLM provider: "gemini", "claude", "openai", "mock", or "none"
    #[serde(default = "default_provider")]
    pub provider: String,

    /// API key (can also be set via environment variable)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model name (e.g., "gemini-2.5-flash", "gpt-4o")
    #[serde(default)]
    pub model: Option<String>,

    /// API base URL (for custom endpoints)
    #[serde(default)]
    pub base_url: Option<String>,

    /// Sampling temperature; kept low so edits stay literal
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Cap on response tokens; unset leaves the provider default
    #[serde(default)]
    pub max_tokens: Option<u32>,

    /// Upper bound on a single completion call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_key: None,
            model: None,
            base_url: None,
            temperature: default_temperature(),
            max_tokens: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_root() -> PathBuf {
    PathBuf::from("dist")
}

fn default_index() -> String {
    "index.html".to_string()
}

fn default_provider() -> String {
    "gemini".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_timeout_secs() -> u64 {
    60
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("parsing {}", path.display()))?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Get default config file path
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "refinemail")
            .map(|dirs| dirs.config_dir().join("refinemail.toml"))
    }

    /// Load configuration from the working directory or user config directory
    pub fn load_from_default() -> Self {
        let workspace_path = PathBuf::from("refinemail.toml");
        if workspace_path.exists() {
            match Self::load(&workspace_path) {
                Ok(config) => return config,
                Err(e) => tracing::warn!("Ignoring {}: {:#}", workspace_path.display(), e),
            }
        }

        if let Some(default_path) = Self::default_path() {
            if let Ok(config) = Self::load(&default_path) {
                return config;
            }
        }

        Config::default()
    }

    /// Apply `HOST` and `PORT` overrides from the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(std::env::var("HOST").ok(), std::env::var("PORT").ok())
    }

    fn apply_overrides(&mut self, host: Option<String>, port: Option<String>) -> Result<()> {
        if let Some(host) = host.filter(|h| !h.is_empty()) {
            self.server.host = host;
        }
        if let Some(port) = port.filter(|p| !p.is_empty()) {
            self.server.port = port
                .parse()
                .with_context(|| format!("invalid PORT value: {port}"))?;
        }
        Ok(())
    }

    /// Socket address the server binds to
    pub async fn bind_addr(&self) -> Result<SocketAddr> {
        let host = self.server.host.as_str();
        tokio::net::lookup_host((host, self.server.port))
            .await
            .with_context(|| format!("invalid bind address: {host}:{}", self.server.port))?
            .next()
            .ok_or_else(|| anyhow!("no address found for {host}"))
    }

    /// Get the effective API key (from config or environment)
    pub fn get_api_key(&self) -> Option<String> {
        if let Some(ref key) = self.llm.api_key {
            if !key.is_empty() {
                return Some(key.clone());
            }
        }

        let vars: &[&str] = match self.llm.provider.as_str() {
            "gemini" => &["GEMINI_API_KEY", "API_KEY"],
            "claude" => &["ANTHROPIC_API_KEY"],
            "openai" => &["OPENAI_API_KEY"],
            _ => &[],
        };
        vars.iter()
            .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
    }

    /// Get the effective model name
    pub fn get_model(&self) -> String {
        self.llm
            .model
            .clone()
            .unwrap_or_else(|| match self.llm.provider.as_str() {
                "gemini" => "gemini-2.5-flash".to_string(),
                "claude" => "claude-3-5-sonnet-20241022".to_string(),
                "openai" => "gpt-4o".to_string(),
                _ => String::new(),
            })
    }

    /// Check if a completion backend can be built
    pub fn is_llm_enabled(&self) -> bool {
        match self.llm.provider.as_str() {
            "none" => false,
            "mock" => true,
            _ => self.get_api_key().is_some(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.llm.timeout_secs)
    }
}
