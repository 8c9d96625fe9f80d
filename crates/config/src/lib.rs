use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

// ── Vault layout ──────────────────────────────────────────────────────────────

/// Where the Obsidian vault lives and how the assistant's folders are laid
/// out inside it.  Every directory except `path` is vault-relative.
///
/// | Field          | Holds                                                   |
/// |----------------|---------------------------------------------------------|
/// | `daily_dir`    | Daily journal notes (`YYYY-MM-DD.md`)                   |
/// | `new_dir`      | Drafts staged for human review                          |
/// | `revision_dir` | Drafts parked after exhausting their revision rounds    |
/// | `notes_dir`    | Permanent home of approved notes                        |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    pub path: String,
    pub daily_dir: String,
    pub new_dir: String,
    pub revision_dir: String,
    pub notes_dir: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            path: "./vault".to_string(),
            daily_dir: "Daily".to_string(),
            new_dir: "ObsidianBoy/New".to_string(),
            revision_dir: "ObsidianBoy/Revision".to_string(),
            notes_dir: "ObsidianBoy/Notes".to_string(),
        }
    }
}

impl VaultConfig {
    pub fn root(&self) -> PathBuf {
        PathBuf::from(&self.path)
    }

    pub fn daily_path(&self) -> PathBuf {
        self.root().join(&self.daily_dir)
    }

    pub fn new_path(&self) -> PathBuf {
        self.root().join(&self.new_dir)
    }

    pub fn revision_path(&self) -> PathBuf {
        self.root().join(&self.revision_dir)
    }

    pub fn notes_path(&self) -> PathBuf {
        self.root().join(&self.notes_dir)
    }
}

// ── Language model backend ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// `openai` for any OpenAI-compatible chat endpoint (DeepSeek, OpenAI,
    /// OpenRouter) or `ollama` for a local Ollama server.
    pub provider: String,
    pub openai_base_url: String,
    pub openai_model: String,
    /// Bearer token for the OpenAI-compatible endpoint.  Overridden at load
    /// time by the `SCRIBE_API_KEY` environment variable when set.
    pub openai_api_key: String,
    /// Base URL for the Ollama API.  Overridden at load time by the
    /// `OLLAMA_BASE_URL` environment variable when set.
    pub ollama_base_url: String,
    pub ollama_model: String,
    pub temperature: f32,
    /// Per-request timeout.  A stuck backend otherwise blocks the whole run.
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            openai_base_url: "https://api.deepseek.com/v1".to_string(),
            openai_model: "deepseek-chat".to_string(),
            openai_api_key: String::new(),
            ollama_base_url: "http://localhost:11434".to_string(),
            ollama_model: "llama3.1:8b".to_string(),
            temperature: 0.0,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeConfig {
    /// Root directory of the file-backed knowledge store.
    pub path: String,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            path: ".scribe/knowledge".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    /// Revision rounds a drafted note may go through before it is parked in
    /// `vault.revision_dir`.
    pub max_revisions: usize,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self { max_revisions: 3 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub vault: VaultConfig,
    pub llm: LlmConfig,
    pub knowledge: KnowledgeConfig,
    pub review: ReviewConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Load configuration from `path`, falling back to defaults when the file
    /// does not exist, then apply environment overrides.
    ///
    /// This is the only place the environment is consulted; everything
    /// downstream receives the resolved struct.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config: Self = match fs::read_to_string(path) {
            Ok(raw) => toml::from_str(&raw)?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => Self::default(),
            Err(err) => {
                return Err(err).with_context(|| format!("reading {}", path.display()));
            }
        };

        if let Ok(key) = env::var("SCRIBE_API_KEY") {
            if !key.is_empty() {
                config.llm.openai_api_key = key;
            }
        }

        if let Ok(value) = env::var("OLLAMA_BASE_URL") {
            if !value.is_empty() {
                config.llm.ollama_base_url = value;
            }
        }

        if let Ok(value) = env::var("SCRIBE_VAULT_PATH") {
            if !value.is_empty() {
                config.vault.path = value;
            }
        }

        Ok(config)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let rendered = toml::to_string_pretty(self)?;
        fs::write(path, rendered)?;
        Ok(())
    }

    pub fn active_model(&self) -> &str {
        if self.llm.provider.eq_ignore_ascii_case("ollama") {
            &self.llm.ollama_model
        } else {
            &self.llm.openai_model
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
