use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};

pub const DEFAULT_MODEL_ID: &str = "llama-3.3-70b-versatile";
pub const DEFAULT_GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_EMBEDDER_ID: &str = "sentence-transformers/all-MiniLM-L6-v2";
pub const DEFAULT_EMBEDDER_BASE_URL: &str = "https://router.huggingface.co/hf-inference/models";
pub const DEFAULT_DATABASE_URL: &str = "postgres://ai:ai@localhost:5532/ai";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    #[serde(default = "default_model_id")]
    pub id: String,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_groq_base_url")]
    pub base_url: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            id: default_model_id(),
            max_tokens: None,
            api_key: None,
            base_url: default_groq_base_url(),
        }
    }
}

impl ModelConfig {
    /// Same provider settings with a different response length limit, the
    /// way each exercise picks its own `max_tokens`.
    pub fn with_max_tokens(&self, max_tokens: u32) -> Self {
        Self {
            max_tokens: Some(max_tokens),
            ..self.clone()
        }
    }
}

fn default_model_id() -> String {
    DEFAULT_MODEL_ID.into()
}

fn default_groq_base_url() -> String {
    DEFAULT_GROQ_BASE_URL.into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbedderConfig {
    #[serde(default = "default_embedder_id")]
    pub id: String,
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_embedder_base_url")]
    pub base_url: String,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            id: default_embedder_id(),
            dimensions: default_dimensions(),
            api_key: None,
            base_url: default_embedder_base_url(),
        }
    }
}

fn default_embedder_id() -> String {
    DEFAULT_EMBEDDER_ID.into()
}

fn default_dimensions() -> usize {
    384
}

fn default_embedder_base_url() -> String {
    DEFAULT_EMBEDDER_BASE_URL.into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_database_url() -> String {
    DEFAULT_DATABASE_URL.into()
}

fn default_max_connections() -> u32 {
    5
}

/// Everything an exercise needs to reach its upstream services. Built once at
/// startup and handed to each client explicitly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CourseConfig {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub embedder: EmbedderConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

impl CourseConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        toml::from_str(&raw)
            .map_err(|err| AgentError::Config(format!("failed to parse configuration: {err}")))
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.apply_env();
        cfg
    }

    /// Load `AGENT_COURSE_CONFIG` (or `path` when given) and apply environment overrides.
    pub fn from_env_or_file(path: Option<&Path>) -> Result<Self> {
        let from_env_path = env::var("AGENT_COURSE_CONFIG").ok();
        let path = path.map(Path::to_path_buf).or_else(|| from_env_path.map(PathBuf::from));
        let mut cfg = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        cfg.apply_env();
        Ok(cfg)
    }

    fn apply_env(&mut self) {
        if let Ok(key) = env::var("GROQ_API_KEY") {
            self.model.api_key = Some(key);
        }
        if let Ok(model) = env::var("AGENT_COURSE_MODEL") {
            self.model.id = model;
        }
        if let Ok(max_tokens) = env::var("AGENT_COURSE_MAX_TOKENS") {
            if let Ok(parsed) = max_tokens.parse::<u32>() {
                self.model.max_tokens = Some(parsed);
            }
        }
        if let Ok(base_url) = env::var("GROQ_BASE_URL") {
            self.model.base_url = base_url;
        }
        if let Some(key) = env::var("HUGGINGFACE_API_KEY")
            .ok()
            .or_else(|| env::var("HF_TOKEN").ok())
        {
            self.embedder.api_key = Some(key);
        }
        if let Ok(url) = env::var("DATABASE_URL") {
            self.database.url = url;
        }
    }

    /// The LLM key is the one credential every exercise needs.
    pub fn require_model_key(&self) -> Result<&str> {
        self.model
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| AgentError::Config("GROQ_API_KEY not found in environment".into()))
    }

    pub fn require_embedder_key(&self) -> Result<&str> {
        self.embedder
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                AgentError::Config("HUGGINGFACE_API_KEY (or HF_TOKEN) not found in environment".into())
            })
    }
}
