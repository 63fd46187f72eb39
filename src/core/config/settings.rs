//! Typed application settings.
//!
//! Loaded from `config.toml` (user data dir first, project root second,
//! `DOCUCHAT_CONFIG_PATH` overrides both). A missing file means defaults;
//! an unreadable or malformed file is logged and also falls back to
//! defaults so a bad config never prevents startup.

use std::env;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::paths::AppPaths;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub provider: ProviderSettings,
    pub chunking: ChunkingSettings,
    pub retrieval: RetrievalSettings,
    pub generation: GenerationSettings,
    pub cancellation: CancellationSettings,
    pub index_scope: IndexScope,
}

/// OpenAI-compatible endpoint the app talks to for both chat completions
/// and embeddings. The key is read from the named environment variable,
/// never from the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub base_url: String,
    pub api_key_env: String,
    pub chat_model: String,
    pub embedding_model: String,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.deepseek.com".to_string(),
            api_key_env: "DEEPSEEK_API_KEY".to_string(),
            chat_model: "deepseek-chat".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
        }
    }
}

/// Sliding-window chunking parameters. 512/64 is the shipped default;
/// 1024/128 is the documented wide preset for long-form documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    pub max_size: usize,
    pub overlap: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            max_size: 512,
            overlap: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k: usize,
    /// Chunks scoring below this are excluded. `None` disables the cutoff.
    pub score_threshold: Option<f32>,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: 5,
            score_threshold: Some(0.7),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: i32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            max_tokens: 2048,
        }
    }
}

/// The stop flag is polled `checkpoints` times, `poll_interval_ms` apart,
/// before any model call is issued.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CancellationSettings {
    pub checkpoints: u32,
    pub poll_interval_ms: u64,
}

impl Default for CancellationSettings {
    fn default() -> Self {
        Self {
            checkpoints: 3,
            poll_interval_ms: 1000,
        }
    }
}

/// Whether all sessions share one vector store or each session owns its
/// own. Both deployments exist in the wild; this is a config choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexScope {
    #[default]
    Global,
    PerSession,
}

impl Settings {
    pub fn load(paths: &AppPaths) -> Self {
        let Some(path) = resolve_config_path(paths) else {
            return Self::default();
        };

        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) => {
                tracing::warn!("Failed to read {}: {}; using defaults", path.display(), err);
                return Self::default();
            }
        };

        match toml::from_str(&contents) {
            Ok(settings) => settings,
            Err(err) => {
                tracing::warn!("Invalid config {}: {}; using defaults", path.display(), err);
                Self::default()
            }
        }
    }
}

fn resolve_config_path(paths: &AppPaths) -> Option<PathBuf> {
    if let Ok(path) = env::var("DOCUCHAT_CONFIG_PATH") {
        return Some(PathBuf::from(path));
    }

    let user_config = paths.user_data_dir.join("config.toml");
    if user_config.exists() {
        return Some(user_config);
    }

    let project_config = paths.project_root.join("config.toml");
    if project_config.exists() {
        return Some(project_config);
    }

    None
}
