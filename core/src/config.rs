use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory of the local object store; each bucket is a subdirectory.
    pub data_dir: String,
    pub catalog_bucket: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
            catalog_bucket: "ragraph-catalog".to_string(),
        }
    }
}

/// An OpenAI-compatible embedding service. An empty `endpoint` selects the offline
/// deterministic embedder.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key_env: Option<String>,
    pub dimensions: usize,
}

impl EmbeddingConfig {
    pub fn is_offline(&self) -> bool {
        self.endpoint.trim().is_empty()
    }

    pub fn api_key(&self) -> Option<String> {
        read_api_key(self.api_key_env.as_deref())
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            model: "embedding-default-v1".to_string(),
            api_key_env: None,
            dimensions: 1024,
        }
    }
}

/// An OpenAI-compatible chat completion service. An empty `endpoint` means no
/// generation backend is configured.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GenerationConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key_env: Option<String>,
    pub answer_max_tokens: u32,
    pub answer_temperature: f32,
    pub answer_top_p: f32,
}

impl GenerationConfig {
    pub fn is_offline(&self) -> bool {
        self.endpoint.trim().is_empty()
    }

    pub fn api_key(&self) -> Option<String> {
        read_api_key(self.api_key_env.as_deref())
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            model: "generation-default-v1".to_string(),
            api_key_env: None,
            answer_max_tokens: 500,
            answer_temperature: 0.7,
            answer_top_p: 0.8,
        }
    }
}

fn read_api_key(env_name: Option<&str>) -> Option<String> {
    env_name
        .and_then(|name| env::var(name).ok())
        .filter(|key| !key.is_empty())
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TimeoutConfig {
    pub generation_secs: u64,
    pub embedding_secs: u64,
    pub storage_secs: u64,
    pub graph_secs: u64,
}

impl TimeoutConfig {
    pub fn generation(&self) -> Duration {
        Duration::from_secs(self.generation_secs)
    }

    pub fn embedding(&self) -> Duration {
        Duration::from_secs(self.embedding_secs)
    }

    pub fn storage(&self) -> Duration {
        Duration::from_secs(self.storage_secs)
    }

    pub fn graph(&self) -> Duration {
        Duration::from_secs(self.graph_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            generation_secs: 60,
            embedding_secs: 10,
            storage_secs: 5,
            graph_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisStrategy {
    #[default]
    Model,
    Template,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SynthesisConfig {
    pub strategy: SynthesisStrategy,
    pub enforce_idempotent: bool,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            strategy: SynthesisStrategy::Model,
            enforce_idempotent: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub generation: GenerationConfig,
    pub timeouts: TimeoutConfig,
    pub synthesis: SynthesisConfig,
    pub log: LogConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Layering: `<dir>/default`, then `<dir>/<RUN_MODE>`, then `RAGRAPH__*` env vars.
    pub fn load_from(dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());
        let dir = dir.as_ref();

        let builder = Config::builder()
            .add_source(File::with_name(&dir.join("default").to_string_lossy()).required(false))
            .add_source(
                File::with_name(&dir.join(&run_mode).to_string_lossy()).required(false),
            )
            .add_source(Environment::with_prefix("RAGRAPH").separator("__"));

        builder.build()?.try_deserialize()
    }
}
