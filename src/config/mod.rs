//! Configuration management for ragmark
//!
//! One TOML file drives the whole harness: dataset locations, the sweep
//! grid, frozen generator/judge settings, experiment output layout, runtime
//! toggles, and the model registry.

use crate::error::{RagmarkError, Result};
use crate::registry::ModelRegistry;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta", default)]
    pub meta: MetaConfig,
    pub dataset: DatasetConfig,
    pub sweeps: SweepConfig,
    pub frozen: FrozenConfig,
    pub judge: JudgeConfig,
    pub experiment: ExperimentConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub registry: ModelRegistry,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

impl Default for MetaConfig {
    fn default() -> Self {
        Self {
            schema_version: "1.0.0".to_string(),
            created_at: current_timestamp(),
            last_modified: current_timestamp(),
        }
    }
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Evaluation dataset locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub queries_path: PathBuf,
    pub answers_path: PathBuf,
    pub qrels_path: PathBuf,
    pub document_source: DocumentSourceConfig,
}

/// Document sources feeding the corpus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSourceConfig {
    /// Root of the markdown documentation tree
    pub markdown_dir: PathBuf,
    /// Optional prepared ticket export (one {text, metadata} object per line)
    #[serde(default)]
    pub tickets_jsonl: Option<PathBuf>,
    /// Optional tokenizer.json used for token-based chunk sizing; character
    /// counts are used when absent
    #[serde(default)]
    pub tokenizer_json: Option<PathBuf>,
}

/// Sweep grid: the cross product of these lists is evaluated
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    pub embedding_models: Vec<EmbeddingSpec>,
    pub chunk_size: Vec<usize>,
    pub chunk_overlap: Vec<usize>,
    pub top_k: Vec<usize>,
}

/// One embedding model entry in the sweep
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingSpec {
    pub name: String,
    /// "registry" resolves through the model registry; "fastembed" maps the
    /// name directly onto a builtin model
    #[serde(default = "default_embedding_source")]
    pub source: String,
}

fn default_embedding_source() -> String {
    "registry".to_string()
}

/// Settings held fixed across the sweep
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrozenConfig {
    pub generator: GeneratorSettings,
    pub metrics: MetricsConfig,
}

/// Metric computation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub retrieval_k: usize,
}

/// LLM settings for the answer generator (and, with fixed decoding
/// parameters, the judge)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorSettings {
    /// "llama-server" or "openai-compatible"
    pub provider: String,
    /// Registry name for local models, remote model id otherwise
    pub llm_name: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Environment variable holding the API key for remote providers
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: usize,
    #[serde(default = "default_n_ctx")]
    pub n_ctx: usize,
    #[serde(default = "default_n_ctx_margin")]
    pub n_ctx_margin: usize,
    #[serde(default = "default_n_batch")]
    pub n_batch: usize,
    /// Prompt wrapping applied client-side ("phi-3", "llama-3")
    #[serde(default)]
    pub chat_format: Option<String>,
}

fn default_base_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_max_new_tokens() -> usize {
    256
}

fn default_n_ctx() -> usize {
    4096
}

fn default_n_ctx_margin() -> usize {
    768
}

fn default_n_batch() -> usize {
    512
}

/// LLM-as-judge settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeConfig {
    pub provider: String,
    pub llm_name: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_n_ctx")]
    pub n_ctx: usize,
    #[serde(default = "default_n_batch")]
    pub n_batch: usize,
    #[serde(default)]
    pub chat_format: Option<String>,
    /// Judge score at or above this counts as faithful
    #[serde(default = "default_faithfulness_threshold")]
    pub faithfulness_threshold: i64,
    /// Judge score at or below this counts as hallucinated
    #[serde(default = "default_hallucination_threshold")]
    pub hallucination_threshold: i64,
    /// Override for the built-in judge prompt template
    #[serde(default)]
    pub prompt: Option<String>,
}

fn default_faithfulness_threshold() -> i64 {
    4
}

fn default_hallucination_threshold() -> i64 {
    2
}

impl JudgeConfig {
    /// Generator settings for the judge model. Decoding is pinned to
    /// temperature 0.0 and a short completion so scores stay comparable
    /// across runs.
    pub fn generator_settings(&self) -> GeneratorSettings {
        GeneratorSettings {
            provider: self.provider.clone(),
            llm_name: self.llm_name.clone(),
            base_url: self.base_url.clone(),
            api_key_env: self.api_key_env.clone(),
            temperature: 0.0,
            max_new_tokens: 256,
            n_ctx: self.n_ctx,
            n_ctx_margin: default_n_ctx_margin(),
            n_batch: self.n_batch,
            chat_format: self.chat_format.clone(),
        }
    }
}

/// Experiment output layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub output_dir: PathBuf,
    #[serde(default = "default_per_run_metrics_file")]
    pub per_run_metrics_file: String,
    #[serde(default = "default_summary_file")]
    pub summary_file: String,
    #[serde(default = "default_detailed_results_dir")]
    pub detailed_results_dir: String,
}

fn default_per_run_metrics_file() -> String {
    "per_run_metrics.jsonl".to_string()
}

fn default_summary_file() -> String {
    "summary.json".to_string()
}

fn default_detailed_results_dir() -> String {
    "runs".to_string()
}

/// Runtime toggles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Cap on evaluated queries; absent or 0 means all
    #[serde(default)]
    pub max_queries: Option<usize>,
    #[serde(default = "default_persist_responses")]
    pub persist_responses: bool,
    #[serde(default)]
    pub resume: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_queries: None,
            persist_responses: true,
            resume: false,
        }
    }
}

fn default_persist_responses() -> bool {
    true
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RagmarkError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| RagmarkError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        // Apply environment variable overrides
        config.apply_env_overrides();

        // Validate configuration
        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| RagmarkError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: RAGMARK_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("RAGMARK_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "RUNTIME__RESUME" => {
                self.runtime.resume =
                    value
                        .parse()
                        .map_err(|_| RagmarkError::InvalidConfigValue {
                            path: path.to_string(),
                            message: format!("Cannot parse '{}' as boolean", value),
                        })?;
            }
            "RUNTIME__MAX_QUERIES" => {
                let parsed = value
                    .parse()
                    .map_err(|_| RagmarkError::InvalidConfigValue {
                        path: path.to_string(),
                        message: format!("Cannot parse '{}' as integer", value),
                    })?;
                self.runtime.max_queries = Some(parsed);
            }
            "GENERATOR__BASE_URL" => {
                self.frozen.generator.base_url = value.to_string();
            }
            "JUDGE__BASE_URL" => {
                self.judge.base_url = value.to_string();
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| RagmarkError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("ragmark").join("config.toml"))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta: MetaConfig::default(),
            dataset: DatasetConfig {
                queries_path: PathBuf::from("eval/queries.jsonl"),
                answers_path: PathBuf::from("eval/answers.jsonl"),
                qrels_path: PathBuf::from("eval/qrels.txt"),
                document_source: DocumentSourceConfig {
                    markdown_dir: PathBuf::from("docs/user_guide"),
                    tickets_jsonl: Some(PathBuf::from("docs/tickets/task_prepared.jsonl")),
                    tokenizer_json: None,
                },
            },
            sweeps: SweepConfig {
                embedding_models: vec![EmbeddingSpec {
                    name: "all-MiniLM-L6-v2".to_string(),
                    source: "fastembed".to_string(),
                }],
                chunk_size: vec![256, 512],
                chunk_overlap: vec![0, 64],
                top_k: vec![5, 10],
            },
            frozen: FrozenConfig {
                generator: GeneratorSettings {
                    provider: "llama-server".to_string(),
                    llm_name: "phi-3-mini".to_string(),
                    base_url: default_base_url(),
                    api_key_env: None,
                    temperature: 0.0,
                    max_new_tokens: default_max_new_tokens(),
                    n_ctx: default_n_ctx(),
                    n_ctx_margin: default_n_ctx_margin(),
                    n_batch: default_n_batch(),
                    chat_format: Some("phi-3".to_string()),
                },
                metrics: MetricsConfig { retrieval_k: 10 },
            },
            judge: JudgeConfig {
                provider: "llama-server".to_string(),
                llm_name: "phi-3-mini".to_string(),
                base_url: default_base_url(),
                api_key_env: None,
                n_ctx: default_n_ctx(),
                n_batch: default_n_batch(),
                chat_format: Some("phi-3".to_string()),
                faithfulness_threshold: default_faithfulness_threshold(),
                hallucination_threshold: default_hallucination_threshold(),
                prompt: None,
            },
            experiment: ExperimentConfig {
                output_dir: PathBuf::from("results/embedding_bakeoff"),
                per_run_metrics_file: default_per_run_metrics_file(),
                summary_file: default_summary_file(),
                detailed_results_dir: default_detailed_results_dir(),
            },
            runtime: RuntimeConfig::default(),
            registry: ModelRegistry::default(),
        }
    }
}
