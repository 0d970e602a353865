use std::path::PathBuf;
use thiserror::Error;

use crate::chunking::ChunkError;
use crate::embedding::{EmbeddingError, VectorIndexError};
use crate::llm::LlmError;
use crate::registry::RegistryError;

/// Main error type for the ragmark application
#[derive(Error, Debug)]
pub enum RagmarkError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// Malformed evaluation inputs (queries, answers, qrels, corpus)
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// Model registry errors
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Chunking errors
    #[error("Chunking error: {0}")]
    Chunk(#[from] ChunkError),

    /// Embedding provider errors
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// Vector index errors
    #[error("Index error: {0}")]
    Index(#[from] VectorIndexError),

    /// LLM client errors
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for ragmark operations
pub type Result<T> = std::result::Result<T, RagmarkError>;
