//! Model registry: named LLM binaries and embedding models with on-disk locations
//!
//! The registry resolves the model names used in sweep and generator settings
//! to loadable resources. Resolution distinguishes "not registered" from
//! "registered but absent on disk" so the batch runner can skip a
//! configuration with a precise reason instead of aborting the sweep.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Model '{name}' not found in the registry")]
    ModelNotFound { name: String },

    #[error("Model '{name}' is registered but missing on disk: {path}")]
    ModelNotReady { name: String, path: PathBuf },
}

/// Declared models, embedded in the main configuration under `[registry]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRegistry {
    #[serde(default)]
    pub llms: Vec<LlmEntry>,
    #[serde(default)]
    pub embedding_models: Vec<EmbeddingEntry>,
}

/// A locally managed LLM binary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmEntry {
    pub name: String,
    pub filename: String,
    pub local_dir: PathBuf,
}

/// A locally managed embedding model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingEntry {
    pub name: String,
    /// Builtin model this entry maps onto; defaults to `name`
    #[serde(default)]
    pub fastembed_id: Option<String>,
    /// When set, the directory must exist and be non-empty for the model to
    /// count as ready
    #[serde(default)]
    pub local_dir: Option<PathBuf>,
}

impl EmbeddingEntry {
    pub fn model_id(&self) -> &str {
        self.fastembed_id.as_deref().unwrap_or(&self.name)
    }
}

/// Verification outcome for one registered model
#[derive(Debug, Clone)]
pub struct VerifyEntry {
    pub name: String,
    pub path: PathBuf,
    pub status: VerifyStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VerifyStatus {
    Present,
    /// Multi-part model; the runtime assembles shards at load time
    Sharded(Vec<PathBuf>),
    Missing,
}

impl ModelRegistry {
    /// Resolve a registered LLM to its binary path.
    ///
    /// A missing exact file with shard siblings named
    /// `{stem}-*-of-*.{ext}` resolves to the first shard.
    pub fn llm_path(&self, name: &str) -> Result<PathBuf, RegistryError> {
        let entry = self
            .llms
            .iter()
            .find(|m| m.name == name)
            .ok_or_else(|| RegistryError::ModelNotFound {
                name: name.to_string(),
            })?;

        let path = entry.local_dir.join(&entry.filename);
        if path.exists() {
            return Ok(path);
        }

        let shards = find_shards(&entry.local_dir, &entry.filename);
        if let Some(first) = shards.into_iter().next() {
            return Ok(first);
        }

        Err(RegistryError::ModelNotReady {
            name: name.to_string(),
            path,
        })
    }

    /// Look up an embedding model entry, checking that a declared local
    /// directory is materialized.
    pub fn embedding_entry(&self, name: &str) -> Result<&EmbeddingEntry, RegistryError> {
        let entry = self
            .embedding_models
            .iter()
            .find(|m| m.name == name)
            .ok_or_else(|| RegistryError::ModelNotFound {
                name: name.to_string(),
            })?;

        if let Some(dir) = &entry.local_dir {
            if !dir_populated(dir) {
                return Err(RegistryError::ModelNotReady {
                    name: name.to_string(),
                    path: dir.clone(),
                });
            }
        }

        Ok(entry)
    }

    /// Check every declared model and report what is present, sharded, or
    /// missing.
    pub fn verify(&self) -> Vec<VerifyEntry> {
        let mut entries = Vec::new();

        for llm in &self.llms {
            let path = llm.local_dir.join(&llm.filename);
            let status = if path.exists() {
                VerifyStatus::Present
            } else {
                let shards = find_shards(&llm.local_dir, &llm.filename);
                if shards.is_empty() {
                    VerifyStatus::Missing
                } else {
                    VerifyStatus::Sharded(shards)
                }
            };
            entries.push(VerifyEntry {
                name: llm.name.clone(),
                path,
                status,
            });
        }

        for model in &self.embedding_models {
            match &model.local_dir {
                Some(dir) => {
                    let status = if dir_populated(dir) {
                        VerifyStatus::Present
                    } else {
                        VerifyStatus::Missing
                    };
                    entries.push(VerifyEntry {
                        name: model.name.clone(),
                        path: dir.clone(),
                        status,
                    });
                }
                // Builtin models download on first use; nothing to check
                None => entries.push(VerifyEntry {
                    name: model.name.clone(),
                    path: PathBuf::new(),
                    status: VerifyStatus::Present,
                }),
            }
        }

        entries
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self {
            llms: vec![LlmEntry {
                name: "phi-3-mini".to_string(),
                filename: "Phi-3-mini-4k-instruct-q4.gguf".to_string(),
                local_dir: PathBuf::from("models"),
            }],
            embedding_models: vec![EmbeddingEntry {
                name: "all-MiniLM-L6-v2".to_string(),
                fastembed_id: None,
                local_dir: None,
            }],
        }
    }
}

/// Sorted shard paths matching `{stem}-*-of-*.{ext}` for the given filename
fn find_shards(dir: &Path, filename: &str) -> Vec<PathBuf> {
    let path = Path::new(filename);
    let stem = match path.file_stem().and_then(|s| s.to_str()) {
        Some(s) => s,
        None => return Vec::new(),
    };
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    let prefix = format!("{}-", stem);
    let suffix = if ext.is_empty() {
        String::new()
    } else {
        format!(".{}", ext)
    };

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut shards: Vec<PathBuf> = entries
        .flatten()
        .filter(|entry| {
            let name = entry.file_name();
            let name = match name.to_str() {
                Some(n) => n,
                None => return false,
            };
            name.starts_with(&prefix)
                && name.ends_with(&suffix)
                && name[prefix.len()..name.len() - suffix.len()].contains("-of-")
        })
        .map(|entry| entry.path())
        .collect();

    shards.sort();
    shards
}

fn dir_populated(dir: &Path) -> bool {
    match std::fs::read_dir(dir) {
        Ok(mut entries) => entries.next().is_some(),
        Err(_) => false,
    }
}
