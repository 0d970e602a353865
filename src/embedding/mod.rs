/// Embedding generation and vector indexing
///
/// Architecture:
/// - EmbeddingProvider trait for abstraction over model backends
/// - FastEmbedProvider for local embedding generation
/// - HNSW for vector similarity search, rebuilt per run
/// - EmbeddingResolver for turning sweep entries into live providers
mod index;
mod provider;

pub use index::{SearchResult, VectorIndex, VectorIndexError};
pub use provider::{EmbeddingError, EmbeddingProvider, FastEmbedProvider};

use crate::config::EmbeddingSpec;
use crate::registry::ModelRegistry;
use std::sync::Arc;

/// Resolves a sweep entry to a live embedding provider
///
/// The runner treats resolution failure as a reason to skip the affected
/// runs rather than abort the sweep, so unavailable models must surface
/// through the error value, never a panic.
pub trait EmbeddingResolver: Send + Sync {
    fn resolve(&self, spec: &EmbeddingSpec) -> crate::Result<Arc<dyn EmbeddingProvider>>;
}

/// Registry-backed resolver used by the CLI
pub struct RegistryResolver {
    registry: ModelRegistry,
}

impl RegistryResolver {
    pub fn new(registry: ModelRegistry) -> Self {
        Self { registry }
    }
}

impl EmbeddingResolver for RegistryResolver {
    fn resolve(&self, spec: &EmbeddingSpec) -> crate::Result<Arc<dyn EmbeddingProvider>> {
        let provider = match spec.source.as_str() {
            "registry" => {
                let entry = self.registry.embedding_entry(&spec.name)?;
                FastEmbedProvider::new(entry.model_id())?
            }
            "fastembed" => FastEmbedProvider::new(&spec.name)?,
            other => {
                return Err(EmbeddingError::InitializationError(format!(
                    "Unknown embedding source '{}' for model '{}'",
                    other, spec.name
                ))
                .into());
            }
        };

        Ok(Arc::new(provider))
    }
}
