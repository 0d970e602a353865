//! Token- or character-bounded document chunking
//!
//! Chunk sizes are measured in model-vocabulary tokens when a tokenizer is
//! configured, raw characters otherwise. Every chunk carries its parent
//! document's stable ID, looked up through the same identity-key function
//! the ID assigner uses.

use crate::corpus::{doc_key, Document};
use ahash::HashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use text_splitter::{ChunkConfig, ChunkSizer, TextSplitter};
use thiserror::Error;
use tokenizers::Tokenizer;

#[derive(Error, Debug)]
pub enum ChunkError {
    #[error("Invalid chunk configuration: {0}")]
    InvalidConfig(String),

    #[error("Tokenizer load failed for {path}: {message}")]
    TokenizerLoad { path: PathBuf, message: String },

    #[error("Chunk parent key '{key}' is not in the document ID map")]
    UnmappedParent { key: String },
}

/// A bounded sub-span of one document's text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    /// Stable ID of the parent document; shared by all chunks of that
    /// document regardless of chunking parameters
    pub chunk_id: String,
}

/// Sizer counting tokenizer vocabulary tokens, or characters when no
/// tokenizer is available
struct PassageSizer<'a> {
    tokenizer: Option<&'a Tokenizer>,
}

impl ChunkSizer for PassageSizer<'_> {
    fn size(&self, chunk: &str) -> usize {
        match self.tokenizer {
            Some(tokenizer) => tokenizer
                .encode(chunk, false)
                .map(|encoding| encoding.len())
                .unwrap_or(0),
            None => chunk.chars().count(),
        }
    }
}

/// Splits documents under sweep-controlled bounds, propagating stable IDs
pub struct Chunker {
    tokenizer: Option<Tokenizer>,
}

impl Chunker {
    /// Character-based chunker
    pub fn character() -> Self {
        Self { tokenizer: None }
    }

    /// Token-based chunker backed by a tokenizer.json file
    pub fn from_tokenizer_file(path: &Path) -> Result<Self, ChunkError> {
        let tokenizer = Tokenizer::from_file(path).map_err(|e| ChunkError::TokenizerLoad {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(Self {
            tokenizer: Some(tokenizer),
        })
    }

    /// Build from the configured tokenizer path, falling back to character
    /// counting when it is absent or fails to load
    pub fn from_config(tokenizer_json: Option<&Path>) -> Self {
        match tokenizer_json {
            Some(path) => match Self::from_tokenizer_file(path) {
                Ok(chunker) => chunker,
                Err(e) => {
                    tracing::warn!("{}; falling back to character-based chunk sizing", e);
                    Self::character()
                }
            },
            None => Self::character(),
        }
    }

    pub fn uses_tokenizer(&self) -> bool {
        self.tokenizer.is_some()
    }

    /// Tokenizer backing this chunker, if any; shared with context packing
    /// so chunk bounds and prompt budgets count tokens the same way
    pub fn tokenizer(&self) -> Option<&Tokenizer> {
        self.tokenizer.as_ref()
    }

    /// Split every document, attaching the parent's stable ID to each chunk.
    ///
    /// A parent key absent from `key_to_id` is a consistency violation: the
    /// map was built from a different corpus than the one being chunked.
    pub fn chunk(
        &self,
        documents: &[Document],
        chunk_size: usize,
        chunk_overlap: usize,
        key_to_id: &HashMap<String, String>,
    ) -> Result<Vec<Chunk>, ChunkError> {
        let sizer = PassageSizer {
            tokenizer: self.tokenizer.as_ref(),
        };
        let config = ChunkConfig::new(chunk_size)
            .with_sizer(sizer)
            .with_trim(true)
            .with_overlap(chunk_overlap)
            .map_err(|e| ChunkError::InvalidConfig(e.to_string()))?;
        let splitter = TextSplitter::new(config);

        let mut chunks = Vec::new();
        for document in documents {
            let key = doc_key(&document.metadata);
            let chunk_id = key_to_id
                .get(&key)
                .ok_or_else(|| ChunkError::UnmappedParent { key: key.clone() })?;

            for piece in splitter.chunks(&document.text) {
                chunks.push(Chunk {
                    text: piece.to_string(),
                    chunk_id: chunk_id.clone(),
                });
            }
        }

        tracing::info!(
            "Created {} chunks (chunk_size={}, overlap={})",
            chunks.len(),
            chunk_size,
            chunk_overlap
        );
        Ok(chunks)
    }
}
