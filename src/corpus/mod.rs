//! Corpus loading: markdown documentation tree + prepared ticket export
//!
//! Both sources produce the same uniform `Document` shape. Markdown files
//! carry their path as `source` metadata; ticket records carry whatever
//! metadata the preparation step attached (typically `incident_number`).

mod doc_id;

pub use doc_id::{build_doc_id_map, doc_key, DocIdRecord, UNKNOWN_KEY};

use crate::config::DocumentSourceConfig;
use crate::error::{RagmarkError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::Path;
use walkdir::WalkDir;

/// A loaded source document, immutable once constructed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub text: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Document {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Load every markdown file under the root, path recorded as `source`
pub fn load_markdown_documents(markdown_dir: &Path) -> Result<Vec<Document>> {
    if !markdown_dir.is_dir() {
        return Err(RagmarkError::Dataset(format!(
            "Markdown directory not found: {}",
            markdown_dir.display()
        )));
    }

    let mut documents = Vec::new();
    for entry in WalkDir::new(markdown_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.path().extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }

        let text = std::fs::read_to_string(entry.path()).map_err(|e| RagmarkError::Io {
            source: e,
            context: format!("Failed to read markdown file: {:?}", entry.path()),
        })?;

        let document = Document::new(text)
            .with_metadata("source", entry.path().to_string_lossy().into_owned());
        documents.push(document);
    }

    tracing::info!(
        "Loaded {} markdown documents from {}",
        documents.len(),
        markdown_dir.display()
    );
    Ok(documents)
}

/// Load prepared ticket documents (one `{text, metadata}` object per line)
pub fn load_ticket_documents(path: &Path) -> Result<Vec<Document>> {
    let file = std::fs::File::open(path).map_err(|e| RagmarkError::Io {
        source: e,
        context: format!("Failed to open ticket export: {:?}", path),
    })?;

    let reader = std::io::BufReader::new(file);
    let mut documents = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| RagmarkError::Io {
            source: e,
            context: format!("Failed to read ticket export: {:?}", path),
        })?;
        if line.trim().is_empty() {
            continue;
        }

        let document: Document = serde_json::from_str(&line).map_err(|e| RagmarkError::Json {
            source: e,
            context: format!("{}:{}", path.display(), index + 1),
        })?;
        documents.push(document);
    }

    tracing::info!(
        "Loaded {} ticket documents from {}",
        documents.len(),
        path.display()
    );
    Ok(documents)
}

/// Load the full corpus shared by evaluation and chat
pub fn load_corpus(source: &DocumentSourceConfig) -> Result<Vec<Document>> {
    let mut documents = load_markdown_documents(&source.markdown_dir)?;
    if let Some(tickets) = &source.tickets_jsonl {
        documents.extend(load_ticket_documents(tickets)?);
    }
    tracing::info!("Loaded {} source documents for evaluation", documents.len());
    Ok(documents)
}
