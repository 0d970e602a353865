//! Stable document-ID assignment
//!
//! Relevance judgments reference `doc<N>` IDs directly, so the mapping from
//! a document to its ID must not depend on chunking parameters. IDs are
//! assigned once from the full corpus in a fixed sort order and every
//! chunking pass reuses the resulting map.

use super::Document;
use ahash::{HashMap, HashMapExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sentinel identity for documents with no derivable key.
///
/// All such documents collapse onto a single ID. Qrels files may be
/// authored against that behavior, so it is kept rather than fixed.
pub const UNKNOWN_KEY: &str = "__unknown__";

/// Marker locating the machine-independent part of a markdown path
const ROOT_MARKER: &str = "/docs/";

/// One persisted row of doc_id_map.json
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocIdRecord {
    pub doc_id: String,
    pub source: String,
    #[serde(rename = "type")]
    pub doc_type: String,
}

/// Identity key for a document: source path first, then explicit record
/// IDs, then the sentinel. Empty values are skipped.
pub fn doc_key(metadata: &BTreeMap<String, String>) -> String {
    ["source", "id", "document_id", "sys_id"]
        .iter()
        .find_map(|k| metadata.get(*k).filter(|v| !v.is_empty()))
        .cloned()
        .unwrap_or_else(|| UNKNOWN_KEY.to_string())
}

/// Path relative to the root marker, so sorting is stable across machines
fn rel_source_path(path: &str) -> &str {
    match path.find(ROOT_MARKER) {
        Some(idx) => &path[idx + ROOT_MARKER.len()..],
        None => path,
    }
}

fn source_of(metadata: &BTreeMap<String, String>) -> &str {
    metadata.get("source").map(String::as_str).unwrap_or("")
}

/// Best-effort sort key for non-markdown documents
fn other_sort_key(key: &str, metadata: &BTreeMap<String, String>) -> String {
    ["id", "document_id", "sys_id"]
        .iter()
        .find_map(|k| metadata.get(*k).filter(|v| !v.is_empty()).cloned())
        .or_else(|| {
            let rel = rel_source_path(source_of(metadata));
            if rel.is_empty() {
                None
            } else {
                Some(rel.to_string())
            }
        })
        .unwrap_or_else(|| key.to_string())
}

/// Create a stable mapping from source documents to `doc<N>` IDs.
///
/// Markdown documents (source ending in `.md`) are numbered first, sorted
/// by root-relative path; all other documents follow in best-effort key
/// order. Duplicate identity keys keep their first assignment. Returns the
/// `key -> doc ID` map plus ordered records for persistence.
pub fn build_doc_id_map(documents: &[Document]) -> (HashMap<String, String>, Vec<DocIdRecord>) {
    let mut markdown: Vec<(String, &BTreeMap<String, String>)> = Vec::new();
    let mut others: Vec<(String, &BTreeMap<String, String>)> = Vec::new();

    for doc in documents {
        let key = doc_key(&doc.metadata);
        if source_of(&doc.metadata).ends_with(".md") {
            markdown.push((key, &doc.metadata));
        } else {
            others.push((key, &doc.metadata));
        }
    }

    markdown.sort_by(|a, b| rel_source_path(source_of(a.1)).cmp(rel_source_path(source_of(b.1))));
    others.sort_by_key(|(key, metadata)| other_sort_key(key, metadata));

    let mut mapping = HashMap::new();
    let mut records = Vec::new();
    let mut counter = 1usize;

    for (key, metadata) in markdown.into_iter().chain(others) {
        if mapping.contains_key(&key) {
            continue;
        }
        let doc_id = format!("doc{}", counter);
        mapping.insert(key, doc_id.clone());

        let source = ["source", "id", "document_id"]
            .iter()
            .find_map(|k| metadata.get(*k).filter(|v| !v.is_empty()).cloned())
            .unwrap_or_default();
        let doc_type = if source_of(metadata).ends_with(".md") {
            "markdown"
        } else {
            "other"
        };
        records.push(DocIdRecord {
            doc_id,
            source,
            doc_type: doc_type.to_string(),
        });
        counter += 1;
    }

    (mapping, records)
}
