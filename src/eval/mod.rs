//! Batch evaluation of the retrieval pipeline
//!
//! The sweep iterates the cross product of embedding models, chunk sizes,
//! chunk overlaps, and top-K settings; each run retrieves, generates,
//! judges, and persists structured results for later comparison.

mod report;
mod runner;

pub use report::{load_run_metrics, render_metrics_report};
pub use runner::BatchRunner;

use crate::config::EmbeddingSpec;
use crate::error::{RagmarkError, Result};
use crate::metrics::RunMetrics;
use ahash::{HashMap, HashMapExt};
use serde::{Deserialize, Serialize};
use std::io::BufRead;
use std::path::Path;

/// One evaluation question
#[derive(Debug, Clone)]
pub struct QueryExample {
    pub query_id: String,
    pub text: String,
}

/// Ground-truth answer for one query
#[derive(Debug, Clone)]
pub struct Answer {
    pub query_id: String,
    pub text: String,
}

#[derive(Debug, Deserialize)]
struct JsonlEntry {
    id: String,
    text: String,
}

fn read_jsonl_entries(path: &Path) -> Result<Vec<JsonlEntry>> {
    let file = std::fs::File::open(path).map_err(|e| RagmarkError::Io {
        source: e,
        context: format!("Failed to open dataset file: {:?}", path),
    })?;

    let reader = std::io::BufReader::new(file);
    let mut entries = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| RagmarkError::Io {
            source: e,
            context: format!("Failed to read dataset file: {:?}", path),
        })?;
        if line.trim().is_empty() {
            continue;
        }

        let entry: JsonlEntry = serde_json::from_str(&line).map_err(|e| RagmarkError::Json {
            source: e,
            context: format!("{}:{}", path.display(), index + 1),
        })?;
        entries.push(entry);
    }
    Ok(entries)
}

/// Load evaluation queries (one `{id, text}` object per line)
pub fn load_queries(path: &Path) -> Result<Vec<QueryExample>> {
    Ok(read_jsonl_entries(path)?
        .into_iter()
        .map(|entry| QueryExample {
            query_id: entry.id,
            text: entry.text,
        })
        .collect())
}

/// Load ground-truth answers keyed by query ID
pub fn load_answers(path: &Path) -> Result<HashMap<String, Answer>> {
    let mut answers = HashMap::new();
    for entry in read_jsonl_entries(path)? {
        answers.insert(
            entry.id.clone(),
            Answer {
                query_id: entry.id,
                text: entry.text,
            },
        );
    }
    Ok(answers)
}

/// Load relevance judgments from whitespace-delimited
/// `query_id _ doc_id relevance` lines; only positive relevance is kept
pub fn load_qrels(path: &Path) -> Result<HashMap<String, Vec<String>>> {
    let content = std::fs::read_to_string(path).map_err(|e| RagmarkError::Io {
        source: e,
        context: format!("Failed to read qrels file: {:?}", path),
    })?;

    let mut mapping: HashMap<String, Vec<String>> = HashMap::new();
    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 4 {
            return Err(RagmarkError::Dataset(format!(
                "Malformed qrels line {}:{}: expected 4 fields, got {}",
                path.display(),
                index + 1,
                fields.len()
            )));
        }

        let relevance: i64 = fields[3].parse().map_err(|_| {
            RagmarkError::Dataset(format!(
                "Malformed qrels line {}:{}: relevance '{}' is not an integer",
                path.display(),
                index + 1,
                fields[3]
            ))
        })?;
        if relevance <= 0 {
            continue;
        }

        mapping
            .entry(fields[0].to_string())
            .or_default()
            .push(fields[2].to_string());
    }
    Ok(mapping)
}

/// Make a model name safe for directory names
pub fn sanitize_name(name: &str) -> String {
    name.replace('/', "_").replace(' ', "-")
}

/// Canonical identifier for one sweep configuration
pub fn run_id(embedding_name: &str, chunk_size: usize, chunk_overlap: usize, top_k: usize) -> String {
    format!(
        "{}_cs{}_co{}_k{}",
        sanitize_name(embedding_name),
        chunk_size,
        chunk_overlap,
        top_k
    )
}

/// The swept parameters of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfiguration {
    pub embedding: EmbeddingSpec,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
}

/// Terminal result of one run
///
/// A run either completes with metrics or is skipped with a reason; there
/// is no third state. Skipped runs never persist a per-run directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RunRecord {
    Completed {
        run_id: String,
        configuration: RunConfiguration,
        metrics: RunMetrics,
    },
    Skipped {
        run_id: String,
        reason: String,
    },
}

impl RunRecord {
    pub fn run_id(&self) -> &str {
        match self {
            RunRecord::Completed { run_id, .. } => run_id,
            RunRecord::Skipped { run_id, .. } => run_id,
        }
    }

    pub fn metrics(&self) -> Option<&RunMetrics> {
        match self {
            RunRecord::Completed { metrics, .. } => Some(metrics),
            RunRecord::Skipped { .. } => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, RunRecord::Completed { .. })
    }
}

/// Per-query detail persisted to `responses.jsonl`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub query_id: String,
    pub question: String,
    pub answer: String,
    pub ground_truth: String,
    pub retrieved_doc_ids: Vec<String>,
    pub retrieved_context: Vec<String>,
    pub judge_score: i64,
    pub judge_justification: String,
}

/// Whole-sweep result written to `summary.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepSummary {
    pub total_runs: usize,
    /// None when no run completed
    pub best_run_id: Option<String>,
    pub runs: Vec<RunRecord>,
}
