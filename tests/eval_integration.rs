//! End-to-end sweep tests over a miniature corpus
//!
//! Model adapters are replaced with deterministic stubs through the runner's
//! builder seams, so these tests exercise the full orchestration path
//! (chunking, indexing, retrieval, judging, persistence) without any model
//! files or servers.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use ragmark::config::{Config, EmbeddingSpec};
use ragmark::embedding::{EmbeddingError, EmbeddingProvider, EmbeddingResolver};
use ragmark::error::RagmarkError;
use ragmark::eval::{BatchRunner, RunRecord};
use ragmark::judge::Judge;
use ragmark::llm::{Generator, LlmError};

/// Deterministic embedder keyed on marker words
struct MarkerEmbedder;

impl EmbeddingProvider for MarkerEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let lower = text.to_lowercase();
        let mut vector = vec![0.0f32, 0.0, 0.1];
        if lower.contains("vpn") {
            vector[0] = 1.0;
        }
        if lower.contains("storage") {
            vector[1] = 1.0;
        }
        Ok(vector)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|text| self.embed(text)).collect()
    }

    fn dimension(&self) -> usize {
        3
    }

    fn model_name(&self) -> &str {
        "marker-embedder"
    }
}

/// Resolver stub counting every call, optionally failing one model name
struct CountingResolver {
    calls: Arc<AtomicUsize>,
    fail_name: Option<String>,
}

impl EmbeddingResolver for CountingResolver {
    fn resolve(&self, spec: &EmbeddingSpec) -> ragmark::Result<Arc<dyn EmbeddingProvider>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_name.as_deref() == Some(spec.name.as_str()) {
            return Err(RagmarkError::Config(format!(
                "Model '{}' is not available",
                spec.name
            )));
        }
        Ok(Arc::new(MarkerEmbedder))
    }
}

/// Generator stub returning a fixed response and counting invocations
struct CannedGenerator {
    calls: Arc<AtomicUsize>,
    response: String,
}

#[async_trait]
impl Generator for CannedGenerator {
    async fn complete(&self, _prompt: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.response.clone())
    }

    fn model_name(&self) -> &str {
        "canned"
    }
}

/// Write a two-document corpus plus matching evaluation data and point a
/// default config at it
fn fixture_config(root: &Path) -> Config {
    let guide_dir = root.join("docs/user_guide");
    std::fs::create_dir_all(&guide_dir).unwrap();
    std::fs::write(
        guide_dir.join("storage.md"),
        "# Storage Quota\n\nEach project receives a storage quota on the cluster filesystem.",
    )
    .unwrap();
    std::fs::write(
        guide_dir.join("vpn.md"),
        "# VPN Access\n\nInstall the campus VPN client and sign in with your university account.",
    )
    .unwrap();

    let eval_dir = root.join("eval");
    std::fs::create_dir_all(&eval_dir).unwrap();
    std::fs::write(
        eval_dir.join("queries.jsonl"),
        concat!(
            r#"{"id": "q1", "text": "How do I connect to the vpn?"}"#,
            "\n",
            r#"{"id": "q2", "text": "How much storage does a project get?"}"#,
            "\n"
        ),
    )
    .unwrap();
    std::fs::write(
        eval_dir.join("answers.jsonl"),
        concat!(
            r#"{"id": "q1", "text": "Install the campus VPN client."}"#,
            "\n",
            r#"{"id": "q2", "text": "Each project receives a storage quota."}"#,
            "\n"
        ),
    )
    .unwrap();
    // Markdown IDs are assigned in path order: storage.md first
    std::fs::write(eval_dir.join("qrels.txt"), "q1 0 doc2 1\nq2 0 doc1 1\n").unwrap();

    let mut config = Config::default();
    config.dataset.queries_path = eval_dir.join("queries.jsonl");
    config.dataset.answers_path = eval_dir.join("answers.jsonl");
    config.dataset.qrels_path = eval_dir.join("qrels.txt");
    config.dataset.document_source.markdown_dir = guide_dir;
    config.dataset.document_source.tickets_jsonl = None;
    config.sweeps.embedding_models = vec![EmbeddingSpec {
        name: "stub-model".to_string(),
        source: "fastembed".to_string(),
    }];
    config.sweeps.chunk_size = vec![256];
    config.sweeps.chunk_overlap = vec![0];
    config.sweeps.top_k = vec![2];
    config.experiment.output_dir = root.join("results");
    config
}

fn stub_runner(
    config: Config,
    resolver_calls: Arc<AtomicUsize>,
    generator_calls: Arc<AtomicUsize>,
    fail_name: Option<String>,
) -> BatchRunner {
    let answer_generator = Arc::new(CannedGenerator {
        calls: generator_calls,
        response: "Install the campus VPN client.".to_string(),
    });
    let verdict_generator = Arc::new(CannedGenerator {
        calls: Arc::new(AtomicUsize::new(0)),
        response: r#"{"score": 4, "justification": "Matches the ground truth."}"#.to_string(),
    });
    let judge = Judge::new(verdict_generator, None).unwrap();

    BatchRunner::new(config)
        .unwrap()
        .with_resolver(Box::new(CountingResolver {
            calls: resolver_calls,
            fail_name,
        }))
        .with_generator(answer_generator)
        .with_judge(Arc::new(judge))
}

#[tokio::test]
async fn test_sweep_writes_expected_tree() {
    let temp = TempDir::new().unwrap();
    let config = fixture_config(temp.path());
    let output_dir = config.experiment.output_dir.clone();

    let resolver_calls = Arc::new(AtomicUsize::new(0));
    let generator_calls = Arc::new(AtomicUsize::new(0));
    let mut runner = stub_runner(
        config,
        resolver_calls.clone(),
        generator_calls.clone(),
        None,
    );

    let summary = runner.run().await.unwrap();

    let expected_id = "stub-model_cs256_co0_k2";
    assert_eq!(summary.total_runs, 1);
    assert_eq!(summary.best_run_id.as_deref(), Some(expected_id));

    let record = &summary.runs[0];
    assert!(record.is_completed());
    let metrics = record.metrics().unwrap();
    assert_eq!(metrics.recall, 1.0);
    assert_eq!(metrics.ndcg, 1.0);
    assert_eq!(metrics.faithfulness, 1.0);
    assert_eq!(metrics.hallucination_rate, 0.0);
    assert_eq!(metrics.mean_judge_score, 4.0);

    // Output layout: doc ID map, metrics stream, per-run directory, summary
    assert!(output_dir.join("doc_id_map.json").exists());
    assert!(output_dir.join("summary.json").exists());

    let stream = std::fs::read_to_string(output_dir.join("per_run_metrics.jsonl")).unwrap();
    let lines: Vec<&str> = stream.lines().collect();
    assert_eq!(lines.len(), 1);
    let streamed: RunRecord = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(streamed.run_id(), expected_id);

    let run_dir = output_dir.join("runs").join(expected_id);
    assert!(run_dir.join("metrics.json").exists());

    let responses = std::fs::read_to_string(run_dir.join("responses.jsonl")).unwrap();
    let response_lines: Vec<&str> = responses.lines().collect();
    assert_eq!(response_lines.len(), 2);
    let first: serde_json::Value = serde_json::from_str(response_lines[0]).unwrap();
    assert_eq!(first["query_id"], "q1");
    assert_eq!(first["judge_score"], 4);
    assert_eq!(first["retrieved_doc_ids"][0], "doc2");
    assert_eq!(first["ground_truth"], "Install the campus VPN client.");

    let map: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(output_dir.join("doc_id_map.json")).unwrap())
            .unwrap();
    assert_eq!(map[0]["doc_id"], "doc1");
    assert!(map[0]["source"].as_str().unwrap().ends_with("storage.md"));
    assert_eq!(map[0]["type"], "markdown");

    assert_eq!(resolver_calls.load(Ordering::SeqCst), 1);
    // One completion per query
    assert_eq!(generator_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_failed_model_resolution_skips_run() {
    let temp = TempDir::new().unwrap();
    let mut config = fixture_config(temp.path());
    config.sweeps.embedding_models = vec![
        EmbeddingSpec {
            name: "stub-model".to_string(),
            source: "fastembed".to_string(),
        },
        EmbeddingSpec {
            name: "broken-model".to_string(),
            source: "fastembed".to_string(),
        },
    ];
    let output_dir = config.experiment.output_dir.clone();

    let mut runner = stub_runner(
        config,
        Arc::new(AtomicUsize::new(0)),
        Arc::new(AtomicUsize::new(0)),
        Some("broken-model".to_string()),
    );
    let summary = runner.run().await.unwrap();

    assert_eq!(summary.total_runs, 2);
    assert_eq!(summary.best_run_id.as_deref(), Some("stub-model_cs256_co0_k2"));

    let skipped: Vec<&RunRecord> = summary
        .runs
        .iter()
        .filter(|record| !record.is_completed())
        .collect();
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].run_id(), "broken-model_cs256_co0_k2");

    // Skipped runs never persist a run directory
    assert!(!output_dir
        .join("runs")
        .join("broken-model_cs256_co0_k2")
        .exists());

    // But their outcome still lands in the metrics stream
    let stream = std::fs::read_to_string(output_dir.join("per_run_metrics.jsonl")).unwrap();
    assert_eq!(stream.lines().count(), 2);
    assert!(stream.contains(r#""status":"skipped""#));
}

#[tokio::test]
async fn test_resume_skips_completed_runs() {
    let temp = TempDir::new().unwrap();
    let config = fixture_config(temp.path());
    let output_dir = config.experiment.output_dir.clone();

    let mut runner = stub_runner(
        config.clone(),
        Arc::new(AtomicUsize::new(0)),
        Arc::new(AtomicUsize::new(0)),
        None,
    );
    let first = runner.run().await.unwrap();

    // Second pass over the same output directory must reuse cached results
    // without touching any adapter
    let mut resumed_config = config;
    resumed_config.runtime.resume = true;
    let resolver_calls = Arc::new(AtomicUsize::new(0));
    let generator_calls = Arc::new(AtomicUsize::new(0));
    let mut resumed = stub_runner(
        resumed_config,
        resolver_calls.clone(),
        generator_calls.clone(),
        None,
    );
    let second = resumed.run().await.unwrap();

    assert_eq!(second.total_runs, first.total_runs);
    assert_eq!(second.best_run_id, first.best_run_id);
    assert_eq!(resolver_calls.load(Ordering::SeqCst), 0);
    assert_eq!(generator_calls.load(Ordering::SeqCst), 0);

    // Resumed records are still written to the fresh metrics stream
    let stream = std::fs::read_to_string(output_dir.join("per_run_metrics.jsonl")).unwrap();
    assert_eq!(stream.lines().count(), 1);
    assert!(stream.contains(r#""status":"completed""#));
}

#[test]
fn test_max_queries_limits_eval_set() {
    let temp = TempDir::new().unwrap();
    let mut config = fixture_config(temp.path());
    config.runtime.max_queries = Some(1);

    let runner = BatchRunner::new(config).unwrap();
    assert_eq!(runner.queries().len(), 1);
}
