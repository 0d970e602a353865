//! Sweep orchestration
//!
//! Runs one retrieval+generation+judge cycle per configuration, sequentially.
//! The generator and judge are built once on first use and reused across
//! the whole sweep; the similarity index is rebuilt per configuration since
//! chunking parameters change its contents.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ahash::HashMap;
use tracing::{error, info, warn};

use crate::chunking::Chunker;
use crate::config::{Config, SweepConfig};
use crate::corpus::{build_doc_id_map, load_corpus, Document};
use crate::embedding::{EmbeddingResolver, RegistryResolver};
use crate::error::RagmarkError;
use crate::judge::Judge;
use crate::llm::{build_generator, Generator};
use crate::metrics::{aggregate_run_metrics, RunMetrics};
use crate::pipeline::{context_token_budget, RagPipeline, Retriever};

use super::{
    load_answers, load_qrels, load_queries, run_id, Answer, QueryExample, ResponseRecord,
    RunConfiguration, RunRecord, SweepSummary,
};

/// Drives the evaluation sweep
///
/// Setup failures (datasets, corpus) are fatal; per-configuration model
/// resolution failures produce skipped records and the sweep continues.
pub struct BatchRunner {
    config: Config,
    corpus: Vec<Document>,
    key_to_doc_id: HashMap<String, String>,
    queries: Vec<QueryExample>,
    answers: HashMap<String, Answer>,
    qrels: HashMap<String, Vec<String>>,
    chunker: Chunker,
    resolver: Box<dyn EmbeddingResolver>,
    /// Built from the frozen generator settings on first use, then reused
    generator: Option<Arc<dyn Generator>>,
    /// Built from the judge settings on first use, then reused
    judge: Option<Arc<Judge>>,
    metrics_path: PathBuf,
    summary_path: PathBuf,
    runs_dir: PathBuf,
}

impl BatchRunner {
    pub fn new(config: Config) -> crate::Result<Self> {
        let mut queries = load_queries(&config.dataset.queries_path)?;
        let answers = load_answers(&config.dataset.answers_path)?;
        let qrels = load_qrels(&config.dataset.qrels_path)?;
        let corpus = load_corpus(&config.dataset.document_source)?;

        let (key_to_doc_id, doc_id_records) = build_doc_id_map(&corpus);
        let markdown = doc_id_records
            .iter()
            .filter(|record| record.doc_type == "markdown")
            .count();
        info!(
            "Doc ID mapping built: {} markdown, {} other",
            markdown,
            doc_id_records.len() - markdown
        );

        if let Some(max_queries) = config.runtime.max_queries {
            if max_queries > 0 && max_queries < queries.len() {
                info!(
                    "Limiting queries from {} to {} for this run",
                    queries.len(),
                    max_queries
                );
                queries.truncate(max_queries);
            }
        }

        let chunker =
            Chunker::from_config(config.dataset.document_source.tokenizer_json.as_deref());

        let output_dir = config.experiment.output_dir.clone();
        let metrics_path = output_dir.join(&config.experiment.per_run_metrics_file);
        let summary_path = output_dir.join(&config.experiment.summary_file);
        let runs_dir = output_dir.join(&config.experiment.detailed_results_dir);

        fs::create_dir_all(&output_dir).map_err(|e| RagmarkError::Io {
            source: e,
            context: format!("Failed to create output directory: {:?}", output_dir),
        })?;
        fs::create_dir_all(&runs_dir).map_err(|e| RagmarkError::Io {
            source: e,
            context: format!("Failed to create run directory: {:?}", runs_dir),
        })?;

        // Persisted for external validation of qrels IDs; failure here is
        // not worth aborting the sweep
        match serde_json::to_string_pretty(&doc_id_records) {
            Ok(serialized) => {
                if let Err(e) = fs::write(output_dir.join("doc_id_map.json"), serialized) {
                    error!("Failed to persist doc_id_map.json: {}", e);
                }
            }
            Err(e) => error!("Failed to persist doc_id_map.json: {}", e),
        }

        let resolver: Box<dyn EmbeddingResolver> =
            Box::new(RegistryResolver::new(config.registry.clone()));

        Ok(Self {
            config,
            corpus,
            key_to_doc_id,
            queries,
            answers,
            qrels,
            chunker,
            resolver,
            generator: None,
            judge: None,
            metrics_path,
            summary_path,
            runs_dir,
        })
    }

    /// Swap the embedding resolver, e.g. for harness tests that evaluate
    /// with deterministic embedders
    pub fn with_resolver(mut self, resolver: Box<dyn EmbeddingResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Pre-seed the generator instead of building it from configuration on
    /// first use
    pub fn with_generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Pre-seed the judge instead of building it from configuration on
    /// first use
    pub fn with_judge(mut self, judge: Arc<Judge>) -> Self {
        self.judge = Some(judge);
        self
    }

    pub fn queries(&self) -> &[QueryExample] {
        &self.queries
    }

    /// Execute every configuration and write the summary
    pub async fn run(&mut self) -> crate::Result<SweepSummary> {
        let configurations = expand_sweep(&self.config.sweeps);
        info!(
            "Starting evaluation sweep: {} configurations",
            configurations.len()
        );

        let mut stream = fs::File::create(&self.metrics_path).map_err(|e| RagmarkError::Io {
            source: e,
            context: format!("Failed to create metrics stream: {:?}", self.metrics_path),
        })?;

        let mut runs = Vec::with_capacity(configurations.len());
        for configuration in &configurations {
            let record = self.execute_run(configuration).await?;

            let line = serde_json::to_string(&record).map_err(|e| RagmarkError::Json {
                source: e,
                context: "serializing run record".to_string(),
            })?;
            writeln!(stream, "{}", line).map_err(|e| RagmarkError::Io {
                source: e,
                context: format!("Failed to append to metrics stream: {:?}", self.metrics_path),
            })?;

            runs.push(record);
        }

        let summary = SweepSummary {
            total_runs: runs.len(),
            best_run_id: best_run_id(&runs),
            runs,
        };

        let serialized =
            serde_json::to_string_pretty(&summary).map_err(|e| RagmarkError::Json {
                source: e,
                context: "serializing sweep summary".to_string(),
            })?;
        fs::write(&self.summary_path, serialized).map_err(|e| RagmarkError::Io {
            source: e,
            context: format!("Failed to write summary: {:?}", self.summary_path),
        })?;

        info!(
            "Sweep complete. Results written to {}",
            self.summary_path.display()
        );
        Ok(summary)
    }

    async fn execute_run(
        &mut self,
        configuration: &RunConfiguration,
    ) -> crate::Result<RunRecord> {
        let run_id = run_id(
            &configuration.embedding.name,
            configuration.chunk_size,
            configuration.chunk_overlap,
            configuration.top_k,
        );

        if self.config.runtime.resume {
            let cached_path = self.runs_dir.join(&run_id).join("metrics.json");
            if cached_path.exists() {
                match load_cached_record(&cached_path) {
                    Ok(record) => {
                        info!("Resuming: skipping existing run {}", run_id);
                        return Ok(record);
                    }
                    Err(e) => {
                        warn!("Ignoring unreadable cached result for {}: {}", run_id, e)
                    }
                }
            }
        }

        info!("Running configuration {}", run_id);

        let provider = match self.resolver.resolve(&configuration.embedding) {
            Ok(provider) => provider,
            Err(e) => {
                error!("Skipping {}: {}", run_id, e);
                return Ok(RunRecord::Skipped {
                    run_id,
                    reason: e.to_string(),
                });
            }
        };

        let chunks = self.chunker.chunk(
            &self.corpus,
            configuration.chunk_size,
            configuration.chunk_overlap,
            &self.key_to_doc_id,
        )?;
        let retriever = Retriever::build(provider, chunks)?;

        let context_budget = context_token_budget(
            self.config.frozen.generator.n_ctx,
            self.config.frozen.generator.max_new_tokens,
            self.config.frozen.generator.n_ctx_margin,
        );
        let generator = self.generator()?;
        let judge = self.judge()?;
        let pipeline = RagPipeline::new(retriever, generator, configuration.top_k, context_budget);

        let mut responses = Vec::with_capacity(self.queries.len());
        let mut retrieval_scores: Vec<(String, Vec<String>)> =
            Vec::with_capacity(self.queries.len());
        let mut judge_scores: Vec<i64> = Vec::with_capacity(self.queries.len());

        for query in &self.queries {
            let result = pipeline
                .answer(&query.text, self.chunker.tokenizer())
                .await?;
            let doc_ids: Vec<String> = result
                .retrieved
                .iter()
                .map(|chunk| chunk.chunk_id.clone())
                .collect();
            let contexts: Vec<String> = result
                .retrieved
                .iter()
                .map(|chunk| chunk.text.clone())
                .collect();
            let ground_truth = self
                .answers
                .get(&query.query_id)
                .map(|answer| answer.text.clone())
                .unwrap_or_default();

            let (judge_score, judge_justification) = judge
                .evaluate(&query.text, &result.answer, &ground_truth)
                .await?;
            judge_scores.push(judge_score);

            responses.push(ResponseRecord {
                query_id: query.query_id.clone(),
                question: query.text.clone(),
                answer: result.answer,
                ground_truth,
                retrieved_doc_ids: doc_ids.clone(),
                retrieved_context: contexts,
                judge_score,
                judge_justification,
            });
            retrieval_scores.push((query.query_id.clone(), doc_ids));
        }

        let metrics = aggregate_run_metrics(
            &retrieval_scores,
            &self.qrels,
            self.config.frozen.metrics.retrieval_k,
            &judge_scores,
            self.config.judge.faithfulness_threshold,
            self.config.judge.hallucination_threshold,
        );

        let record = RunRecord::Completed {
            run_id: run_id.clone(),
            configuration: configuration.clone(),
            metrics,
        };
        self.persist_run(&run_id, &record, &responses)?;

        info!("Finished run {}", run_id);
        Ok(record)
    }

    /// Generator adapter, built once from the frozen settings
    ///
    /// A missing generator model is fatal: without it no run can complete,
    /// unlike embedding models which only skip their own runs.
    fn generator(&mut self) -> crate::Result<Arc<dyn Generator>> {
        if let Some(generator) = &self.generator {
            return Ok(Arc::clone(generator));
        }

        let generator = build_generator(&self.config.frozen.generator, &self.config.registry)?;
        self.generator = Some(Arc::clone(&generator));
        Ok(generator)
    }

    /// Judge adapter, built once from the judge settings
    fn judge(&mut self) -> crate::Result<Arc<Judge>> {
        if let Some(judge) = &self.judge {
            return Ok(Arc::clone(judge));
        }

        let settings = self.config.judge.generator_settings();
        let generator = build_generator(&settings, &self.config.registry)?;
        let judge = Arc::new(Judge::new(generator, self.config.judge.prompt.clone())?);
        self.judge = Some(Arc::clone(&judge));
        Ok(judge)
    }

    fn persist_run(
        &self,
        run_id: &str,
        record: &RunRecord,
        responses: &[ResponseRecord],
    ) -> crate::Result<()> {
        let run_dir = self.runs_dir.join(run_id);
        fs::create_dir_all(&run_dir).map_err(|e| RagmarkError::Io {
            source: e,
            context: format!("Failed to create run directory: {:?}", run_dir),
        })?;

        if self.config.runtime.persist_responses {
            let mut lines = String::new();
            for response in responses {
                let line = serde_json::to_string(response).map_err(|e| RagmarkError::Json {
                    source: e,
                    context: "serializing response record".to_string(),
                })?;
                lines.push_str(&line);
                lines.push('\n');
            }
            fs::write(run_dir.join("responses.jsonl"), lines).map_err(|e| RagmarkError::Io {
                source: e,
                context: format!("Failed to write responses for run {}", run_id),
            })?;
        }

        let serialized = serde_json::to_string_pretty(record).map_err(|e| RagmarkError::Json {
            source: e,
            context: "serializing run record".to_string(),
        })?;
        fs::write(run_dir.join("metrics.json"), serialized).map_err(|e| RagmarkError::Io {
            source: e,
            context: format!("Failed to write metrics for run {}", run_id),
        })?;

        Ok(())
    }
}

/// Cross product of the sweep lists, in declaration order
fn expand_sweep(sweeps: &SweepConfig) -> Vec<RunConfiguration> {
    let mut configurations = Vec::new();
    for embedding in &sweeps.embedding_models {
        for &chunk_size in &sweeps.chunk_size {
            for &chunk_overlap in &sweeps.chunk_overlap {
                for &top_k in &sweeps.top_k {
                    configurations.push(RunConfiguration {
                        embedding: embedding.clone(),
                        chunk_size,
                        chunk_overlap,
                        top_k,
                    });
                }
            }
        }
    }
    configurations
}

fn load_cached_record(path: &Path) -> crate::Result<RunRecord> {
    let content = fs::read_to_string(path).map_err(|e| RagmarkError::Io {
        source: e,
        context: format!("Failed to read cached run result: {:?}", path),
    })?;
    serde_json::from_str(&content).map_err(|e| RagmarkError::Json {
        source: e,
        context: path.display().to_string(),
    })
}

/// Best completed run by `(recall, ndcg, faithfulness)` descending
///
/// Skipped runs carry no metrics and never win; ties keep the earliest run.
fn best_run_id(runs: &[RunRecord]) -> Option<String> {
    let mut best: Option<(&String, &RunMetrics)> = None;
    for record in runs {
        if let RunRecord::Completed {
            run_id, metrics, ..
        } = record
        {
            let better = match best {
                None => true,
                Some((_, current)) => {
                    (metrics.recall, metrics.ndcg, metrics.faithfulness)
                        > (current.recall, current.ndcg, current.faithfulness)
                }
            };
            if better {
                best = Some((run_id, metrics));
            }
        }
    }
    best.map(|(run_id, _)| run_id.clone())
}
