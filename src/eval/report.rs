//! Plain-text rendering of persisted run metrics

use std::path::Path;

use super::RunRecord;
use crate::error::{RagmarkError, Result};
use crate::metrics::RunMetrics;

/// Load a `metrics.json` written by an evaluation run
///
/// Accepts either a bare metrics object or a full per-run record, so both
/// standalone metric files and `runs/<id>/metrics.json` render directly.
pub fn load_run_metrics(path: &Path) -> Result<RunMetrics> {
    let content = std::fs::read_to_string(path).map_err(|e| RagmarkError::Io {
        source: e,
        context: format!("Failed to read metrics file: {:?}", path),
    })?;

    let flat_err = match serde_json::from_str::<RunMetrics>(&content) {
        Ok(metrics) => return Ok(metrics),
        Err(e) => e,
    };

    if let Ok(record) = serde_json::from_str::<RunRecord>(&content) {
        return match record.metrics() {
            Some(metrics) => Ok(metrics.clone()),
            None => Err(RagmarkError::Dataset(format!(
                "Run {} was skipped and has no metrics",
                record.run_id()
            ))),
        };
    }

    Err(RagmarkError::Json {
        source: flat_err,
        context: path.display().to_string(),
    })
}

/// Render metrics as `key: value` lines under a fixed header
pub fn render_metrics_report(metrics: &RunMetrics) -> String {
    let mut out = String::new();
    out.push_str("Evaluation Report\n");
    out.push_str("=================\n\n");
    for (key, value) in [
        ("recall@10", metrics.recall),
        ("ndcg@10", metrics.ndcg),
        ("faithfulness", metrics.faithfulness),
        ("hallucination_rate", metrics.hallucination_rate),
        ("mean_judge_score", metrics.mean_judge_score),
    ] {
        out.push_str(&format!("{}: {:.4}\n", key, value));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_metrics() -> RunMetrics {
        RunMetrics {
            recall: 0.825,
            ndcg: 0.7914,
            faithfulness: 0.9,
            hallucination_rate: 0.05,
            mean_judge_score: 4.2,
        }
    }

    #[test]
    fn test_report_format() {
        let report = render_metrics_report(&sample_metrics());

        assert!(report.starts_with("Evaluation Report\n=================\n\n"));
        assert!(report.contains("recall@10: 0.8250\n"));
        assert!(report.contains("ndcg@10: 0.7914\n"));
        assert!(report.contains("faithfulness: 0.9000\n"));
        assert!(report.contains("hallucination_rate: 0.0500\n"));
        assert!(report.contains("mean_judge_score: 4.2000\n"));
    }

    #[test]
    fn test_load_from_disk() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("metrics.json");
        std::fs::write(
            &path,
            serde_json::to_string_pretty(&sample_metrics()).unwrap(),
        )
        .unwrap();

        let loaded = load_run_metrics(&path).unwrap();
        assert_eq!(loaded, sample_metrics());
    }

    #[test]
    fn test_load_accepts_run_record_shape() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("metrics.json");
        std::fs::write(
            &path,
            r#"{
                "status": "completed",
                "run_id": "all-MiniLM-L6-v2_cs256_co0_k5",
                "configuration": {
                    "embedding": {"name": "all-MiniLM-L6-v2", "source": "fastembed"},
                    "chunk_size": 256,
                    "chunk_overlap": 0,
                    "top_k": 5
                },
                "metrics": {
                    "recall@10": 0.825,
                    "ndcg@10": 0.7914,
                    "faithfulness": 0.9,
                    "hallucination_rate": 0.05,
                    "mean_judge_score": 4.2
                }
            }"#,
        )
        .unwrap();

        let loaded = load_run_metrics(&path).unwrap();
        assert_eq!(loaded, sample_metrics());
    }

    #[test]
    fn test_load_rejects_skipped_record() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("metrics.json");
        std::fs::write(
            &path,
            r#"{"status": "skipped", "run_id": "broken_cs256_co0_k5", "reason": "model missing"}"#,
        )
        .unwrap();

        assert!(matches!(
            load_run_metrics(&path),
            Err(RagmarkError::Dataset(_))
        ));
    }

    #[test]
    fn test_load_rejects_malformed_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("metrics.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(matches!(
            load_run_metrics(&path),
            Err(RagmarkError::Json { .. })
        ));
    }
}
