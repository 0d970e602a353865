//! Rank metrics over retrieved document IDs
//!
//! Both metrics operate on a duplicate-collapsed, order-preserving list of
//! retrieved IDs truncated to K, with binary relevance. A query with no
//! relevant documents scores 0, never 1: an unanswerable query must not
//! inflate the aggregate.

use ahash::{HashMap, HashSet, HashSetExt};
use serde::{Deserialize, Serialize};

/// Collapse repeated IDs to their first occurrence, preserving order
pub fn dedup_first_occurrence(ids: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.iter()
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect()
}

/// Recall@K = |retrieved_K ∩ relevant| / |relevant|
///
/// Deduplication happens before the cut to K, so a doc retrieved twice
/// cannot crowd out a distinct hit.
pub fn recall_at_k(retrieved: &[String], relevant: &[String], k: usize) -> f64 {
    if relevant.is_empty() {
        return 0.0;
    }

    let relevant_set: HashSet<&str> = relevant.iter().map(|s| s.as_str()).collect();
    let unique = dedup_first_occurrence(retrieved);
    let retrieved_k = &unique[..unique.len().min(k)];

    let hits = retrieved_k
        .iter()
        .filter(|doc_id| relevant_set.contains(doc_id.as_str()))
        .count();
    hits as f64 / relevant_set.len() as f64
}

/// NDCG@K with binary gain
///
/// DCG sums 1/log2(rank+2) over hits in the deduplicated top K (rank
/// 0-based); IDCG assumes the first min(|relevant|, K) positions are all
/// hits. 0 when either list is empty.
pub fn ndcg_at_k(retrieved: &[String], relevant: &[String], k: usize) -> f64 {
    let unique = dedup_first_occurrence(retrieved);
    let retrieved_k = &unique[..unique.len().min(k)];
    if retrieved_k.is_empty() || relevant.is_empty() {
        return 0.0;
    }

    let relevant_set: HashSet<&str> = relevant.iter().map(|s| s.as_str()).collect();

    let mut dcg = 0.0;
    for (rank, doc_id) in retrieved_k.iter().enumerate() {
        if relevant_set.contains(doc_id.as_str()) {
            dcg += 1.0 / ((rank + 2) as f64).log2();
        }
    }

    let ideal_hits = relevant.len().min(k);
    let idcg: f64 = (0..ideal_hits).map(|i| 1.0 / ((i + 2) as f64).log2()).sum();
    if idcg == 0.0 {
        return 0.0;
    }
    dcg / idcg
}

/// Round to 4 decimal places for persisted output
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Aggregate metrics for one run, persisted under fixed key names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    #[serde(rename = "recall@10")]
    pub recall: f64,
    #[serde(rename = "ndcg@10")]
    pub ndcg: f64,
    /// Fraction of queries with judge score >= the faithfulness threshold
    pub faithfulness: f64,
    /// Fraction of queries with judge score <= the hallucination threshold
    pub hallucination_rate: f64,
    pub mean_judge_score: f64,
}

/// Aggregate per-query retrieval lists and judge scores into run metrics
///
/// `retrieval_scores` pairs each query ID with its retrieved doc IDs, in
/// query order; `judge_scores` is aligned with it.
pub fn aggregate_run_metrics(
    retrieval_scores: &[(String, Vec<String>)],
    qrels: &HashMap<String, Vec<String>>,
    retrieval_k: usize,
    judge_scores: &[i64],
    faithfulness_threshold: i64,
    hallucination_threshold: i64,
) -> RunMetrics {
    let empty: Vec<String> = Vec::new();
    let mut recall_total = 0.0;
    let mut ndcg_total = 0.0;
    for (query_id, doc_ids) in retrieval_scores {
        let relevant = qrels.get(query_id).unwrap_or(&empty);
        recall_total += recall_at_k(doc_ids, relevant, retrieval_k);
        ndcg_total += ndcg_at_k(doc_ids, relevant, retrieval_k);
    }

    let examples = retrieval_scores.len();
    let mean_recall = if examples > 0 {
        recall_total / examples as f64
    } else {
        0.0
    };
    let mean_ndcg = if examples > 0 {
        ndcg_total / examples as f64
    } else {
        0.0
    };

    let mean_judge = if judge_scores.is_empty() {
        0.0
    } else {
        judge_scores.iter().sum::<i64>() as f64 / judge_scores.len() as f64
    };
    let faithful = judge_scores
        .iter()
        .filter(|score| **score >= faithfulness_threshold)
        .count();
    let hallucinated = judge_scores
        .iter()
        .filter(|score| **score <= hallucination_threshold)
        .count();
    let total = judge_scores.len();

    RunMetrics {
        recall: round4(mean_recall),
        ndcg: round4(mean_ndcg),
        faithfulness: round4(if total > 0 {
            faithful as f64 / total as f64
        } else {
            0.0
        }),
        hallucination_rate: round4(if total > 0 {
            hallucinated as f64 / total as f64
        } else {
            0.0
        }),
        mean_judge_score: round4(mean_judge),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ahash::HashMapExt;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_recall_bounds() {
        let retrieved = ids(&["doc1", "doc2", "doc3"]);

        // All relevant found
        assert_eq!(recall_at_k(&retrieved, &ids(&["doc1", "doc2"]), 10), 1.0);
        // Half found
        assert_eq!(recall_at_k(&retrieved, &ids(&["doc1", "doc9"]), 10), 0.5);
        // None found
        assert_eq!(recall_at_k(&retrieved, &ids(&["doc8", "doc9"]), 10), 0.0);
    }

    #[test]
    fn test_empty_relevant_scores_zero() {
        let retrieved = ids(&["doc1", "doc2"]);
        assert_eq!(recall_at_k(&retrieved, &[], 10), 0.0);
        assert_eq!(ndcg_at_k(&retrieved, &[], 10), 0.0);
    }

    #[test]
    fn test_empty_retrieved_scores_zero() {
        let relevant = ids(&["doc1"]);
        assert_eq!(recall_at_k(&[], &relevant, 10), 0.0);
        assert_eq!(ndcg_at_k(&[], &relevant, 10), 0.0);
    }

    #[test]
    fn test_dedup_before_truncation() {
        // [a, a, b] at K=2 scores identically to [a, b] at K=2: the
        // duplicate collapses before the cut, so b stays in window
        let relevant = ids(&["a", "b"]);
        let with_dup = ids(&["a", "a", "b"]);
        let without = ids(&["a", "b"]);

        assert_eq!(
            recall_at_k(&with_dup, &relevant, 2),
            recall_at_k(&without, &relevant, 2)
        );
        assert_eq!(
            ndcg_at_k(&with_dup, &relevant, 2),
            ndcg_at_k(&without, &relevant, 2)
        );
        assert_eq!(recall_at_k(&with_dup, &relevant, 2), 1.0);
    }

    #[test]
    fn test_ndcg_worked_scenario() {
        // relevant = {doc1, doc3}, retrieved = [doc2, doc1, doc3, doc1], K=3
        // dedup -> [doc2, doc1, doc3]; hits at ranks 1 and 2 (0-based)
        // DCG = 1/log2(3) + 1/log2(4); IDCG = 1/log2(2) + 1/log2(3)
        let relevant = ids(&["doc1", "doc3"]);
        let retrieved = ids(&["doc2", "doc1", "doc3", "doc1"]);

        assert_eq!(recall_at_k(&retrieved, &relevant, 3), 1.0);

        let expected = (1.0 / 3f64.log2() + 1.0 / 4f64.log2()) / (1.0 / 2f64.log2() + 1.0 / 3f64.log2());
        let ndcg = ndcg_at_k(&retrieved, &relevant, 3);
        assert!((ndcg - expected).abs() < 1e-12);
        assert!(ndcg > 0.0 && ndcg < 1.0);
    }

    #[test]
    fn test_ndcg_perfect_ordering_is_one() {
        let relevant = ids(&["doc1", "doc2"]);
        let retrieved = ids(&["doc1", "doc2", "doc3"]);
        assert!((ndcg_at_k(&retrieved, &relevant, 10) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_aggregate_run_metrics() {
        let mut qrels = HashMap::new();
        qrels.insert("q1".to_string(), ids(&["doc1"]));
        qrels.insert("q2".to_string(), ids(&["doc2"]));

        let retrieval_scores = vec![
            ("q1".to_string(), ids(&["doc1", "doc3"])), // hit at rank 0
            ("q2".to_string(), ids(&["doc3", "doc4"])), // miss
        ];
        let judge_scores = vec![5, 1];

        let metrics = aggregate_run_metrics(&retrieval_scores, &qrels, 10, &judge_scores, 4, 2);

        assert_eq!(metrics.recall, 0.5);
        assert_eq!(metrics.faithfulness, 0.5);
        assert_eq!(metrics.hallucination_rate, 0.5);
        assert_eq!(metrics.mean_judge_score, 3.0);
        // q1 NDCG is 1.0, q2 is 0.0
        assert_eq!(metrics.ndcg, 0.5);
    }

    #[test]
    fn test_aggregate_rounds_to_four_places() {
        let mut qrels = HashMap::new();
        qrels.insert("q1".to_string(), ids(&["doc1", "doc2", "doc3"]));

        let retrieval_scores = vec![("q1".to_string(), ids(&["doc1"]))];
        let judge_scores = vec![3];

        let metrics = aggregate_run_metrics(&retrieval_scores, &qrels, 10, &judge_scores, 4, 2);

        // 1/3 rounds to 0.3333
        assert_eq!(metrics.recall, 0.3333);
    }

    #[test]
    fn test_aggregate_handles_zero_queries() {
        let qrels = HashMap::new();
        let metrics = aggregate_run_metrics(&[], &qrels, 10, &[], 4, 2);

        assert_eq!(metrics.recall, 0.0);
        assert_eq!(metrics.ndcg, 0.0);
        assert_eq!(metrics.faithfulness, 0.0);
        assert_eq!(metrics.hallucination_rate, 0.0);
        assert_eq!(metrics.mean_judge_score, 0.0);
    }

    #[test]
    fn test_metrics_serialize_under_fixed_keys() {
        let metrics = RunMetrics {
            recall: 0.5,
            ndcg: 0.25,
            faithfulness: 1.0,
            hallucination_rate: 0.0,
            mean_judge_score: 4.5,
        };

        let value = serde_json::to_value(&metrics).unwrap();
        assert_eq!(value["recall@10"], 0.5);
        assert_eq!(value["ndcg@10"], 0.25);
        assert_eq!(value["mean_judge_score"], 4.5);
    }
}
