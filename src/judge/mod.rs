//! LLM-as-judge answer scoring
//!
//! Renders a grading prompt by literal placeholder substitution, sends it
//! to a generator, and parses a `score`/`justification` verdict out of
//! model output that is only approximately JSON.

use std::sync::Arc;

use regex::Regex;
use serde_json::Value;

use crate::error::RagmarkError;
use crate::llm::{Generator, LlmError};

/// Grading template used when the configuration does not supply one
pub const DEFAULT_JUDGE_PROMPT: &str = "\
You are grading the answer to a support question against a reference answer.

Question: {question}

Answer: {answer}

Ground Truth: {ground_truth}

Rate the answer on a scale of 0-5, where 5 means fully correct and \
consistent with the ground truth and 0 means entirely wrong or fabricated. \
Respond with a JSON object containing \"score\" (integer) and \
\"justification\" (one sentence).";

/// Substitute placeholders literally
///
/// Plain string replacement, not a templating engine: answers routinely
/// contain brace characters and must never be interpreted as format syntax.
pub fn render_prompt(template: &str, question: &str, answer: &str, ground_truth: &str) -> String {
    template
        .replace("{question}", question)
        .replace("{answer}", answer)
        .replace("{ground_truth}", ground_truth)
}

/// Scores generated answers against ground truth via a generator model
pub struct Judge {
    generator: Arc<dyn Generator>,
    template: String,
    fenced_json: Regex,
}

impl Judge {
    pub fn new(generator: Arc<dyn Generator>, prompt: Option<String>) -> crate::Result<Self> {
        let fenced_json = Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").map_err(|e| {
            RagmarkError::Config(format!("Invalid judge fence pattern: {}", e))
        })?;
        Ok(Self {
            generator,
            template: prompt.unwrap_or_else(|| DEFAULT_JUDGE_PROMPT.to_string()),
            fenced_json,
        })
    }

    /// Score an answer, returning `(score, justification)`
    ///
    /// A response no parse stage can decode yields `(0, <raw response>)`.
    /// Score 0 therefore means "unparseable" as well as "judged worthless";
    /// callers cannot distinguish the two from the score alone.
    pub async fn evaluate(
        &self,
        question: &str,
        answer: &str,
        ground_truth: &str,
    ) -> Result<(i64, String), LlmError> {
        let prompt = render_prompt(&self.template, question, answer, ground_truth);
        let response = self.generator.complete(&prompt).await?;
        match self.parse_verdict(&response) {
            Some(verdict) => Ok(verdict),
            None => Ok((0, response)),
        }
    }

    /// Three-stage verdict extraction
    ///
    /// 1. the whole trimmed response as JSON
    /// 2. a fenced JSON code block
    /// 3. the outermost `{...}` span, retried with the end truncated back
    ///    one closing brace at a time
    pub fn parse_verdict(&self, response: &str) -> Option<(i64, String)> {
        if let Some(verdict) = try_parse(response.trim()) {
            return Some(verdict);
        }

        if let Some(captures) = self.fenced_json.captures(response) {
            if let Some(block) = captures.get(1) {
                if let Some(verdict) = try_parse(block.as_str()) {
                    return Some(verdict);
                }
            }
        }

        let start = response.find('{')?;
        let tail = &response[start..];
        let closers: Vec<usize> = tail.match_indices('}').map(|(idx, _)| idx).collect();
        for end in closers.into_iter().rev() {
            if let Some(verdict) = try_parse(&tail[..=end]) {
                return Some(verdict);
            }
        }
        None
    }
}

fn try_parse(text: &str) -> Option<(i64, String)> {
    let value: Value = serde_json::from_str(text).ok()?;
    extract_verdict(&value)
}

/// Pull `(score, justification)` out of a parsed JSON value
///
/// The `score` key must be present and integer-like; an object without one
/// is not a verdict, so stray braced spans in prose fall through to the
/// raw-text fallback. Missing `justification` becomes an empty string.
fn extract_verdict(value: &Value) -> Option<(i64, String)> {
    let object = value.as_object()?;
    let score = match object.get("score")? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?,
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    let justification = match object.get("justification") {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    };
    Some((score.clamp(0, 5), justification))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct CannedGenerator {
        response: String,
    }

    #[async_trait]
    impl Generator for CannedGenerator {
        async fn complete(&self, _prompt: &str) -> Result<String, LlmError> {
            Ok(self.response.clone())
        }

        fn model_name(&self) -> &str {
            "canned"
        }
    }

    fn judge_with(response: &str) -> Judge {
        Judge::new(
            Arc::new(CannedGenerator {
                response: response.to_string(),
            }),
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_render_prompt_is_literal() {
        let template = "Q: {question} A: {answer} G: {ground_truth}";
        let rendered = render_prompt(template, "How do I reset?", "Use {braces} carefully", "Reset via portal");
        assert_eq!(rendered, "Q: How do I reset? A: Use {braces} carefully G: Reset via portal");
    }

    #[test]
    fn test_parse_whole_response() {
        let judge = judge_with("");
        let verdict = judge
            .parse_verdict(r#"{"score": 4, "justification": "Matches the reference"}"#)
            .unwrap();
        assert_eq!(verdict, (4, "Matches the reference".to_string()));
    }

    #[test]
    fn test_parse_string_score() {
        let judge = judge_with("");
        let verdict = judge
            .parse_verdict(r#"{"score": "3", "justification": "Mostly right"}"#)
            .unwrap();
        assert_eq!(verdict.0, 3);
    }

    #[test]
    fn test_score_is_clamped() {
        let judge = judge_with("");
        let high = judge.parse_verdict(r#"{"score": 9, "justification": "x"}"#).unwrap();
        assert_eq!(high.0, 5);
        let low = judge.parse_verdict(r#"{"score": -2, "justification": "x"}"#).unwrap();
        assert_eq!(low.0, 0);
    }

    #[test]
    fn test_parse_fenced_block() {
        let judge = judge_with("");
        let response = "Here is my verdict:\n```json\n{\"score\": 2, \"justification\": \"Partly right\"}\n```\nDone.";
        let verdict = judge.parse_verdict(response).unwrap();
        assert_eq!(verdict, (2, "Partly right".to_string()));
    }

    #[test]
    fn test_parse_brace_span_with_prose() {
        let judge = judge_with("");
        let response = "Verdict: {\"score\": 5, \"justification\": \"Matches the guide\"} -- end of output";
        let verdict = judge.parse_verdict(response).unwrap();
        assert_eq!(verdict.0, 5);
    }

    #[test]
    fn test_parse_retries_truncated_spans() {
        let judge = judge_with("");
        // Extra closing brace after the object: the widest span fails to
        // parse, the next-narrower one succeeds
        let response = "{\"score\": 1, \"justification\": \"Wrong steps\"}}";
        let verdict = judge.parse_verdict(response).unwrap();
        assert_eq!(verdict, (1, "Wrong steps".to_string()));
    }

    #[test]
    fn test_object_without_score_is_not_a_verdict() {
        let judge = judge_with("");
        assert!(judge.parse_verdict(r#"{"justification": "no score here"}"#).is_none());
    }

    #[tokio::test]
    async fn test_unparseable_response_falls_back_to_raw() {
        let judge = judge_with("score: 4, looks good");
        let (score, justification) = judge
            .evaluate("How do I log in?", "Use SSO", "Use single sign-on")
            .await
            .unwrap();
        assert_eq!(score, 0);
        assert_eq!(justification, "score: 4, looks good");
    }

    #[tokio::test]
    async fn test_evaluate_parses_json_response() {
        let judge = judge_with(r#"{"score": 4, "justification": "Consistent with the reference"}"#);
        let (score, justification) = judge
            .evaluate("How do I log in?", "Use SSO", "Use single sign-on")
            .await
            .unwrap();
        assert_eq!(score, 4);
        assert_eq!(justification, "Consistent with the reference");
    }
}
