//! Batch Evaluator — scores the full transcript in bounded batches.
//!
//! Flow per batch: truncate long answers → one scoring prompt → strict JSON
//! parse → single-quote repair → structural validation. Any failure along the
//! way drops that batch to deterministic fallback scoring, so `evaluate`
//! always returns exactly one `Evaluation` per answer and never errors.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::interview::prompts::EVALUATION_PROMPT_TEMPLATE;
use crate::llm_client::{strip_json_fences, LlmError, TextGenerator};

pub const DEFAULT_BATCH_SIZE: usize = 5;
pub const DEFAULT_MAX_ANSWER_WORDS: usize = 50;

const EVALUATION_MAX_TOKENS: u32 = 600;
const EVALUATION_TEMPERATURE: f32 = 0.2;
const MAX_SCORE: f64 = 10.0;

const BLANK_FEEDBACK: &str = "No answer provided";
const WEAK_FEEDBACK: &str = "Answer needs improvement";
const BLANK_SCORE: u8 = 0;
const WEAK_SCORE: u8 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    /// 0 – 10
    pub score: u8,
    pub feedback: String,
}

impl Evaluation {
    /// Backend-independent score for one answer.
    pub fn fallback(answer: &str) -> Self {
        if answer.trim().is_empty() {
            Self {
                score: BLANK_SCORE,
                feedback: BLANK_FEEDBACK.to_string(),
            }
        } else {
            Self {
                score: WEAK_SCORE,
                feedback: WEAK_FEEDBACK.to_string(),
            }
        }
    }
}

/// Why a batch fell back. Logged, never returned past `evaluate`.
#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("Generation failed: {0}")]
    Generation(#[from] LlmError),

    #[error("Response is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid evaluation response: {0}")]
    InvalidResponse(String),
}

pub struct BatchEvaluator {
    llm: Arc<dyn TextGenerator>,
    topic: String,
    max_answer_words: usize,
}

impl BatchEvaluator {
    pub fn new(llm: Arc<dyn TextGenerator>, topic: impl Into<String>) -> Self {
        Self {
            llm,
            topic: topic.into(),
            max_answer_words: DEFAULT_MAX_ANSWER_WORDS,
        }
    }

    pub fn with_max_answer_words(mut self, max_answer_words: usize) -> Self {
        self.max_answer_words = max_answer_words.max(1);
        self
    }

    /// Scores `answers` against `questions` in consecutive batches of at most
    /// `batch_size`. Batches run sequentially; output order matches input.
    pub async fn evaluate(
        &self,
        questions: &[String],
        answers: &[String],
        batch_size: usize,
    ) -> Vec<Evaluation> {
        let batch_size = batch_size.max(1);
        let mut results = Vec::with_capacity(answers.len());

        for (batch_index, batch_answers) in answers.chunks(batch_size).enumerate() {
            let offset = batch_index * batch_size;

            match self.evaluate_batch(offset, questions, batch_answers).await {
                Ok(evaluations) => {
                    debug!(
                        "Batch {} scored by backend ({} answers)",
                        batch_index,
                        evaluations.len()
                    );
                    results.extend(evaluations);
                }
                Err(e) => {
                    warn!(
                        "Evaluation of batch {} failed, applying fallback scoring: {}",
                        batch_index, e
                    );
                    results.extend(batch_answers.iter().map(|a| Evaluation::fallback(a)));
                }
            }
        }

        info!(
            "Evaluated {} answers in {} batches",
            results.len(),
            answers.len().div_ceil(batch_size)
        );
        results
    }

    async fn evaluate_batch(
        &self,
        offset: usize,
        questions: &[String],
        answers: &[String],
    ) -> Result<Vec<Evaluation>, EvaluationError> {
        let prompt = self.build_prompt(offset, questions, answers);
        let text = self
            .llm
            .generate(&prompt, EVALUATION_MAX_TOKENS, EVALUATION_TEMPERATURE)
            .await?;
        parse_evaluations(&text, answers.len())
    }

    fn build_prompt(&self, offset: usize, questions: &[String], answers: &[String]) -> String {
        let transcript = answers
            .iter()
            .enumerate()
            .map(|(j, answer)| {
                let n = offset + j + 1;
                let question = questions
                    .get(offset + j)
                    .map(String::as_str)
                    .unwrap_or_default();
                let answer = if answer.trim().is_empty() {
                    "No Answer".to_string()
                } else {
                    truncate_answer(answer, self.max_answer_words)
                };
                format!("Q{n}: {question}\nA{n}: {answer}")
            })
            .collect::<Vec<_>>()
            .join("\n");

        EVALUATION_PROMPT_TEMPLATE
            .replace("{topic}", &self.topic)
            .replace("{transcript}", &transcript)
    }
}

/// Keeps the first `max_words` words of an over-long answer and marks the cut.
pub fn truncate_answer(answer: &str, max_words: usize) -> String {
    let words: Vec<&str> = answer.split_whitespace().collect();
    if words.len() <= max_words {
        return answer.to_string();
    }
    format!("{} ...", words[..max_words].join(" "))
}

/// Two-stage parse (strict, then one quote repair) followed by structural
/// validation against the expected batch length.
pub fn parse_evaluations(text: &str, expected: usize) -> Result<Vec<Evaluation>, EvaluationError> {
    let text = strip_json_fences(text);

    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(strict_err) => {
            debug!("Strict JSON parse failed ({strict_err}); retrying with quote repair");
            serde_json::from_str(&text.replace('\'', "\""))?
        }
    };

    validate_structure(&value, expected)
}

fn validate_structure(value: &Value, expected: usize) -> Result<Vec<Evaluation>, EvaluationError> {
    let items = value
        .as_array()
        .ok_or_else(|| EvaluationError::InvalidResponse("expected a JSON array".to_string()))?;

    if items.len() != expected {
        return Err(EvaluationError::InvalidResponse(format!(
            "expected {expected} evaluations, got {}",
            items.len()
        )));
    }

    items
        .iter()
        .enumerate()
        .map(|(i, item)| -> Result<Evaluation, EvaluationError> {
            let score = item.get("score").and_then(Value::as_f64).ok_or_else(|| {
                EvaluationError::InvalidResponse(format!("item {i} has no numeric score"))
            })?;
            let feedback = item.get("feedback").and_then(Value::as_str).ok_or_else(|| {
                EvaluationError::InvalidResponse(format!("item {i} has no string feedback"))
            })?;
            Ok(Evaluation {
                score: score.round().clamp(0.0, MAX_SCORE) as u8,
                feedback: feedback.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::testing::{exhausted, ScriptedGenerator};

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn evaluator(llm: &Arc<ScriptedGenerator>) -> BatchEvaluator {
        BatchEvaluator::new(llm.clone(), "Excel")
    }

    #[test]
    fn test_fallback_values() {
        assert_eq!(
            Evaluation::fallback(""),
            Evaluation {
                score: 0,
                feedback: "No answer provided".into()
            }
        );
        assert_eq!(Evaluation::fallback("   ").score, 0);
        assert_eq!(
            Evaluation::fallback("I would use a pivot table"),
            Evaluation {
                score: 3,
                feedback: "Answer needs improvement".into()
            }
        );
    }

    #[test]
    fn test_parse_strict_json() {
        let text = r#"[{"score": 8, "feedback": "Clear"}, {"score": 2, "feedback": "Vague"}]"#;
        let evals = parse_evaluations(text, 2).unwrap();
        assert_eq!(evals[0].score, 8);
        assert_eq!(evals[1].feedback, "Vague");
    }

    #[test]
    fn test_parse_repairs_single_quotes() {
        let text = "[{'score': 7, 'feedback': 'Good use of formulas'}]";
        let evals = parse_evaluations(text, 1).unwrap();
        assert_eq!(
            evals,
            vec![Evaluation {
                score: 7,
                feedback: "Good use of formulas".into()
            }]
        );
    }

    #[test]
    fn test_parse_strips_code_fences() {
        let text = "```json\n[{\"score\": 5, \"feedback\": \"Okay\"}]\n```";
        assert_eq!(parse_evaluations(text, 1).unwrap()[0].score, 5);
    }

    #[test]
    fn test_parse_clamps_and_rounds_scores() {
        let text = r#"[{"score": 14, "feedback": "a"}, {"score": -2, "feedback": "b"}, {"score": 6.6, "feedback": "c"}]"#;
        let scores: Vec<u8> = parse_evaluations(text, 3)
            .unwrap()
            .into_iter()
            .map(|e| e.score)
            .collect();
        assert_eq!(scores, vec![10, 0, 7]);
    }

    #[test]
    fn test_parse_rejects_unrepairable_text() {
        let result = parse_evaluations("Here are your scores: great job!", 1);
        assert!(matches!(result, Err(EvaluationError::Parse(_))));
    }

    #[test]
    fn test_parse_rejects_wrong_length() {
        let text = r#"[{"score": 8, "feedback": "Clear"}]"#;
        assert!(matches!(
            parse_evaluations(text, 2),
            Err(EvaluationError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_parse_rejects_missing_fields() {
        let no_feedback = r#"[{"score": 8}]"#;
        let string_score = r#"[{"score": "8", "feedback": "ok"}]"#;
        let object = r#"{"score": 8, "feedback": "ok"}"#;
        for text in [no_feedback, string_score, object] {
            assert!(matches!(
                parse_evaluations(text, 1),
                Err(EvaluationError::InvalidResponse(_))
            ));
        }
    }

    #[test]
    fn test_truncate_answer() {
        let short = "use conditional formatting";
        assert_eq!(truncate_answer(short, 50), short);

        let exactly = vec!["w"; 50].join(" ");
        assert_eq!(truncate_answer(&exactly, 50), exactly);

        let long = (0..60).map(|i| i.to_string()).collect::<Vec<_>>().join(" ");
        let cut = truncate_answer(&long, 50);
        assert!(cut.ends_with("49 ..."));
        assert_eq!(cut.split_whitespace().count(), 51);
    }

    #[tokio::test]
    async fn test_batches_preserve_order_across_boundaries() {
        let llm = Arc::new(
            ScriptedGenerator::new()
                .reply(r#"[{"score": 1, "feedback": "q1"}, {"score": 2, "feedback": "q2"}]"#)
                .reply(r#"[{"score": 3, "feedback": "q3"}, {"score": 4, "feedback": "q4"}]"#)
                .reply(r#"[{"score": 5, "feedback": "q5"}]"#),
        );
        let qs = strings(&["Q1", "Q2", "Q3", "Q4", "Q5"]);
        let answers = strings(&["a", "b", "c", "d", "e"]);

        let evals = evaluator(&llm).evaluate(&qs, &answers, 2).await;

        let feedback: Vec<&str> = evals.iter().map(|e| e.feedback.as_str()).collect();
        assert_eq!(feedback, vec!["q1", "q2", "q3", "q4", "q5"]);
        assert_eq!(llm.calls(), 3);

        let prompts = llm.prompts();
        assert!(prompts[1].contains("Q3: Q3\nA3: c"));
        assert!(prompts[1].contains("Q4: Q4\nA4: d"));
        assert!(!prompts[1].contains("Q2:"));
    }

    #[tokio::test]
    async fn test_blank_answers_are_marked_in_prompt() {
        let llm = Arc::new(ScriptedGenerator::new().reply(r#"[{"score": 0, "feedback": "none"}]"#));
        evaluator(&llm)
            .evaluate(&strings(&["What is a macro?"]), &strings(&[""]), 5)
            .await;
        assert!(llm.prompts()[0].contains("A1: No Answer"));
    }

    #[tokio::test]
    async fn test_long_answers_are_truncated_in_prompt() {
        let llm = Arc::new(ScriptedGenerator::new().reply(r#"[{"score": 6, "feedback": "ok"}]"#));
        let long = vec!["formula"; 80].join(" ");
        evaluator(&llm)
            .evaluate(&strings(&["Explain"]), &[long], 5)
            .await;
        let prompt = &llm.prompts()[0];
        assert!(prompt.contains("formula ..."));
        assert_eq!(prompt.matches("formula").count(), 50);
    }

    #[tokio::test]
    async fn test_exhausted_backend_falls_back_for_every_answer() {
        let llm = Arc::new(ScriptedGenerator::new().fail(exhausted()));
        let answers = strings(&["", "SUMIFS with criteria", "", "INDEX/MATCH", "x", "y", ""]);
        let qs = strings(&["1", "2", "3", "4", "5", "6", "7"]);

        let evals = evaluator(&llm).evaluate(&qs, &answers, 5).await;

        assert_eq!(evals.len(), answers.len());
        let scores: Vec<u8> = evals.iter().map(|e| e.score).collect();
        assert_eq!(scores, vec![0, 3, 0, 3, 3, 3, 0]);
    }

    #[tokio::test]
    async fn test_malformed_batch_falls_back_without_affecting_others() {
        let llm = Arc::new(
            ScriptedGenerator::new()
                .reply("I cannot score these")
                .reply(r#"[{"score": 9, "feedback": "Excellent"}]"#),
        );
        let evals = evaluator(&llm)
            .evaluate(&strings(&["1", "2", "3"]), &strings(&["a", "", "c"]), 2)
            .await;

        assert_eq!(evals[0], Evaluation::fallback("a"));
        assert_eq!(evals[1], Evaluation::fallback(""));
        assert_eq!(evals[2].score, 9);
    }

    #[tokio::test]
    async fn test_short_response_falls_back() {
        let llm = Arc::new(ScriptedGenerator::new().reply(r#"[{"score": 9, "feedback": "Great"}]"#));
        let evals = evaluator(&llm)
            .evaluate(&strings(&["1", "2"]), &strings(&["a", "b"]), 5)
            .await;
        assert_eq!(evals, vec![Evaluation::fallback("a"), Evaluation::fallback("b")]);
    }

    #[tokio::test]
    async fn test_empty_transcript_makes_no_calls() {
        let llm = Arc::new(ScriptedGenerator::new());
        let evals = evaluator(&llm).evaluate(&[], &[], 5).await;
        assert!(evals.is_empty());
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_zero_batch_size_is_treated_as_one() {
        let llm = Arc::new(ScriptedGenerator::new());
        let evals = evaluator(&llm)
            .evaluate(&strings(&["1", "2"]), &strings(&["a", ""]), 0)
            .await;
        assert_eq!(evals.len(), 2);
        assert_eq!(llm.calls(), 2);
    }
}
