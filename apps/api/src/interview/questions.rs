//! Question Generator — builds question prompts, calls the backend, and
//! normalises the returned text into a single clean question.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::interview::difficulty::DifficultyLevel;
use crate::interview::prompts::{FIRST_QUESTION_PROMPT_TEMPLATE, FOLLOWUP_PROMPT_TEMPLATE};
use crate::interview::InterviewError;
use crate::llm_client::TextGenerator;

const FIRST_QUESTION_MAX_TOKENS: u32 = 80;
const FOLLOWUP_MAX_TOKENS: u32 = 100;
const QUESTION_TEMPERATURE: f32 = 0.7;
/// The opening question gets one regenerate call if it comes back blank.
const FIRST_QUESTION_ATTEMPTS: u32 = 2;
const REPHRASED_SUFFIX: &str = " (rephrased)";

pub struct QuestionGenerator {
    llm: Arc<dyn TextGenerator>,
    topic: String,
}

impl QuestionGenerator {
    pub fn new(llm: Arc<dyn TextGenerator>, topic: impl Into<String>) -> Self {
        Self {
            llm,
            topic: topic.into(),
        }
    }

    pub async fn first_question(&self) -> Result<String, InterviewError> {
        let prompt = FIRST_QUESTION_PROMPT_TEMPLATE.replace("{topic}", &self.topic);

        for attempt in 1..=FIRST_QUESTION_ATTEMPTS {
            let raw = self
                .llm
                .generate(&prompt, FIRST_QUESTION_MAX_TOKENS, QUESTION_TEMPERATURE)
                .await?;
            let question = clean_question(&raw);
            if !question.is_empty() {
                return Ok(question);
            }
            warn!(
                "First question was empty after cleanup (attempt {}/{})",
                attempt, FIRST_QUESTION_ATTEMPTS
            );
        }

        Err(InterviewError::EmptyQuestion)
    }

    /// Generates the next question. A result that repeats an earlier question
    /// is disambiguated in place instead of costing another backend call.
    pub async fn followup_question(
        &self,
        prev_question: &str,
        prev_answer: &str,
        difficulty: DifficultyLevel,
        asked_so_far: &[String],
    ) -> Result<String, InterviewError> {
        let prompt = build_followup_prompt(
            &self.topic,
            prev_question,
            prev_answer,
            difficulty,
            asked_so_far,
        );

        let raw = self
            .llm
            .generate(&prompt, FOLLOWUP_MAX_TOKENS, QUESTION_TEMPERATURE)
            .await?;

        Ok(disambiguate(clean_question(&raw), asked_so_far))
    }
}

fn build_followup_prompt(
    topic: &str,
    prev_question: &str,
    prev_answer: &str,
    difficulty: DifficultyLevel,
    asked_so_far: &[String],
) -> String {
    let prev_answer = if prev_answer.trim().is_empty() {
        "(no answer)"
    } else {
        prev_answer
    };

    let asked_list = if asked_so_far.is_empty() {
        "(none)".to_string()
    } else {
        asked_so_far
            .iter()
            .map(|q| format!("- {q}"))
            .collect::<Vec<_>>()
            .join("\n")
    };

    FOLLOWUP_PROMPT_TEMPLATE
        .replace("{topic}", topic)
        .replace("{prev_question}", prev_question)
        .replace("{prev_answer}", prev_answer)
        .replace("{difficulty}", difficulty.as_str())
        .replace("{asked_list}", &asked_list)
}

/// Strips a leading enumeration marker such as `1.` or `2)` and surrounding
/// whitespace.
pub fn clean_question(text: &str) -> String {
    let trimmed = text.trim();
    let digits = trimmed.len() - trimmed.trim_start_matches(|c: char| c.is_ascii_digit()).len();

    if digits > 0 {
        let rest = &trimmed[digits..];
        if let Some(rest) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
            return rest.trim().to_string();
        }
    }

    trimmed.to_string()
}

fn disambiguate(question: String, asked_so_far: &[String]) -> String {
    let mut candidate = question;
    while asked_so_far.iter().any(|asked| asked == &candidate) {
        debug!("Generated question repeats an earlier one; tagging as rephrased");
        candidate.push_str(REPHRASED_SUFFIX);
    }
    candidate
}
