// Adaptive interview engine.
// Question generation, difficulty adaptation, session sequencing and batch scoring.
// All LLM calls go through llm_client::TextGenerator.

pub mod difficulty;
pub mod evaluator;
pub mod handlers;
pub mod prompts;
pub mod questions;
pub mod registry;
pub mod session;

use thiserror::Error;

use crate::llm_client::LlmError;

/// Failures surfaced to the caller of a single interview turn.
/// None of them leave a session in a corrupted state.
#[derive(Debug, Error)]
pub enum InterviewError {
    #[error(transparent)]
    Generation(#[from] LlmError),

    #[error("Generation backend returned an empty question")]
    EmptyQuestion,

    #[error("Interview has not started: no question has been asked yet")]
    NotStarted,
}
