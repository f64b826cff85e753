//! Session State Machine — sequences one candidate's interview.
//!
//! Flow: start → first question → (answer → difficulty → follow-up)* →
//!       final answer → batch evaluation → report → COMPLETE.
//!
//! The engine never holds sessions itself. Callers pass `&mut Session` for
//! each turn and are responsible for serialising access to it.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::interview::difficulty::DifficultyThresholds;
use crate::interview::evaluator::{
    BatchEvaluator, Evaluation, DEFAULT_BATCH_SIZE, DEFAULT_MAX_ANSWER_WORDS,
};
use crate::interview::questions::QuestionGenerator;
use crate::interview::InterviewError;
use crate::llm_client::TextGenerator;
use crate::report::{InterviewReport, ReportRenderer};

pub const COMPLETION_MESSAGE: &str = "Interview complete";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    AwaitingFirstQuestion,
    InProgress,
    Evaluating,
    Complete,
}

/// One candidate's interview. `questions` leads `answers` by exactly one
/// while the interview is in progress and matches it once complete.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: String,
    pub candidate_name: String,
    pub questions: Vec<String>,
    pub answers: Vec<String>,
    pub target_count: usize,
    pub state: SessionState,
    pub evaluations: Option<Vec<Evaluation>>,
    pub report: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: impl Into<String>, candidate_name: impl Into<String>, target_count: usize) -> Self {
        Self {
            id: id.into(),
            candidate_name: candidate_name.into(),
            questions: Vec::new(),
            answers: Vec::new(),
            target_count: target_count.max(1),
            state: SessionState::AwaitingFirstQuestion,
            evaluations: None,
            report: None,
            created_at: Utc::now(),
        }
    }

    /// The question currently waiting for an answer, if any.
    pub fn pending_question(&self) -> Option<&str> {
        if self.questions.len() > self.answers.len() {
            self.questions.last().map(String::as_str)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StartPayload {
    pub intro: String,
    pub first_question: String,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NextStep {
    InProgress {
        next_question: String,
        /// 1-based number of `next_question`.
        progress: usize,
        total: usize,
    },
    Complete {
        message: String,
        evaluations: Vec<Evaluation>,
    },
}

#[derive(Debug, Clone)]
pub struct InterviewSettings {
    pub topic: String,
    pub target_count: usize,
    pub batch_size: usize,
    pub max_answer_words: usize,
    pub thresholds: DifficultyThresholds,
}

impl Default for InterviewSettings {
    fn default() -> Self {
        Self {
            topic: "Excel".to_string(),
            target_count: 20,
            batch_size: DEFAULT_BATCH_SIZE,
            max_answer_words: DEFAULT_MAX_ANSWER_WORDS,
            thresholds: DifficultyThresholds::default(),
        }
    }
}

pub struct InterviewEngine {
    questions: QuestionGenerator,
    evaluator: BatchEvaluator,
    renderer: Arc<dyn ReportRenderer>,
    settings: InterviewSettings,
}

impl InterviewEngine {
    pub fn new(
        llm: Arc<dyn TextGenerator>,
        renderer: Arc<dyn ReportRenderer>,
        settings: InterviewSettings,
    ) -> Self {
        Self {
            questions: QuestionGenerator::new(llm.clone(), settings.topic.clone()),
            evaluator: BatchEvaluator::new(llm, settings.topic.clone())
                .with_max_answer_words(settings.max_answer_words),
            renderer,
            settings,
        }
    }

    pub fn settings(&self) -> &InterviewSettings {
        &self.settings
    }

    /// Creates a session and asks its first question. Nothing is returned on
    /// failure, so a failed start leaves no half-built session behind.
    pub async fn start(
        &self,
        session_id: impl Into<String>,
        candidate_name: impl Into<String>,
    ) -> Result<(Session, StartPayload), InterviewError> {
        let mut session = Session::new(session_id, candidate_name, self.settings.target_count);

        let first_question = self.questions.first_question().await?;
        session.questions.push(first_question.clone());
        session.state = SessionState::InProgress;

        info!(
            "Started interview {} for {} ({} questions)",
            session.id, session.candidate_name, session.target_count
        );

        let payload = StartPayload {
            intro: format!(
                "Hello {}, I am your AI {} interviewer. I will ask you {} questions. \
                If you don't know an answer, leave it blank and we'll move on.",
                session.candidate_name, self.settings.topic, session.target_count
            ),
            first_question,
            total: session.target_count,
        };

        Ok((session, payload))
    }

    /// Records `answer` and advances the session by one turn.
    ///
    /// If follow-up generation fails the answer stays recorded and the session
    /// stays `IN_PROGRESS`; resubmitting retries only the generation.
    pub async fn submit_answer(
        &self,
        session: &mut Session,
        answer: String,
    ) -> Result<NextStep, InterviewError> {
        match session.state {
            SessionState::AwaitingFirstQuestion => return Err(InterviewError::NotStarted),
            SessionState::Complete => {
                debug!("Session {} already complete; returning stored result", session.id);
                return Ok(completion(session));
            }
            SessionState::InProgress | SessionState::Evaluating => {}
        }

        if session.pending_question().is_some() {
            session.answers.push(answer);
        } else {
            debug!(
                "Session {} has no pending question; retrying follow-up generation",
                session.id
            );
        }

        if session.answers.len() >= session.target_count {
            self.complete(session).await;
            return Ok(completion(session));
        }

        let (Some(prev_question), Some(prev_answer)) = (session.questions.last(), session.answers.last())
        else {
            return Err(InterviewError::NotStarted);
        };

        let difficulty = self.settings.thresholds.next_difficulty(prev_answer);
        debug!("Session {}: next difficulty {}", session.id, difficulty);

        let next_question = self
            .questions
            .followup_question(prev_question, prev_answer, difficulty, &session.questions)
            .await?;
        session.questions.push(next_question.clone());

        Ok(NextStep::InProgress {
            next_question,
            progress: session.questions.len(),
            total: session.target_count,
        })
    }

    async fn complete(&self, session: &mut Session) {
        session.state = SessionState::Evaluating;
        info!(
            "Session {} reached {} answers; evaluating",
            session.id,
            session.answers.len()
        );

        let evaluations = self
            .evaluator
            .evaluate(&session.questions, &session.answers, self.settings.batch_size)
            .await;

        let report = InterviewReport {
            candidate_name: &session.candidate_name,
            topic: &self.settings.topic,
            questions: &session.questions,
            answers: &session.answers,
            evaluations: &evaluations,
        };
        match self.renderer.render(&report).await {
            Ok(path) => session.report = Some(path),
            Err(e) => error!("Report rendering failed for session {}: {}", session.id, e),
        }

        session.evaluations = Some(evaluations);
        session.state = SessionState::Complete;
        info!("Session {} complete", session.id);
    }
}

fn completion(session: &Session) -> NextStep {
    NextStep::Complete {
        message: COMPLETION_MESSAGE.to_string(),
        evaluations: session.evaluations.clone().unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::interview::difficulty::DifficultyLevel;
    use crate::llm_client::testing::{exhausted, ScriptedGenerator};
    use crate::llm_client::LlmError;
    use crate::report::{MarkdownReportWriter, ReportError};

    struct FailingRenderer;

    #[async_trait]
    impl ReportRenderer for FailingRenderer {
        async fn render(&self, _report: &InterviewReport<'_>) -> Result<PathBuf, ReportError> {
            Err(ReportError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only",
            )))
        }
    }

    fn engine(
        llm: &Arc<ScriptedGenerator>,
        dir: &tempfile::TempDir,
        target_count: usize,
    ) -> InterviewEngine {
        InterviewEngine::new(
            llm.clone(),
            Arc::new(MarkdownReportWriter::new(dir.path())),
            InterviewSettings {
                target_count,
                ..InterviewSettings::default()
            },
        )
    }

    fn assert_lead_by_one(session: &Session) {
        assert!(session.answers.len() <= session.questions.len());
        assert!(session.questions.len() <= session.answers.len() + 1);
        assert!(session.questions.len() <= session.target_count + 1);
    }

    #[tokio::test]
    async fn test_start_asks_first_question() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedGenerator::new().reply("1. What is a named range?"));
        let (session, payload) = engine(&llm, &dir, 3).start("s1", "Ada").await.unwrap();

        assert_eq!(session.state, SessionState::InProgress);
        assert_eq!(session.questions, vec!["What is a named range?".to_string()]);
        assert!(session.answers.is_empty());
        assert_eq!(payload.first_question, "What is a named range?");
        assert_eq!(payload.total, 3);
        assert!(payload.intro.contains("Hello Ada"));
        assert!(payload.intro.contains("3 questions"));
    }

    #[tokio::test]
    async fn test_start_failure_surfaces_error() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedGenerator::new().fail(exhausted()));
        let result = engine(&llm, &dir, 3).start("s1", "Ada").await;
        assert!(matches!(
            result,
            Err(InterviewError::Generation(LlmError::Exhausted { .. }))
        ));
    }

    #[tokio::test]
    async fn test_single_blank_answer_completes_with_fallback() {
        let dir = tempfile::tempdir().unwrap();
        // First question succeeds, evaluation finds the script empty and fails.
        let llm = Arc::new(ScriptedGenerator::new().reply("What is a cell?"));
        let engine = engine(&llm, &dir, 1);
        let (mut session, _) = engine.start("s1", "Ada").await.unwrap();

        let step = engine.submit_answer(&mut session, String::new()).await.unwrap();

        let expected = vec![Evaluation {
            score: 0,
            feedback: "No answer provided".into(),
        }];
        assert_eq!(
            step,
            NextStep::Complete {
                message: COMPLETION_MESSAGE.into(),
                evaluations: expected.clone(),
            }
        );
        assert_eq!(session.state, SessionState::Complete);
        assert_eq!(session.evaluations, Some(expected));
        assert!(session.report.as_ref().is_some_and(|p| p.exists()));
    }

    #[tokio::test]
    async fn test_long_answer_requests_harder_followup() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(
            ScriptedGenerator::new()
                .reply("What is conditional formatting?")
                .reply("How would you build a dynamic dashboard?"),
        );
        let engine = engine(&llm, &dir, 3);
        let (mut session, _) = engine.start("s1", "Ada").await.unwrap();

        let answer = vec!["formatting"; 25].join(" ");
        assert_eq!(
            engine.settings().thresholds.next_difficulty(&answer),
            DifficultyLevel::Harder
        );

        let step = engine.submit_answer(&mut session, answer).await.unwrap();

        assert_eq!(
            step,
            NextStep::InProgress {
                next_question: "How would you build a dynamic dashboard?".into(),
                progress: 2,
                total: 3,
            }
        );
        assert!(llm.prompts()[1].contains("Difficulty should be harder."));
        assert_lead_by_one(&session);
    }

    #[tokio::test]
    async fn test_full_interview_scores_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(
            ScriptedGenerator::new()
                .reply("Q one?")
                .reply("Q two?")
                .reply("Q three?")
                .reply(
                    r#"[{"score": 6, "feedback": "f1"}, {"score": 8, "feedback": "f2"}, {"score": 0, "feedback": "f3"}]"#,
                ),
        );
        let engine = engine(&llm, &dir, 3);
        let (mut session, _) = engine.start("s1", "Ada").await.unwrap();

        for answer in ["SUM adds numbers", "AVERAGE divides the sum by count"] {
            let step = engine.submit_answer(&mut session, answer.into()).await.unwrap();
            assert!(matches!(step, NextStep::InProgress { .. }));
            assert_lead_by_one(&session);
        }
        let step = engine.submit_answer(&mut session, String::new()).await.unwrap();

        let NextStep::Complete { evaluations, .. } = step else {
            panic!("expected completion");
        };
        let scores: Vec<u8> = evaluations.iter().map(|e| e.score).collect();
        assert_eq!(scores, vec![6, 8, 0]);
        assert_eq!(session.questions.len(), 3);
        assert_eq!(session.answers.len(), 3);
        assert!(llm.prompts()[3].contains("Q3: Q three?\nA3: No Answer"));
    }

    #[tokio::test]
    async fn test_completion_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(
            ScriptedGenerator::new()
                .reply("What is a chart?")
                .reply(r#"[{"score": 5, "feedback": "Fine"}]"#),
        );
        let engine = engine(&llm, &dir, 1);
        let (mut session, _) = engine.start("s1", "Ada").await.unwrap();

        let first = engine.submit_answer(&mut session, "A picture".into()).await.unwrap();
        let calls = llm.calls();
        let report = session.report.clone();

        let second = engine.submit_answer(&mut session, "again".into()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(llm.calls(), calls);
        assert_eq!(session.answers, vec!["A picture".to_string()]);
        assert_eq!(session.report, report);
    }

    #[tokio::test]
    async fn test_failed_followup_keeps_answer_and_retries_generation_only() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(
            ScriptedGenerator::new()
                .reply("What is a macro?")
                .fail(exhausted())
                .reply("How do you record one?"),
        );
        let engine = engine(&llm, &dir, 3);
        let (mut session, _) = engine.start("s1", "Ada").await.unwrap();

        let err = engine
            .submit_answer(&mut session, "Recorded steps".into())
            .await
            .unwrap_err();
        assert!(matches!(err, InterviewError::Generation(LlmError::Exhausted { .. })));
        assert_eq!(session.state, SessionState::InProgress);
        assert_eq!(session.answers, vec!["Recorded steps".to_string()]);
        assert_eq!(session.questions.len(), 1);
        assert!(session.pending_question().is_none());

        let step = engine
            .submit_answer(&mut session, "Recorded steps".into())
            .await
            .unwrap();

        assert_eq!(
            step,
            NextStep::InProgress {
                next_question: "How do you record one?".into(),
                progress: 2,
                total: 3,
            }
        );
        assert_eq!(session.answers.len(), 1);
        assert_lead_by_one(&session);
    }

    #[tokio::test]
    async fn test_report_failure_still_completes() {
        let llm = Arc::new(ScriptedGenerator::new().reply("What is a cell?"));
        let engine = InterviewEngine::new(
            llm.clone(),
            Arc::new(FailingRenderer),
            InterviewSettings {
                target_count: 1,
                ..InterviewSettings::default()
            },
        );
        let (mut session, _) = engine.start("s1", "Ada").await.unwrap();

        let step = engine.submit_answer(&mut session, "A box".into()).await.unwrap();

        assert!(matches!(step, NextStep::Complete { .. }));
        assert_eq!(session.state, SessionState::Complete);
        assert!(session.report.is_none());
        assert_eq!(session.evaluations.as_ref().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn test_unstarted_session_rejects_answers() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedGenerator::new());
        let mut session = Session::new("s1", "Ada", 2);
        let result = engine(&llm, &dir, 2).submit_answer(&mut session, "x".into()).await;
        assert!(matches!(result, Err(InterviewError::NotStarted)));
        assert!(session.answers.is_empty());
    }

    #[test]
    fn test_next_step_serialization() {
        let step = NextStep::InProgress {
            next_question: "Why?".into(),
            progress: 2,
            total: 20,
        };
        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json["status"], "in_progress");
        assert_eq!(json["next_question"], "Why?");
        assert_eq!(json["progress"], 2);

        let done = NextStep::Complete {
            message: COMPLETION_MESSAGE.into(),
            evaluations: vec![],
        };
        assert_eq!(serde_json::to_value(&done).unwrap()["status"], "complete");
    }

    #[test]
    fn test_target_count_is_at_least_one() {
        assert_eq!(Session::new("s", "c", 0).target_count, 1);
    }
}
