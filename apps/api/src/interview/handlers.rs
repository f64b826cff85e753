//! Axum route handlers for the Interview API.

use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::interview::registry::SharedSession;
use crate::interview::session::NextStep;
use crate::state::AppState;

const DEFAULT_CANDIDATE_NAME: &str = "Candidate";

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct StartInterviewRequest {
    pub session_id: Option<String>,
    #[serde(default)]
    pub candidate_name: String,
}

#[derive(Debug, Serialize)]
pub struct StartInterviewResponse {
    pub session_id: String,
    pub intro: String,
    pub first_question: String,
    pub total: usize,
}

#[derive(Debug, Deserialize)]
pub struct SubmitAnswerRequest {
    /// Blank or missing means the candidate skipped the question.
    #[serde(default)]
    pub answer: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/interviews
///
/// Creates a session, asks the first question and registers the session.
/// Reusing an existing session id restarts that interview.
pub async fn handle_start_interview(
    State(state): State<AppState>,
    Json(request): Json<StartInterviewRequest>,
) -> Result<Json<StartInterviewResponse>, AppError> {
    let session_id = request
        .session_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let candidate_name = match request.candidate_name.trim() {
        "" => DEFAULT_CANDIDATE_NAME.to_string(),
        name => name.to_string(),
    };

    let (session, payload) = state.engine.start(session_id.clone(), candidate_name).await?;

    if state.sessions.exists(&session_id).await {
        info!("Restarting interview {session_id}; previous state discarded");
    }
    state.sessions.insert(session).await;

    Ok(Json(StartInterviewResponse {
        session_id,
        intro: payload.intro,
        first_question: payload.first_question,
        total: payload.total,
    }))
}

/// POST /api/v1/interviews/:id/answers
///
/// Records an answer and returns either the next question or the final
/// evaluations. A 503 means the answer was kept and the request can be retried.
pub async fn handle_submit_answer(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<SubmitAnswerRequest>,
) -> Result<Json<NextStep>, AppError> {
    let session = lookup(&state, &session_id).await?;
    let mut session = session.lock().await;

    let step = state.engine.submit_answer(&mut session, request.answer).await?;
    Ok(Json(step))
}

/// GET /api/v1/interviews/:id/report
///
/// Downloads the rendered report once the interview is complete.
pub async fn handle_download_report(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let session = lookup(&state, &session_id).await?;
    let path = session
        .lock()
        .await
        .report
        .clone()
        .ok_or_else(|| AppError::NotFound("Report not found".to_string()))?;

    let contents = tokio::fs::read(&path).await.map_err(|e| {
        AppError::Internal(anyhow::anyhow!("Failed to read report {}: {e}", path.display()))
    })?;

    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("interview_report.md")
        .to_string();

    Ok((
        [
            (header::CONTENT_TYPE, "text/markdown; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            ),
        ],
        contents,
    ))
}

async fn lookup(state: &AppState, session_id: &str) -> Result<SharedSession, AppError> {
    state
        .sessions
        .get(session_id)
        .await
        .ok_or_else(|| AppError::NotFound("Session not found".to_string()))
}
