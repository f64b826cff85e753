//! Interview report rendering.
//!
//! The engine hands a completed transcript to a `ReportRenderer` and stores
//! the returned handle on the session. The default renderer writes Markdown
//! files into a reports directory.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::interview::evaluator::Evaluation;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write report: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything a renderer needs from a completed session.
#[derive(Debug, Clone, Copy)]
pub struct InterviewReport<'a> {
    pub candidate_name: &'a str,
    pub topic: &'a str,
    pub questions: &'a [String],
    pub answers: &'a [String],
    pub evaluations: &'a [Evaluation],
}

impl InterviewReport<'_> {
    /// Mean score rounded to two decimals; 0.0 when nothing was scored.
    pub fn average_score(&self) -> f64 {
        if self.evaluations.is_empty() {
            return 0.0;
        }
        let total: u32 = self.evaluations.iter().map(|e| u32::from(e.score)).sum();
        let avg = f64::from(total) / self.evaluations.len() as f64;
        (avg * 100.0).round() / 100.0
    }
}

#[async_trait]
pub trait ReportRenderer: Send + Sync {
    /// Persists the report and returns its location.
    async fn render(&self, report: &InterviewReport<'_>) -> Result<PathBuf, ReportError>;
}

pub struct MarkdownReportWriter {
    dir: PathBuf,
}

impl MarkdownReportWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ReportRenderer for MarkdownReportWriter {
    async fn render(&self, report: &InterviewReport<'_>) -> Result<PathBuf, ReportError> {
        let now = Utc::now();
        tokio::fs::create_dir_all(&self.dir).await?;

        let suffix = Uuid::new_v4().simple().to_string();
        let file_name = format!(
            "{}_{}_{}.md",
            file_stem(report.candidate_name),
            now.format("%Y%m%d_%H%M%S"),
            &suffix[..8]
        );
        let path = self.dir.join(file_name);

        tokio::fs::write(&path, render_markdown(report, now)).await?;
        info!("Report written to {}", path.display());
        Ok(path)
    }
}

/// Renders the report body: header, score table, average, then every Q/A
/// with its feedback.
pub fn render_markdown(report: &InterviewReport<'_>, generated_at: DateTime<Utc>) -> String {
    let mut out = String::new();

    out.push_str(&format!("# {} Mock Interview Report\n\n", report.topic));
    out.push_str(&format!("**Candidate:** {}  \n", report.candidate_name));
    out.push_str(&format!("**Topic:** {} Interview  \n", report.topic));
    out.push_str(&format!(
        "**Date:** {}\n\n",
        generated_at.format("%Y-%m-%d %H:%M UTC")
    ));

    out.push_str("| Q # | Score (0-10) |\n|-----|--------------|\n");
    for (i, evaluation) in report.evaluations.iter().enumerate() {
        out.push_str(&format!("| {} | {} |\n", i + 1, evaluation.score));
    }
    out.push_str(&format!(
        "\n**Average Score:** {} / 10\n\n## Detailed Responses\n\n",
        report.average_score()
    ));

    let rows = report
        .questions
        .iter()
        .zip(report.answers)
        .zip(report.evaluations);
    for (i, ((question, answer), evaluation)) in rows.enumerate() {
        let answer = if answer.trim().is_empty() {
            "No Answer"
        } else {
            answer.as_str()
        };
        out.push_str(&format!("### Q{}: {}\n\n", i + 1, question));
        out.push_str(&format!("**Answer:** {answer}  \n"));
        out.push_str(&format!("**Score:** {}  \n", evaluation.score));
        out.push_str(&format!("**Feedback:** {}\n\n", evaluation.feedback));
    }

    out
}

fn file_stem(candidate_name: &str) -> String {
    let stem: String = candidate_name
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    if stem.is_empty() {
        "candidate".to_string()
    } else {
        stem
    }
}
