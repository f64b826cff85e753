use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{ensure, Context, Result};

use crate::interview::difficulty::DifficultyThresholds;
use crate::interview::evaluator::{DEFAULT_BATCH_SIZE, DEFAULT_MAX_ANSWER_WORDS};
use crate::interview::session::InterviewSettings;
use crate::llm_client::{DEFAULT_API_URL, DEFAULT_MODEL};

/// Application configuration loaded from environment variables.
///
/// The generation credential is optional at startup: a missing key surfaces
/// as a configuration error on the first generation call instead.
#[derive(Clone)]
pub struct Config {
    pub groq_api_key: Option<String>,
    pub groq_api_url: String,
    pub groq_model: String,
    pub port: u16,
    pub rust_log: String,
    pub reports_dir: PathBuf,
    pub interview: InterviewSettings,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let defaults = InterviewSettings::default();
        let default_thresholds = DifficultyThresholds::default();

        let interview = InterviewSettings {
            topic: env_or("INTERVIEW_TOPIC", &defaults.topic),
            target_count: parse_env("INTERVIEW_TOTAL_QUESTIONS", defaults.target_count)?,
            batch_size: parse_env("EVALUATION_BATCH_SIZE", DEFAULT_BATCH_SIZE)?,
            max_answer_words: parse_env("EVALUATION_MAX_ANSWER_WORDS", DEFAULT_MAX_ANSWER_WORDS)?,
            thresholds: DifficultyThresholds {
                min_words: parse_env("DIFFICULTY_MIN_WORDS", default_thresholds.min_words)?,
                max_words: parse_env("DIFFICULTY_MAX_WORDS", default_thresholds.max_words)?,
            },
        };
        validate_interview(&interview)?;

        Ok(Config {
            groq_api_key: std::env::var("GROQ_API_KEY").ok(),
            groq_api_url: env_or("GROQ_API_URL", DEFAULT_API_URL),
            groq_model: env_or("GROQ_MODEL", DEFAULT_MODEL),
            port: parse_env("PORT", 8080)?,
            rust_log: env_or("RUST_LOG", "info"),
            reports_dir: PathBuf::from(env_or("REPORTS_DIR", "reports")),
            interview,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    parse_value(key, std::env::var(key).ok(), default)
}

fn parse_value<T>(key: &str, raw: Option<String>, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(default),
        Some(value) => value
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("{key} has an invalid value '{value}'")),
    }
}

fn validate_interview(settings: &InterviewSettings) -> Result<()> {
    ensure!(
        settings.target_count >= 1,
        "INTERVIEW_TOTAL_QUESTIONS must be at least 1"
    );
    ensure!(settings.batch_size >= 1, "EVALUATION_BATCH_SIZE must be at least 1");
    ensure!(
        settings.max_answer_words >= 1,
        "EVALUATION_MAX_ANSWER_WORDS must be at least 1"
    );
    ensure!(
        settings.thresholds.min_words <= settings.thresholds.max_words,
        "DIFFICULTY_MIN_WORDS must not exceed DIFFICULTY_MAX_WORDS"
    );
    Ok(())
}
