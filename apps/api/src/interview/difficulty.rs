//! Difficulty adaptation — picks the next question's difficulty from the
//! length of the latest answer. Pure and deterministic.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyLevel {
    Easier,
    Medium,
    Harder,
}

impl DifficultyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DifficultyLevel::Easier => "easier",
            DifficultyLevel::Medium => "medium",
            DifficultyLevel::Harder => "harder",
        }
    }
}

impl fmt::Display for DifficultyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Word-count bounds for the heuristic. An answer below `min_words` steps
/// down, above `max_words` steps up; both bounds are inclusive for `Medium`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DifficultyThresholds {
    pub min_words: usize,
    pub max_words: usize,
}

impl Default for DifficultyThresholds {
    fn default() -> Self {
        Self {
            min_words: 3,
            max_words: 20,
        }
    }
}

impl DifficultyThresholds {
    pub fn next_difficulty(&self, answer: &str) -> DifficultyLevel {
        let words = answer.split_whitespace().count();
        if words == 0 || words < self.min_words {
            DifficultyLevel::Easier
        } else if words > self.max_words {
            DifficultyLevel::Harder
        } else {
            DifficultyLevel::Medium
        }
    }
}

/// `next_difficulty` with the default thresholds (3 and 20 words).
pub fn next_difficulty(answer: &str) -> DifficultyLevel {
    DifficultyThresholds::default().next_difficulty(answer)
}
