use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

pub const DEFAULT_PASSING_SCORE: u8 = 70;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

/// A single multiple-choice question. An option's position is its identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub prompt: String,
    pub options: Vec<String>,
    pub correct_option_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}

/// An exam as supplied by a catalog. Sessions only ever read it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamDefinition {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub difficulty: Difficulty,
    pub duration_seconds: u64,
    #[serde(default = "default_passing_score")]
    pub passing_score: u8,
    pub questions: Vec<Question>,
}

fn default_passing_score() -> u8 {
    DEFAULT_PASSING_SCORE
}

/// Structural defects that make an exam unusable for a session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidExam {
    #[error("exam has no questions")]
    NoQuestions,
    #[error("exam duration must be positive")]
    NonPositiveDuration,
    #[error("passing score {0} is outside 0..=100")]
    PassingScoreOutOfRange(u8),
    #[error("question '{0}' appears more than once")]
    DuplicateQuestionId(String),
    #[error("question '{0}' needs at least two options")]
    TooFewOptions(String),
    #[error("question '{question_id}' marks option {index} correct but has {option_count} options")]
    CorrectOptionOutOfRange {
        question_id: String,
        index: usize,
        option_count: usize,
    },
}

impl Question {
    pub fn validate(&self) -> Result<(), InvalidExam> {
        if self.options.len() < 2 {
            return Err(InvalidExam::TooFewOptions(self.id.clone()));
        }
        if self.correct_option_index >= self.options.len() {
            return Err(InvalidExam::CorrectOptionOutOfRange {
                question_id: self.id.clone(),
                index: self.correct_option_index,
                option_count: self.options.len(),
            });
        }
        Ok(())
    }
}

impl ExamDefinition {
    /// Checks everything a session relies on. Cheap; called on every start.
    pub fn validate(&self) -> Result<(), InvalidExam> {
        if self.questions.is_empty() {
            return Err(InvalidExam::NoQuestions);
        }
        if self.duration_seconds == 0 {
            return Err(InvalidExam::NonPositiveDuration);
        }
        if self.passing_score > 100 {
            return Err(InvalidExam::PassingScoreOutOfRange(self.passing_score));
        }

        let mut seen = HashSet::new();
        for question in &self.questions {
            if !seen.insert(question.id.as_str()) {
                return Err(InvalidExam::DuplicateQuestionId(question.id.clone()));
            }
            question.validate()?;
        }

        Ok(())
    }

    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    pub fn duration_minutes(&self) -> u64 {
        self.duration_seconds.div_ceil(60)
    }

    pub fn summary(&self, source: CatalogSource) -> ExamSummary {
        ExamSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            category: self.category.clone(),
            difficulty: self.difficulty,
            question_count: self.questions.len(),
            duration_seconds: self.duration_seconds,
            passing_score: self.passing_score,
            source,
        }
    }

    /// Next free question id of the form `q<n>`.
    pub fn next_question_id(&self) -> String {
        let mut n = self.questions.len() + 1;
        loop {
            let candidate = format!("q{n}");
            if !self.questions.iter().any(|q| q.id == candidate) {
                return candidate;
            }
            n += 1;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CatalogSource {
    Builtin,
    Local,
}

/// Listing entry for the exam picker and `tryout list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamSummary {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub difficulty: Difficulty,
    pub question_count: usize,
    pub duration_seconds: u64,
    pub passing_score: u8,
    pub source: CatalogSource,
}
