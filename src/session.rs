//! Timed exam session engine.
//!
//! One [`ExamSession`] is one attempt at one exam. All operations are
//! synchronous transitions over in-memory state; the caller owns the session
//! and re-renders from [`ExamSession::snapshot`] after every call.
//!
//! ```text
//!         start()                 tick()->0 / submit()
//!  [none] --------> InProgress -------------------------> Submitted
//!                       | ^                                   |
//!           select_answer/go_to (self-loop)              retry() -> new InProgress
//! ```

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::exam::{ExamDefinition, InvalidExam};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("invalid exam: {0}")]
    InvalidExam(#[from] InvalidExam),
    #[error("the attempt has already been submitted")]
    InvalidState,
    #[error("option {option_index} does not exist (question has {option_count} options)")]
    InvalidInput {
        option_index: usize,
        option_count: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
pub enum SessionStatus {
    InProgress,
    Submitted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Next,
    Previous,
}

/// How an attempt reached `Submitted`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SubmitReason {
    Manual,
    TimeExpired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamResult {
    pub score_percent: u8,
    pub correct_count: usize,
    pub total_questions: usize,
    pub passed: bool,
}

/// Outcome of a single clock tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Counting(u64),
    Expired,
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AnswerOutcome {
    Correct,
    Incorrect,
    Unanswered,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuestionReview {
    pub number: usize,
    pub prompt: String,
    pub selected: Option<usize>,
    pub correct_option_index: usize,
    pub outcome: AnswerOutcome,
}

/// Read-only view of a session handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub exam_id: String,
    pub exam_title: String,
    pub current_question_index: usize,
    pub question_count: usize,
    pub prompt: String,
    pub topic: Option<String>,
    pub options: Vec<String>,
    pub selected: Option<usize>,
    pub answers: Vec<Option<usize>>,
    pub answered_count: usize,
    pub remaining_seconds: u64,
    pub status: SessionStatus,
    pub result: Option<ExamResult>,
    pub submitted_by: Option<SubmitReason>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExamSession {
    exam: Arc<ExamDefinition>,
    current_question_index: usize,
    /// `None` is the unanswered marker; length always equals the question count.
    answers: Vec<Option<usize>>,
    remaining_seconds: u64,
    status: SessionStatus,
    result: Option<ExamResult>,
    submitted_by: Option<SubmitReason>,
}

impl ExamSession {
    pub fn start(exam: Arc<ExamDefinition>) -> Result<Self, SessionError> {
        exam.validate()?;
        tracing::info!(
            exam_id = %exam.id,
            questions = exam.questions.len(),
            duration_seconds = exam.duration_seconds,
            "exam session started"
        );
        Ok(Self::fresh(exam))
    }

    fn fresh(exam: Arc<ExamDefinition>) -> Self {
        Self {
            answers: vec![None; exam.questions.len()],
            remaining_seconds: exam.duration_seconds,
            current_question_index: 0,
            status: SessionStatus::InProgress,
            result: None,
            submitted_by: None,
            exam,
        }
    }

    /// Brand-new attempt at the same exam; nothing carries over.
    pub fn retry(&self) -> ExamSession {
        tracing::info!(exam_id = %self.exam.id, "exam session retried");
        Self::fresh(Arc::clone(&self.exam))
    }

    // queries

    pub fn exam(&self) -> &ExamDefinition {
        &self.exam
    }

    pub fn exam_handle(&self) -> Arc<ExamDefinition> {
        Arc::clone(&self.exam)
    }

    pub fn current_question_index(&self) -> usize {
        self.current_question_index
    }

    pub fn answers(&self) -> &[Option<usize>] {
        &self.answers
    }

    pub fn remaining_seconds(&self) -> u64 {
        self.remaining_seconds
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.exam.duration_seconds - self.remaining_seconds
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_in_progress(&self) -> bool {
        self.status == SessionStatus::InProgress
    }

    pub fn result(&self) -> Option<&ExamResult> {
        self.result.as_ref()
    }

    pub fn submitted_by(&self) -> Option<SubmitReason> {
        self.submitted_by
    }

    pub fn answered_count(&self) -> usize {
        self.answers.iter().filter(|a| a.is_some()).count()
    }

    pub fn unanswered_count(&self) -> usize {
        self.answers.len() - self.answered_count()
    }

    /// Position through the exam as shown on the progress bar.
    pub fn progress_percent(&self) -> u8 {
        round_half_up_percent(self.current_question_index + 1, self.answers.len())
    }

    // commands

    pub fn select_answer(&mut self, option_index: usize) -> Result<(), SessionError> {
        self.ensure_in_progress()?;
        let option_count = self.exam.questions[self.current_question_index].options.len();
        if option_index >= option_count {
            return Err(SessionError::InvalidInput {
                option_index,
                option_count,
            });
        }
        self.answers[self.current_question_index] = Some(option_index);
        Ok(())
    }

    pub fn clear_answer(&mut self) -> Result<(), SessionError> {
        self.ensure_in_progress()?;
        self.answers[self.current_question_index] = None;
        Ok(())
    }

    /// Moves one question forward or back. Moving past either end is a no-op.
    pub fn go_to(&mut self, direction: Direction) -> Result<(), SessionError> {
        self.ensure_in_progress()?;
        let last = self.answers.len() - 1;
        self.current_question_index = match direction {
            Direction::Next => (self.current_question_index + 1).min(last),
            Direction::Previous => self.current_question_index.saturating_sub(1),
        };
        Ok(())
    }

    /// Advances the countdown by one second, submitting when it reaches zero.
    pub fn tick(&mut self) -> Tick {
        if !self.is_in_progress() {
            return Tick::Ignored;
        }
        self.remaining_seconds = self.remaining_seconds.saturating_sub(1);
        if self.remaining_seconds == 0 {
            self.finish(SubmitReason::TimeExpired);
            Tick::Expired
        } else {
            Tick::Counting(self.remaining_seconds)
        }
    }

    /// Scores the attempt. Unanswered questions count as incorrect.
    /// Calling this on a submitted session returns the stored result.
    pub fn submit(&mut self) -> &ExamResult {
        self.finish(SubmitReason::Manual)
    }

    fn finish(&mut self, reason: SubmitReason) -> &ExamResult {
        let result = match self.result {
            Some(stored) => {
                tracing::debug!(exam_id = %self.exam.id, "duplicate submit ignored");
                stored
            }
            None => {
                let result = score(&self.exam, &self.answers);
                tracing::info!(
                    exam_id = %self.exam.id,
                    reason = %reason,
                    score = result.score_percent,
                    correct = result.correct_count,
                    total = result.total_questions,
                    remaining_seconds = self.remaining_seconds,
                    "exam session submitted"
                );
                self.status = SessionStatus::Submitted;
                self.submitted_by = Some(reason);
                result
            }
        };

        self.result.insert(result)
    }

    fn ensure_in_progress(&self) -> Result<(), SessionError> {
        if self.is_in_progress() {
            Ok(())
        } else {
            Err(SessionError::InvalidState)
        }
    }

    // views

    pub fn snapshot(&self) -> SessionSnapshot {
        let question = &self.exam.questions[self.current_question_index];
        SessionSnapshot {
            exam_id: self.exam.id.clone(),
            exam_title: self.exam.title.clone(),
            current_question_index: self.current_question_index,
            question_count: self.answers.len(),
            prompt: question.prompt.clone(),
            topic: question.topic.clone(),
            options: question.options.clone(),
            selected: self.answers[self.current_question_index],
            answers: self.answers.clone(),
            answered_count: self.answered_count(),
            remaining_seconds: self.remaining_seconds,
            status: self.status,
            result: self.result,
            submitted_by: self.submitted_by,
        }
    }

    /// Per-question breakdown; only available once the attempt is submitted.
    pub fn review(&self) -> Option<Vec<QuestionReview>> {
        self.result?;
        Some(
            self.exam
                .questions
                .iter()
                .zip(&self.answers)
                .enumerate()
                .map(|(i, (question, selected))| QuestionReview {
                    number: i + 1,
                    prompt: question.prompt.clone(),
                    selected: *selected,
                    correct_option_index: question.correct_option_index,
                    outcome: match selected {
                        None => AnswerOutcome::Unanswered,
                        Some(s) if *s == question.correct_option_index => AnswerOutcome::Correct,
                        Some(_) => AnswerOutcome::Incorrect,
                    },
                })
                .collect(),
        )
    }
}

fn score(exam: &ExamDefinition, answers: &[Option<usize>]) -> ExamResult {
    let correct_count = exam
        .questions
        .iter()
        .zip(answers)
        .filter(|(question, answer)| **answer == Some(question.correct_option_index))
        .count();
    let total_questions = exam.questions.len();
    let score_percent = round_half_up_percent(correct_count, total_questions);

    ExamResult {
        score_percent,
        correct_count,
        total_questions,
        passed: score_percent >= exam.passing_score,
    }
}

/// `round(100 * part / whole)` with halves rounded up, in integer arithmetic.
pub fn round_half_up_percent(part: usize, whole: usize) -> u8 {
    if whole == 0 {
        return 0;
    }
    ((200 * part + whole) / (2 * whole)).min(100) as u8
}
