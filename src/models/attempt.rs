// src/models/attempt.rs

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    error::AppError,
    models::question::Question,
    services::scoring::{ScoreOutcome, score_questions},
};

/// Selected option ids keyed by question id.
pub type AnswerMap = HashMap<String, Vec<String>>;

/// Lifecycle state of an attempt. `Completed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    InProgress,
    Completed,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::InProgress => "in_progress",
            AttemptStatus::Completed => "completed",
        }
    }
}

impl std::str::FromStr for AttemptStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(AttemptStatus::InProgress),
            "completed" => Ok(AttemptStatus::Completed),
            other => Err(AppError::Internal(format!(
                "unknown attempt status '{other}'"
            ))),
        }
    }
}

/// One user's pass through an exam set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub id: String,
    pub user_id: String,
    pub exam_id: String,
    pub exam_set_id: String,
    pub status: AttemptStatus,

    /// Number of correct answers. Meaningful only once completed.
    pub score: i64,

    /// Size of the question set when the attempt was started.
    pub total_questions: i64,

    /// UI bookmark; never used for scoring.
    pub current_index: i64,

    pub answers: AnswerMap,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Attempt {
    /// Creates a fresh `in_progress` attempt with no answers and a zero score.
    pub fn new(
        id: String,
        user_id: String,
        exam_id: String,
        exam_set_id: String,
        total_questions: i64,
        now: DateTime<Utc>,
    ) -> Result<Self, AppError> {
        if id.is_empty() || user_id.is_empty() || exam_id.is_empty() || exam_set_id.is_empty() {
            return Err(AppError::InvalidArgument(
                "attempt id, user id, exam id and exam set id are required".to_string(),
            ));
        }
        if total_questions < 0 {
            return Err(AppError::InvalidArgument(
                "total questions cannot be negative".to_string(),
            ));
        }

        Ok(Self {
            id,
            user_id,
            exam_id,
            exam_set_id,
            status: AttemptStatus::InProgress,
            score: 0,
            total_questions,
            current_index: 0,
            answers: AnswerMap::new(),
            started_at: now,
            updated_at: now,
            completed_at: None,
        })
    }

    pub fn is_completed(&self) -> bool {
        self.status == AttemptStatus::Completed
    }

    fn ensure_in_progress(&self) -> Result<(), AppError> {
        if self.is_completed() {
            return Err(AppError::FailedPrecondition(format!(
                "attempt {} is already completed",
                self.id
            )));
        }
        Ok(())
    }

    /// Key-by-key merge: submitted keys overwrite, unseen keys are preserved.
    fn merge_answers(&mut self, answers: AnswerMap) {
        self.answers.extend(answers);
    }

    /// Records interim progress. Rejected once the attempt is completed.
    pub fn save_progress(
        &mut self,
        current_index: i64,
        answers: AnswerMap,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.ensure_in_progress()?;

        self.current_index = current_index;
        self.merge_answers(answers);
        self.updated_at = now;
        Ok(())
    }

    /// Merges the final answers, scores the merged map and freezes the attempt.
    ///
    /// Leaves the attempt untouched and fails with `FailedPrecondition` if it was
    /// already completed.
    pub fn complete(
        &mut self,
        final_answers: AnswerMap,
        questions: &[Question],
        now: DateTime<Utc>,
    ) -> Result<ScoreOutcome, AppError> {
        self.ensure_in_progress()?;

        self.merge_answers(final_answers);
        let outcome = score_questions(questions, &self.answers);

        self.score = outcome.total_correct;
        self.status = AttemptStatus::Completed;
        self.completed_at = Some(now);
        self.updated_at = now;

        Ok(outcome)
    }
}

/// Rejects answer maps with blank question or option ids.
fn check_answers(answers: &AnswerMap) -> Result<(), AppError> {
    for (question_id, options) in answers {
        if question_id.trim().is_empty() {
            return Err(AppError::InvalidArgument(
                "malformed answer map: question id cannot be empty".to_string(),
            ));
        }
        if options.iter().any(|o| o.trim().is_empty()) {
            return Err(AppError::InvalidArgument(format!(
                "malformed answer map: question {question_id} has an empty option id"
            )));
        }
    }
    Ok(())
}

fn require_user(user_id: &str) -> Result<(), AppError> {
    if user_id.is_empty() {
        return Err(AppError::Unauthenticated("user id is required".to_string()));
    }
    Ok(())
}

/// DTO for starting an attempt.
#[derive(Debug, Deserialize, Validate)]
pub struct StartAttemptRequest {
    #[validate(length(min = 1, max = 200))]
    pub exam_id: String,
    #[validate(length(min = 1, max = 200))]
    pub exam_set_id: String,
}

/// DTO for saving in-progress answers. Checked by `SaveProgress::new`.
#[derive(Debug, Deserialize)]
pub struct SaveProgressRequest {
    #[serde(default)]
    pub current_index: i64,

    #[serde(default)]
    pub answers: AnswerMap,
}

/// DTO for completing an attempt. Checked by `CompleteAttempt::new`.
#[derive(Debug, Deserialize)]
pub struct CompleteAttemptRequest {
    /// Final answers, merged over whatever was saved before.
    #[serde(default)]
    pub answers: AnswerMap,
}

/// Validated input for `AttemptService::start_attempt`.
#[derive(Debug, Clone)]
pub struct StartAttempt {
    pub user_id: String,
    pub exam_id: String,
    pub exam_set_id: String,
}

impl StartAttempt {
    pub fn new(user_id: &str, exam_id: &str, exam_set_id: &str) -> Result<Self, AppError> {
        require_user(user_id)?;
        if exam_id.is_empty() || exam_set_id.is_empty() {
            return Err(AppError::InvalidArgument(
                "exam id and exam set id are required".to_string(),
            ));
        }
        Ok(Self {
            user_id: user_id.to_string(),
            exam_id: exam_id.to_string(),
            exam_set_id: exam_set_id.to_string(),
        })
    }
}

/// Validated input for `AttemptService::save_progress`.
#[derive(Debug, Clone)]
pub struct SaveProgress {
    pub user_id: String,
    pub attempt_id: String,
    pub current_index: i64,
    pub answers: AnswerMap,
}

impl SaveProgress {
    pub fn new(
        user_id: &str,
        attempt_id: &str,
        current_index: i64,
        answers: AnswerMap,
    ) -> Result<Self, AppError> {
        require_user(user_id)?;
        if attempt_id.is_empty() {
            return Err(AppError::InvalidArgument("attempt id is required".to_string()));
        }
        if current_index < 0 {
            return Err(AppError::InvalidArgument(
                "current index cannot be negative".to_string(),
            ));
        }
        check_answers(&answers)?;
        Ok(Self {
            user_id: user_id.to_string(),
            attempt_id: attempt_id.to_string(),
            current_index,
            answers,
        })
    }
}

/// Validated input for `AttemptService::complete_attempt`.
#[derive(Debug, Clone)]
pub struct CompleteAttempt {
    pub user_id: String,
    pub attempt_id: String,
    pub answers: AnswerMap,
}

impl CompleteAttempt {
    pub fn new(user_id: &str, attempt_id: &str, answers: AnswerMap) -> Result<Self, AppError> {
        require_user(user_id)?;
        if attempt_id.is_empty() {
            return Err(AppError::InvalidArgument("attempt id is required".to_string()));
        }
        check_answers(&answers)?;
        Ok(Self {
            user_id: user_id.to_string(),
            attempt_id: attempt_id.to_string(),
            answers,
        })
    }
}
