// src/models/question.rs

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// How many options a question expects the user to pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionKind {
    SingleAnswer,
    MultiAnswer,
}

impl QuestionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionKind::SingleAnswer => "single-answer",
            QuestionKind::MultiAnswer => "multi-answer",
        }
    }
}

impl std::str::FromStr for QuestionKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single-answer" => Ok(QuestionKind::SingleAnswer),
            "multi-answer" => Ok(QuestionKind::MultiAnswer),
            other => Err(AppError::InvalidArgument(format!(
                "unknown question kind '{other}'"
            ))),
        }
    }
}

/// One selectable option of a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerOption {
    pub id: String,
    pub text: String,
}

/// Canonical question of an exam set. Read-only reference data owned by the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,

    pub exam_id: String,

    pub exam_set_id: String,

    pub kind: QuestionKind,

    /// Options in display order.
    pub options: Vec<AnswerOption>,

    /// Ids of the correct options.
    pub correct_answers: Vec<String>,

    /// Free-text category used to bucket accuracy statistics (e.g. "Compute").
    pub domain: String,
}

impl Question {
    /// Checks that the correct answers are distinct, reference existing options and
    /// that a single-answer question has exactly one of them.
    pub fn validate(&self) -> Result<(), AppError> {
        let option_ids: HashSet<&str> = self.options.iter().map(|o| o.id.as_str()).collect();

        let distinct: HashSet<&str> = self.correct_answers.iter().map(String::as_str).collect();
        if distinct.len() != self.correct_answers.len() {
            return Err(AppError::InvalidArgument(format!(
                "question {}: correct answers contain duplicates",
                self.id
            )));
        }

        if let Some(unknown) = self
            .correct_answers
            .iter()
            .find(|id| !option_ids.contains(id.as_str()))
        {
            return Err(AppError::InvalidArgument(format!(
                "question {}: correct answer '{}' is not one of its options",
                self.id, unknown
            )));
        }

        if self.kind == QuestionKind::SingleAnswer && self.correct_answers.len() != 1 {
            return Err(AppError::InvalidArgument(format!(
                "question {}: single-answer question must have exactly one correct answer, found {}",
                self.id,
                self.correct_answers.len()
            )));
        }

        Ok(())
    }
}
