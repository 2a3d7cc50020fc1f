// src/models/stats.rs

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::AppError,
    models::attempt::Attempt,
    services::scoring::DomainTally,
};

/// Cumulative accuracy for one domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainScore {
    pub domain_name: String,
    pub correct_count: i64,
    pub total_count: i64,
    /// Percentage 0-100, always derived from the two counts above.
    pub accuracy_rate: i64,
}

impl DomainScore {
    pub fn new(domain_name: &str) -> Self {
        Self {
            domain_name: domain_name.to_string(),
            correct_count: 0,
            total_count: 0,
            accuracy_rate: 0,
        }
    }

    /// Adds one attempt's tally and recomputes the rate from the cumulative counts.
    pub fn record(&mut self, tally: DomainTally) {
        self.correct_count += tally.correct;
        self.total_count += tally.total;
        self.accuracy_rate = percentage(self.correct_count, self.total_count).round() as i64;
    }
}

/// Cumulative scorecard of one user for one exam.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserExamStats {
    pub user_id: String,
    pub exam_id: String,
    pub total_attempts: i64,

    /// Sum of the scores of every completed attempt.
    pub total_correct: i64,

    /// Sum of the question-set sizes of every completed attempt.
    pub total_questions_answered: i64,

    pub domain_stats: BTreeMap<String, DomainScore>,
    pub last_taken_at: Option<DateTime<Utc>>,
}

impl UserExamStats {
    pub fn new(user_id: &str, exam_id: &str) -> Result<Self, AppError> {
        if user_id.is_empty() || exam_id.is_empty() {
            return Err(AppError::InvalidArgument(
                "user id and exam id are required for exam stats".to_string(),
            ));
        }
        Ok(Self {
            user_id: user_id.to_string(),
            exam_id: exam_id.to_string(),
            total_attempts: 0,
            total_correct: 0,
            total_questions_answered: 0,
            domain_stats: BTreeMap::new(),
            last_taken_at: None,
        })
    }

    /// Overall percentage of correct answers across all completed attempts.
    pub fn average_score(&self) -> f64 {
        percentage(self.total_correct, self.total_questions_answered)
    }
}

fn percentage(correct: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    correct as f64 / total as f64 * 100.0
}

/// Folds one completed attempt into the user's stats for its exam.
///
/// The overall counters use the full question-set size as denominator, while the
/// domain counters only see questions that were actually answered.
pub fn fold(
    stats: Option<UserExamStats>,
    attempt: &Attempt,
    per_domain: &BTreeMap<String, DomainTally>,
) -> Result<UserExamStats, AppError> {
    let mut stats = match stats {
        Some(stats) => stats,
        None => UserExamStats::new(&attempt.user_id, &attempt.exam_id)?,
    };

    stats.total_attempts += 1;
    stats.total_correct += attempt.score;
    stats.total_questions_answered += attempt.total_questions;
    stats.last_taken_at = Some(attempt.completed_at.unwrap_or(attempt.updated_at));

    for (domain, tally) in per_domain {
        stats
            .domain_stats
            .entry(domain.clone())
            .or_insert_with(|| DomainScore::new(domain))
            .record(*tally);
    }

    Ok(stats)
}

/// DTO for returning a user's stats with the derived average.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub user_id: String,
    pub exam_id: String,
    pub total_attempts: i64,
    pub total_correct: i64,
    pub total_questions_answered: i64,
    pub average_score: f64,
    pub domain_stats: BTreeMap<String, DomainScore>,
    pub last_taken_at: Option<DateTime<Utc>>,
}

impl From<UserExamStats> for StatsResponse {
    fn from(stats: UserExamStats) -> Self {
        Self {
            average_score: stats.average_score(),
            user_id: stats.user_id,
            exam_id: stats.exam_id,
            total_attempts: stats.total_attempts,
            total_correct: stats.total_correct,
            total_questions_answered: stats.total_questions_answered,
            domain_stats: stats.domain_stats,
            last_taken_at: stats.last_taken_at,
        }
    }
}
