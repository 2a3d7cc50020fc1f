// src/services/attempt.rs

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::{
    config::Config,
    error::AppError,
    models::{
        attempt::{Attempt, CompleteAttempt, SaveProgress, StartAttempt},
        stats::{self, UserExamStats},
    },
    repository::{Store, Transaction, run_in_transaction},
};

/// Attempt lifecycle operations. Every operation is one optimistic transaction
/// bounded by a deadline; nothing is cached between calls.
#[derive(Clone)]
pub struct AttemptService {
    store: Arc<dyn Store>,
    tx_max_attempts: u32,
    tx_timeout: Duration,
}

impl AttemptService {
    pub fn new(store: Arc<dyn Store>, config: &Config) -> Self {
        Self::with_limits(store, config.tx_max_attempts, config.tx_timeout)
    }

    pub fn with_limits(store: Arc<dyn Store>, tx_max_attempts: u32, tx_timeout: Duration) -> Self {
        Self {
            store,
            tx_max_attempts,
            tx_timeout,
        }
    }

    /// Runs a unit of work through the retry envelope under the configured deadline.
    /// An expired deadline drops the open transaction, which rolls it back.
    async fn transact<T, F>(&self, operation: &str, unit_of_work: F) -> Result<T, AppError>
    where
        T: Send,
        F: for<'t> FnMut(&'t mut dyn Transaction) -> BoxFuture<'t, Result<T, AppError>> + Send,
    {
        tokio::time::timeout(
            self.tx_timeout,
            run_in_transaction(self.store.as_ref(), self.tx_max_attempts, unit_of_work),
        )
        .await
        .map_err(|_| {
            AppError::Internal(format!(
                "{operation}: deadline of {:?} exceeded",
                self.tx_timeout
            ))
        })?
    }

    /// Creates an `in_progress` attempt sized to the exam set.
    pub async fn start_attempt(&self, input: StartAttempt) -> Result<Attempt, AppError> {
        let attempt = self
            .transact("start attempt", move |tx| {
                let input = input.clone();
                Box::pin(async move { start_within(tx, input).await })
            })
            .await?;

        tracing::info!(
            user_id = %attempt.user_id,
            attempt_id = %attempt.id,
            total_questions = attempt.total_questions,
            "Attempt started"
        );
        Ok(attempt)
    }

    pub async fn get_attempt(&self, user_id: &str, attempt_id: &str) -> Result<Attempt, AppError> {
        if user_id.is_empty() {
            return Err(AppError::Unauthenticated("user id is required".to_string()));
        }
        let (user_id, attempt_id) = (user_id.to_string(), attempt_id.to_string());

        self.transact("get attempt", move |tx| {
            let (user_id, attempt_id) = (user_id.clone(), attempt_id.clone());
            Box::pin(async move { load_attempt(tx, &user_id, &attempt_id).await })
        })
        .await
    }

    /// Stores the navigation index and merges partial answers into the attempt.
    pub async fn save_progress(&self, input: SaveProgress) -> Result<Attempt, AppError> {
        self.transact("save progress", move |tx| {
            let input = input.clone();
            Box::pin(async move {
                let mut attempt = load_attempt(tx, &input.user_id, &input.attempt_id).await?;
                attempt.save_progress(input.current_index, input.answers, Utc::now())?;
                tx.save_attempt(&attempt).await?;
                Ok(attempt)
            })
        })
        .await
    }

    /// Scores and completes an attempt and folds the result into the user's exam
    /// stats, atomically. A second completion of the same attempt fails with
    /// `FailedPrecondition` and changes nothing.
    pub async fn complete_attempt(&self, input: CompleteAttempt) -> Result<Attempt, AppError> {
        let (user_id, attempt_id) = (input.user_id.clone(), input.attempt_id.clone());

        let result = self
            .transact("complete attempt", move |tx| {
                let input = input.clone();
                Box::pin(async move { complete_within(tx, &input).await })
            })
            .await;

        match &result {
            Ok(attempt) => tracing::info!(
                user_id = %user_id,
                attempt_id = %attempt_id,
                score = attempt.score,
                total_questions = attempt.total_questions,
                "Attempt completed"
            ),
            Err(AppError::FailedPrecondition(reason)) => tracing::info!(
                user_id = %user_id,
                attempt_id = %attempt_id,
                "Completion rejected: {}",
                reason
            ),
            Err(_) => {}
        }

        result
    }

    /// Returns the user's stats for an exam, or a zeroed record if none exist yet.
    pub async fn get_user_exam_stats(
        &self,
        user_id: &str,
        exam_id: &str,
    ) -> Result<UserExamStats, AppError> {
        if user_id.is_empty() {
            return Err(AppError::Unauthenticated("user id is required".to_string()));
        }
        if exam_id.is_empty() {
            return Err(AppError::InvalidArgument("exam id is required".to_string()));
        }
        let (user_id, exam_id) = (user_id.to_string(), exam_id.to_string());

        self.transact("get exam stats", move |tx| {
            let (user_id, exam_id) = (user_id.clone(), exam_id.clone());
            Box::pin(async move {
                match tx.find_user_exam_stats(&user_id, &exam_id).await? {
                    Some(stats) => Ok(stats),
                    None => UserExamStats::new(&user_id, &exam_id),
                }
            })
        })
        .await
    }
}

async fn load_attempt(
    tx: &mut dyn Transaction,
    user_id: &str,
    attempt_id: &str,
) -> Result<Attempt, AppError> {
    tx.find_attempt(user_id, attempt_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("attempt {attempt_id} not found")))
}

async fn start_within(tx: &mut dyn Transaction, input: StartAttempt) -> Result<Attempt, AppError> {
    let questions = tx.find_questions_by_set_id(&input.exam_set_id).await?;

    let Some(first) = questions.first() else {
        return Err(AppError::NotFound(format!(
            "no questions found for exam set {}",
            input.exam_set_id
        )));
    };
    if first.exam_id != input.exam_id {
        return Err(AppError::InvalidArgument(format!(
            "exam set {} does not belong to exam {}",
            input.exam_set_id, input.exam_id
        )));
    }

    let attempt = Attempt::new(
        Uuid::new_v4().to_string(),
        input.user_id,
        input.exam_id,
        input.exam_set_id,
        questions.len() as i64,
        Utc::now(),
    )?;
    tx.save_attempt(&attempt).await?;

    Ok(attempt)
}

/// The completion unit of work: both records are read and written through `tx`
/// so they commit together or not at all.
async fn complete_within(
    tx: &mut dyn Transaction,
    input: &CompleteAttempt,
) -> Result<Attempt, AppError> {
    let mut attempt = load_attempt(tx, &input.user_id, &input.attempt_id).await?;

    if attempt.is_completed() {
        return Err(AppError::FailedPrecondition(format!(
            "attempt {} is already completed",
            attempt.id
        )));
    }

    let questions = tx
        .find_questions_by_set_id(&attempt.exam_set_id)
        .await
        .map_err(|e| e.context("load questions for scoring"))?;

    let outcome = attempt.complete(input.answers.clone(), &questions, Utc::now())?;

    let existing = tx
        .find_user_exam_stats(&attempt.user_id, &attempt.exam_id)
        .await?;
    let updated = stats::fold(existing, &attempt, &outcome.per_domain)?;

    tx.save_attempt(&attempt).await?;
    tx.save_user_exam_stats(&updated).await?;

    Ok(attempt)
}
