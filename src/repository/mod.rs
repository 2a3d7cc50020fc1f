// src/repository/mod.rs

//! Storage contracts consumed by the services, plus the optimistic-transaction
//! retry envelope every read-modify-write goes through.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::{
    error::AppError,
    models::{attempt::Attempt, question::Question, stats::UserExamStats},
};

/// A unit of work against the store. Reads observe a consistent state; writes become
/// visible only on `commit`, which fails with `AppError::Aborted` if a concurrent
/// transaction changed something this one read.
#[async_trait]
pub trait Transaction: Send {
    /// Returns the attempt only if it exists and belongs to `user_id`.
    async fn find_attempt(
        &mut self,
        user_id: &str,
        attempt_id: &str,
    ) -> Result<Option<Attempt>, AppError>;

    /// The complete canonical question set, ordered by question id. Empty if unknown.
    async fn find_questions_by_set_id(
        &mut self,
        exam_set_id: &str,
    ) -> Result<Vec<Question>, AppError>;

    async fn find_user_exam_stats(
        &mut self,
        user_id: &str,
        exam_id: &str,
    ) -> Result<Option<UserExamStats>, AppError>;

    async fn save_attempt(&mut self, attempt: &Attempt) -> Result<(), AppError>;

    async fn save_user_exam_stats(&mut self, stats: &UserExamStats) -> Result<(), AppError>;

    async fn commit(self: Box<Self>) -> Result<(), AppError>;

    async fn rollback(self: Box<Self>) -> Result<(), AppError>;
}

/// Backing store able to open transactions.
#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn Transaction>, AppError>;
}

/// Runs `unit_of_work` inside a transaction and commits it.
///
/// A write conflict (`AppError::Aborted`) raised by any read, write or the commit
/// discards the transaction and reruns the whole unit of work from fresh reads, up to
/// `max_attempts` times. Any other error rolls back and is returned unchanged.
pub async fn run_in_transaction<T, F>(
    store: &dyn Store,
    max_attempts: u32,
    mut unit_of_work: F,
) -> Result<T, AppError>
where
    T: Send,
    F: for<'t> FnMut(&'t mut dyn Transaction) -> BoxFuture<'t, Result<T, AppError>> + Send,
{
    let max_attempts = max_attempts.max(1);

    for attempt in 1..=max_attempts {
        let mut tx = store.begin().await?;

        let result = unit_of_work(&mut *tx).await;

        let outcome = match result {
            Ok(value) => tx.commit().await.map(|()| value),
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!("Failed to roll back transaction: {}", rollback_err);
                }
                Err(err)
            }
        };

        match outcome {
            Err(AppError::Aborted(reason)) => {
                tracing::warn!(
                    attempt,
                    max_attempts,
                    "Transaction aborted by a conflicting write, retrying: {}",
                    reason
                );
            }
            other => return other,
        }
    }

    Err(AppError::Internal(format!(
        "transaction kept conflicting after {} attempts",
        max_attempts
    )))
}
