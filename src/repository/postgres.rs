// src/repository/postgres.rs

use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, types::Json};

use crate::{
    error::AppError,
    models::{
        attempt::{AnswerMap, Attempt},
        question::{AnswerOption, Question},
        stats::{DomainScore, UserExamStats},
    },
    repository::{Store, Transaction},
};

/// Row of the `questions` table.
#[derive(sqlx::FromRow)]
struct QuestionRow {
    id: String,
    exam_id: String,
    exam_set_id: String,
    question_type: String,
    options: Json<Vec<AnswerOption>>,
    correct_answers: Json<Vec<String>>,
    domain: String,
}

impl TryFrom<QuestionRow> for Question {
    type Error = AppError;

    fn try_from(row: QuestionRow) -> Result<Self, Self::Error> {
        let question = Question {
            kind: row
                .question_type
                .parse()
                .map_err(|e: AppError| AppError::Internal(e.to_string()))?,
            id: row.id,
            exam_id: row.exam_id,
            exam_set_id: row.exam_set_id,
            options: row.options.0,
            correct_answers: row.correct_answers.0,
            domain: row.domain,
        };

        // A malformed catalog row would score wrongly; refuse to use it.
        question
            .validate()
            .map_err(|e| AppError::Internal(format!("corrupt question row: {e}")))?;
        Ok(question)
    }
}

/// Row of the `attempts` table.
#[derive(sqlx::FromRow)]
struct AttemptRow {
    id: String,
    user_id: String,
    exam_id: String,
    exam_set_id: String,
    status: String,
    score: i64,
    total_questions: i64,
    current_index: i64,
    answers: Json<AnswerMap>,
    started_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
    completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl TryFrom<AttemptRow> for Attempt {
    type Error = AppError;

    fn try_from(row: AttemptRow) -> Result<Self, Self::Error> {
        Ok(Attempt {
            status: row.status.parse()?,
            id: row.id,
            user_id: row.user_id,
            exam_id: row.exam_id,
            exam_set_id: row.exam_set_id,
            score: row.score,
            total_questions: row.total_questions,
            current_index: row.current_index,
            answers: row.answers.0,
            started_at: row.started_at,
            updated_at: row.updated_at,
            completed_at: row.completed_at,
        })
    }
}

/// Row of the `user_exam_stats` table.
#[derive(sqlx::FromRow)]
struct UserExamStatsRow {
    user_id: String,
    exam_id: String,
    total_attempts: i64,
    total_correct: i64,
    total_questions_answered: i64,
    domain_stats: Json<BTreeMap<String, DomainScore>>,
    last_taken_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<UserExamStatsRow> for UserExamStats {
    fn from(row: UserExamStatsRow) -> Self {
        UserExamStats {
            user_id: row.user_id,
            exam_id: row.exam_id,
            total_attempts: row.total_attempts,
            total_correct: row.total_correct,
            total_questions_answered: row.total_questions_answered,
            domain_stats: row.domain_stats.0,
            last_taken_at: row.last_taken_at,
        }
    }
}

/// Postgres-backed store. Every transaction runs at SERIALIZABLE isolation, so a
/// read-modify-write that races another one fails at commit (SQLSTATE 40001) and is
/// retried by `run_in_transaction`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn begin_serializable(&self) -> Result<PgTransaction, AppError> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            tracing::error!("Failed to begin transaction: {:?}", e);
            AppError::from(e)
        })?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;

        Ok(PgTransaction { tx })
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>, AppError> {
        Ok(Box::new(self.begin_serializable().await?))
    }
}

pub struct PgTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl Transaction for PgTransaction {
    async fn find_attempt(
        &mut self,
        user_id: &str,
        attempt_id: &str,
    ) -> Result<Option<Attempt>, AppError> {
        let row = sqlx::query_as::<_, AttemptRow>(
            r#"
            SELECT
                id, user_id, exam_id, exam_set_id, status, score, total_questions,
                current_index, answers, started_at, updated_at, completed_at
            FROM attempts
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(attempt_id)
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| AppError::from(e).context("find attempt"))?;

        row.map(Attempt::try_from).transpose()
    }

    async fn find_questions_by_set_id(
        &mut self,
        exam_set_id: &str,
    ) -> Result<Vec<Question>, AppError> {
        let rows = sqlx::query_as::<_, QuestionRow>(
            r#"
            SELECT
                id, exam_id, exam_set_id, question_type, options, correct_answers, domain
            FROM questions
            WHERE exam_set_id = $1
            ORDER BY id
            "#,
        )
        .bind(exam_set_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| AppError::from(e).context("find questions"))?;

        rows.into_iter().map(Question::try_from).collect()
    }

    async fn find_user_exam_stats(
        &mut self,
        user_id: &str,
        exam_id: &str,
    ) -> Result<Option<UserExamStats>, AppError> {
        let row = sqlx::query_as::<_, UserExamStatsRow>(
            r#"
            SELECT
                user_id, exam_id, total_attempts, total_correct, total_questions_answered,
                domain_stats, last_taken_at
            FROM user_exam_stats
            WHERE user_id = $1 AND exam_id = $2
            "#,
        )
        .bind(user_id)
        .bind(exam_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| AppError::from(e).context("find exam stats"))?;

        Ok(row.map(UserExamStats::from))
    }

    async fn save_attempt(&mut self, attempt: &Attempt) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO attempts (
                id, user_id, exam_id, exam_set_id, status, score, total_questions,
                current_index, answers, started_at, updated_at, completed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                score = EXCLUDED.score,
                current_index = EXCLUDED.current_index,
                answers = EXCLUDED.answers,
                updated_at = EXCLUDED.updated_at,
                completed_at = EXCLUDED.completed_at
            "#,
        )
        .bind(&attempt.id)
        .bind(&attempt.user_id)
        .bind(&attempt.exam_id)
        .bind(&attempt.exam_set_id)
        .bind(attempt.status.as_str())
        .bind(attempt.score)
        .bind(attempt.total_questions)
        .bind(attempt.current_index)
        .bind(Json(&attempt.answers))
        .bind(attempt.started_at)
        .bind(attempt.updated_at)
        .bind(attempt.completed_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| AppError::from(e).context("save attempt"))?;

        Ok(())
    }

    async fn save_user_exam_stats(&mut self, stats: &UserExamStats) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO user_exam_stats (
                user_id, exam_id, total_attempts, total_correct, total_questions_answered,
                domain_stats, last_taken_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (user_id, exam_id) DO UPDATE SET
                total_attempts = EXCLUDED.total_attempts,
                total_correct = EXCLUDED.total_correct,
                total_questions_answered = EXCLUDED.total_questions_answered,
                domain_stats = EXCLUDED.domain_stats,
                last_taken_at = EXCLUDED.last_taken_at
            "#,
        )
        .bind(&stats.user_id)
        .bind(&stats.exam_id)
        .bind(stats.total_attempts)
        .bind(stats.total_correct)
        .bind(stats.total_questions_answered)
        .bind(Json(&stats.domain_stats))
        .bind(stats.last_taken_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| AppError::from(e).context("save exam stats"))?;

        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        self.tx
            .commit()
            .await
            .map_err(|e| AppError::from(e).context("commit"))
    }

    async fn rollback(self: Box<Self>) -> Result<(), AppError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| AppError::from(e).context("rollback"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;

    async fn test_store() -> Option<PgStore> {
        let Ok(database_url) = std::env::var("DATABASE_URL") else {
            eprintln!("DATABASE_URL not set, skipping Postgres test");
            return None;
        };
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(&database_url)
            .await
            .expect("Failed to connect to Postgres");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to migrate database");
        Some(PgStore::new(pool))
    }

    #[tokio::test]
    async fn test_transactions_run_serializable() {
        let Some(store) = test_store().await else {
            return;
        };

        let mut tx = store.begin_serializable().await.unwrap();
        let level: String = sqlx::query_scalar("SHOW transaction_isolation")
            .fetch_one(&mut *tx.tx)
            .await
            .unwrap();
        assert_eq!(level, "serializable");

        Box::new(tx).rollback().await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_attempt_reads_as_none() {
        let Some(store) = test_store().await else {
            return;
        };

        let mut tx = store.begin().await.unwrap();
        assert!(tx.find_attempt("nobody", "missing").await.unwrap().is_none());
        assert!(tx.find_user_exam_stats("nobody", "none").await.unwrap().is_none());
        assert!(tx.find_questions_by_set_id("missing").await.unwrap().is_empty());
        tx.rollback().await.unwrap();
    }
}
