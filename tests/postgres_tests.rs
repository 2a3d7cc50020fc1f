// tests/postgres_tests.rs
//
// Runs against a live Postgres read from DATABASE_URL. Each test returns early when
// the variable is unset, so `cargo test` stays green on machines without a database.

use std::sync::Arc;
use std::time::Duration;

use exam_scoring::{
    error::AppError,
    models::{
        attempt::{AnswerMap, CompleteAttempt, SaveProgress, StartAttempt},
        question::QuestionKind,
    },
    repository::postgres::PgStore,
    services::attempt::AttemptService,
};
use sqlx::{PgPool, postgres::PgPoolOptions, types::Json};

/// Connects and migrates, or returns `None` when no database is configured.
async fn test_pool() -> Option<PgPool> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping Postgres test");
        return None;
    };

    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres for testing. Make sure DATABASE_URL is set.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    Some(pool)
}

fn unique(prefix: &str) -> String {
    format!("{}_{}", prefix, &uuid::Uuid::new_v4().to_string()[..8])
}

/// Seeds a two-question set: q1 (Compute, correct [a]) and q2 (Security, correct [b, c]).
/// Returns (exam_id, exam_set_id, q1_id, q2_id).
async fn seed_exam_set(pool: &PgPool) -> (String, String, String, String) {
    let exam_id = unique("exam");
    let set_id = unique("set");
    let q1 = unique("q1");
    let q2 = unique("q2");

    let options = Json(serde_json::json!([
        { "id": "a", "text": "Option a" },
        { "id": "b", "text": "Option b" },
        { "id": "c", "text": "Option c" },
        { "id": "d", "text": "Option d" }
    ]));

    for (id, kind, correct, domain) in [
        (&q1, QuestionKind::SingleAnswer, vec!["a"], "Compute"),
        (&q2, QuestionKind::MultiAnswer, vec!["b", "c"], "Security"),
    ] {
        sqlx::query(
            r#"
            INSERT INTO questions (id, exam_id, exam_set_id, question_type, options, correct_answers, domain)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(id)
        .bind(&exam_id)
        .bind(&set_id)
        .bind(kind.as_str())
        .bind(&options)
        .bind(Json(correct))
        .bind(domain)
        .execute(pool)
        .await
        .expect("Failed to seed question");
    }

    (exam_id, set_id, q1, q2)
}

fn service(pool: PgPool) -> AttemptService {
    AttemptService::with_limits(Arc::new(PgStore::new(pool)), 5, Duration::from_secs(10))
}

fn answers(entries: &[(&str, &[&str])]) -> AnswerMap {
    entries
        .iter()
        .map(|(q, opts)| (q.to_string(), opts.iter().map(|o| o.to_string()).collect()))
        .collect()
}

#[tokio::test]
async fn progress_and_stats_survive_a_round_trip_through_postgres() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let (exam_id, set_id, q1, q2) = seed_exam_set(&pool).await;
    let service = service(pool);
    let user = unique("user");

    let attempt = service
        .start_attempt(StartAttempt::new(&user, &exam_id, &set_id).unwrap())
        .await
        .unwrap();
    assert_eq!(attempt.total_questions, 2);

    service
        .save_progress(
            SaveProgress::new(&user, &attempt.id, 1, answers(&[(q1.as_str(), &["a"])])).unwrap(),
        )
        .await
        .unwrap();

    let saved = service.get_attempt(&user, &attempt.id).await.unwrap();
    assert_eq!(saved.current_index, 1);
    assert_eq!(saved.answers, answers(&[(q1.as_str(), &["a"])]));

    let completed = service
        .complete_attempt(
            CompleteAttempt::new(&user, &attempt.id, answers(&[(q2.as_str(), &["c", "b"])]))
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(completed.is_completed());
    assert_eq!(completed.score, 2);

    let reloaded = service.get_attempt(&user, &attempt.id).await.unwrap();
    assert!(reloaded.is_completed());
    assert!(reloaded.completed_at.is_some());
    assert_eq!(reloaded.answers.len(), 2);

    let stats = service.get_user_exam_stats(&user, &exam_id).await.unwrap();
    assert_eq!(stats.total_attempts, 1);
    assert_eq!(stats.total_correct, 2);
    assert_eq!(stats.domain_stats["Compute"].accuracy_rate, 100);
    assert_eq!(stats.domain_stats["Security"].correct_count, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_completions_of_one_attempt_succeed_once() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let (exam_id, set_id, q1, _) = seed_exam_set(&pool).await;
    let service = service(pool);
    let user = unique("user");

    let attempt = service
        .start_attempt(StartAttempt::new(&user, &exam_id, &set_id).unwrap())
        .await
        .unwrap();

    let complete = |choice: &'static str| {
        let service = service.clone();
        let input =
            CompleteAttempt::new(&user, &attempt.id, answers(&[(q1.as_str(), &[choice])]))
                .unwrap();
        tokio::spawn(async move { service.complete_attempt(input).await })
    };
    let (first, second) = tokio::join!(complete("a"), complete("b"));
    let results = [first.unwrap(), second.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        results
            .iter()
            .filter(|r| matches!(r, Err(AppError::FailedPrecondition(_))))
            .count(),
        1
    );

    let stats = service.get_user_exam_stats(&user, &exam_id).await.unwrap();
    assert_eq!(stats.total_attempts, 1);
    assert_eq!(stats.total_questions_answered, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn first_completions_on_empty_stats_do_not_lose_updates() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let (exam_id, set_id, q1, q2) = seed_exam_set(&pool).await;
    let service = service(pool);
    let user = unique("user");

    let mut attempt_ids = Vec::new();
    for _ in 0..2 {
        let attempt = service
            .start_attempt(StartAttempt::new(&user, &exam_id, &set_id).unwrap())
            .await
            .unwrap();
        attempt_ids.push(attempt.id);
    }

    // Neither completion sees a stats row when it starts.
    let handles: Vec<_> = attempt_ids
        .iter()
        .map(|attempt_id| {
            let service = service.clone();
            let input = CompleteAttempt::new(
                &user,
                attempt_id,
                answers(&[(q1.as_str(), &["a"]), (q2.as_str(), &["b"])]),
            )
            .unwrap();
            tokio::spawn(async move { service.complete_attempt(input).await })
        })
        .collect();

    for handle in handles {
        let completed = handle.await.unwrap().expect("completion failed");
        assert_eq!(completed.score, 1);
    }

    let stats = service.get_user_exam_stats(&user, &exam_id).await.unwrap();
    assert_eq!(stats.total_attempts, 2);
    assert_eq!(stats.total_correct, 2);
    assert_eq!(stats.total_questions_answered, 4);
    assert_eq!(stats.domain_stats["Compute"].correct_count, 2);
    assert_eq!(stats.domain_stats["Compute"].total_count, 2);
    assert_eq!(stats.domain_stats["Security"].correct_count, 0);
    assert_eq!(stats.domain_stats["Security"].total_count, 2);
    assert_eq!(stats.domain_stats["Security"].accuracy_rate, 0);
}
