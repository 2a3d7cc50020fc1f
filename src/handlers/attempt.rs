// src/handlers/attempt.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    error::AppError,
    models::attempt::{
        CompleteAttempt, CompleteAttemptRequest, SaveProgress, SaveProgressRequest, StartAttempt,
        StartAttemptRequest,
    },
    services::attempt::AttemptService,
    utils::{json::AppJson, jwt::Claims},
};

/// Starts a new attempt on an exam set.
/// Returns 201 Created with the fresh attempt.
pub async fn start_attempt(
    State(service): State<AttemptService>,
    Extension(claims): Extension<Claims>,
    AppJson(req): AppJson<StartAttemptRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;
    let input = StartAttempt::new(claims.user_id()?, &req.exam_id, &req.exam_set_id)?;

    let attempt = service.start_attempt(input).await?;

    Ok((StatusCode::CREATED, Json(attempt)))
}

/// Returns one of the caller's attempts.
pub async fn get_attempt(
    State(service): State<AttemptService>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let attempt = service.get_attempt(claims.user_id()?, &attempt_id).await?;

    Ok(Json(attempt))
}

/// Saves the navigation index and partial answers of an in-progress attempt.
/// 409 if the attempt is already completed.
pub async fn save_progress(
    State(service): State<AttemptService>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<String>,
    AppJson(req): AppJson<SaveProgressRequest>,
) -> Result<impl IntoResponse, AppError> {
    let input = SaveProgress::new(claims.user_id()?, &attempt_id, req.current_index, req.answers)?;

    service.save_progress(input).await?;

    Ok(Json(serde_json::json!({ "status": "updated" })))
}

/// Completes an attempt: merges the final answers, scores and updates the user's stats.
///
/// * 200 with the completed attempt.
/// * 409 if the attempt was already completed (safe to treat as "done" on retries).
pub async fn complete_attempt(
    State(service): State<AttemptService>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<String>,
    AppJson(req): AppJson<CompleteAttemptRequest>,
) -> Result<impl IntoResponse, AppError> {
    let input = CompleteAttempt::new(claims.user_id()?, &attempt_id, req.answers)?;

    let attempt = service.complete_attempt(input).await?;

    Ok(Json(attempt))
}
