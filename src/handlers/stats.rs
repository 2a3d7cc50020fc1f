// src/handlers/stats.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};

use crate::{
    error::AppError, models::stats::StatsResponse, services::attempt::AttemptService,
    utils::jwt::Claims,
};

/// Get the caller's cumulative stats for an exam.
/// A user who never completed the exam gets a zeroed scorecard.
pub async fn get_exam_stats(
    State(service): State<AttemptService>,
    Extension(claims): Extension<Claims>,
    Path(exam_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let stats = service
        .get_user_exam_stats(claims.user_id()?, &exam_id)
        .await?;

    Ok(Json(StatsResponse::from(stats)))
}
