use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::app_state::AppState;
use crate::db::repositories::EnrollmentRepository;
use crate::db::{Certificate, Enrollment, LessonProgress, NewEnrollment};
use crate::error::{AppError, AppResult};

pub async fn create_enrollment(
    State(state): State<AppState>,
    Json(payload): Json<NewEnrollment>,
) -> AppResult<(StatusCode, Json<Enrollment>)> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;
    let enrollment = state
        .engine
        .create_enrollment(payload.learner_id, payload.course_id)
        .await?;
    Ok((StatusCode::CREATED, Json(enrollment)))
}

pub async fn get_enrollment(
    State(state): State<AppState>,
    Path(enrollment_id): Path<Uuid>,
) -> AppResult<Json<Enrollment>> {
    let enrollment = EnrollmentRepository::get(&state.db, enrollment_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("enrollment {enrollment_id}")))?;
    Ok(Json(enrollment))
}

pub async fn list_learner_enrollments(
    State(state): State<AppState>,
    Path(learner_id): Path<Uuid>,
) -> AppResult<Json<Vec<Enrollment>>> {
    let enrollments = EnrollmentRepository::list_for_learner(&state.db, learner_id).await?;
    Ok(Json(enrollments))
}

/// Mark a lesson completed for an enrollment; responds with the recalculated
/// enrollment. Safe to call repeatedly for the same lesson.
pub async fn complete_lesson(
    State(state): State<AppState>,
    Path((enrollment_id, lesson_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<Enrollment>> {
    let enrollment = state
        .engine
        .record_lesson_completion(enrollment_id, lesson_id)
        .await?;
    Ok(Json(enrollment))
}

/// Re-derive progress/status from the stored completion set, e.g. after
/// course structure edits changed which lessons are required.
pub async fn recalculate_enrollment(
    State(state): State<AppState>,
    Path(enrollment_id): Path<Uuid>,
) -> AppResult<Json<Enrollment>> {
    let enrollment = state.engine.recalculate(enrollment_id).await?;
    Ok(Json(enrollment))
}

pub async fn list_lesson_progress(
    State(state): State<AppState>,
    Path(enrollment_id): Path<Uuid>,
) -> AppResult<Json<Vec<LessonProgress>>> {
    EnrollmentRepository::get(&state.db, enrollment_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("enrollment {enrollment_id}")))?;
    let rows = EnrollmentRepository::lesson_progress(&state.db, enrollment_id).await?;
    Ok(Json(rows))
}

pub async fn get_certificate(
    State(state): State<AppState>,
    Path(enrollment_id): Path<Uuid>,
) -> AppResult<Json<Certificate>> {
    let certificate = EnrollmentRepository::certificate(&state.db, enrollment_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("certificate for enrollment {enrollment_id}"))
        })?;
    Ok(Json(certificate))
}
