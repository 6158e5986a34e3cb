use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{
    complete_lesson, create_enrollment, get_certificate, get_enrollment, list_learner_enrollments,
    list_lesson_progress, recalculate_enrollment,
};
use crate::app_state::AppState;

pub fn enrollment_routes() -> Router<AppState> {
    Router::new()
        .route("/enrollments", post(create_enrollment))
        .route("/enrollments/:enrollment_id", get(get_enrollment))
        .route(
            "/enrollments/:enrollment_id/lessons/:lesson_id/complete",
            post(complete_lesson),
        )
        .route(
            "/enrollments/:enrollment_id/recalculate",
            post(recalculate_enrollment),
        )
        .route(
            "/enrollments/:enrollment_id/lessons",
            get(list_lesson_progress),
        )
        .route(
            "/enrollments/:enrollment_id/certificate",
            get(get_certificate),
        )
        .route(
            "/learners/:learner_id/enrollments",
            get(list_learner_enrollments),
        )
}
