use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{create_course, create_lesson, create_module, get_course, list_courses};
use crate::app_state::AppState;

pub fn course_routes() -> Router<AppState> {
    Router::new()
        .route("/courses", get(list_courses).post(create_course))
        .route("/courses/:course_id", get(get_course))
        .route("/courses/:course_id/modules", post(create_module))
        .route("/modules/:module_id/lessons", post(create_lesson))
}
