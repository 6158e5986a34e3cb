use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::app_state::AppState;
use crate::db::repositories::CourseRepository;
use crate::db::{Course, CourseModule, CourseTree, Lesson, NewCourse, NewCourseModule, NewLesson};
use crate::error::{AppError, AppResult};

pub async fn create_course(
    State(state): State<AppState>,
    Json(payload): Json<NewCourse>,
) -> AppResult<(StatusCode, Json<Course>)> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;
    let course = CourseRepository::create_course(&state.db, &payload).await?;
    Ok((StatusCode::CREATED, Json(course)))
}

pub async fn list_courses(State(state): State<AppState>) -> AppResult<Json<Vec<Course>>> {
    let courses = CourseRepository::list_courses(&state.db).await?;
    Ok(Json(courses))
}

pub async fn get_course(
    State(state): State<AppState>,
    Path(course_id): Path<Uuid>,
) -> AppResult<Json<CourseTree>> {
    let tree = CourseRepository::get_course_tree(&state.db, course_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("course {course_id}")))?;
    Ok(Json(tree))
}

pub async fn create_module(
    State(state): State<AppState>,
    Path(course_id): Path<Uuid>,
    Json(payload): Json<NewCourseModule>,
) -> AppResult<(StatusCode, Json<CourseModule>)> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;
    let module = CourseRepository::create_module(&state.db, course_id, &payload)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("course {course_id}")))?;
    Ok((StatusCode::CREATED, Json(module)))
}

pub async fn create_lesson(
    State(state): State<AppState>,
    Path(module_id): Path<Uuid>,
    Json(payload): Json<NewLesson>,
) -> AppResult<(StatusCode, Json<Lesson>)> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;
    let lesson = CourseRepository::create_lesson(&state.db, module_id, &payload)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("module {module_id}")))?;
    Ok((StatusCode::CREATED, Json(lesson)))
}
