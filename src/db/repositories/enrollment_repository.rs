use sqlx::PgPool;
use uuid::Uuid;

use crate::db::{Certificate, DatabaseError, Enrollment, LessonProgress};

pub struct EnrollmentRepository;

impl EnrollmentRepository {
    pub async fn get(
        pool: &PgPool,
        enrollment_id: Uuid,
    ) -> Result<Option<Enrollment>, DatabaseError> {
        let enrollment = sqlx::query_as::<_, Enrollment>(
            "SELECT id, learner_id, course_id, status, progress, time_spent_secs, \
             enrolled_at, started_at, completed_at, created_at, updated_at \
             FROM enrollments WHERE id = $1",
        )
        .bind(enrollment_id)
        .fetch_optional(pool)
        .await?;
        Ok(enrollment)
    }

    pub async fn list_for_learner(
        pool: &PgPool,
        learner_id: Uuid,
    ) -> Result<Vec<Enrollment>, DatabaseError> {
        let enrollments = sqlx::query_as::<_, Enrollment>(
            "SELECT id, learner_id, course_id, status, progress, time_spent_secs, \
             enrolled_at, started_at, completed_at, created_at, updated_at \
             FROM enrollments WHERE learner_id = $1 ORDER BY enrolled_at DESC",
        )
        .bind(learner_id)
        .fetch_all(pool)
        .await?;
        Ok(enrollments)
    }

    pub async fn lesson_progress(
        pool: &PgPool,
        enrollment_id: Uuid,
    ) -> Result<Vec<LessonProgress>, DatabaseError> {
        let rows = sqlx::query_as::<_, LessonProgress>(
            "SELECT id, enrollment_id, lesson_id, is_completed, completed_at, \
             video_progress_secs, time_spent_secs, created_at, updated_at \
             FROM lesson_progress WHERE enrollment_id = $1 ORDER BY created_at",
        )
        .bind(enrollment_id)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    pub async fn certificate(
        pool: &PgPool,
        enrollment_id: Uuid,
    ) -> Result<Option<Certificate>, DatabaseError> {
        let certificate = sqlx::query_as::<_, Certificate>(
            "SELECT id, enrollment_id, certificate_url, issued_at \
             FROM certificates WHERE enrollment_id = $1",
        )
        .bind(enrollment_id)
        .fetch_optional(pool)
        .await?;
        Ok(certificate)
    }
}
