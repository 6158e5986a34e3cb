use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::db::{DatabaseError, Enrollment};
use crate::progress::recalc::RecalcOutcome;
use crate::progress::ProgressStore;

const ENROLLMENT_COLUMNS: &str = "id, learner_id, course_id, status, progress, time_spent_secs, \
     enrolled_at, started_at, completed_at, created_at, updated_at";

/// Postgres-backed [`ProgressStore`].
#[derive(Clone)]
pub struct PgProgressStore {
    pool: PgPool,
}

impl PgProgressStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl ProgressStore for PgProgressStore {
    async fn course_active(&self, course_id: Uuid) -> Result<bool, DatabaseError> {
        let active = sqlx::query_scalar::<_, bool>("SELECT is_active FROM courses WHERE id = $1")
            .bind(course_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(active.unwrap_or(false))
    }

    async fn insert_enrollment(
        &self,
        learner_id: Uuid,
        course_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<Option<Enrollment>, DatabaseError> {
        // ON CONFLICT DO NOTHING turns the duplicate-pair case into an empty
        // result instead of a unique-violation error.
        let enrollment = sqlx::query_as::<_, Enrollment>(&format!(
            r#"
            INSERT INTO enrollments (id, learner_id, course_id, status, progress, time_spent_secs, enrolled_at)
            VALUES ($1, $2, $3, 'enrolled', 0, 0, $4)
            ON CONFLICT (learner_id, course_id) DO NOTHING
            RETURNING {ENROLLMENT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(learner_id)
        .bind(course_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(enrollment)
    }

    async fn enrollment(&self, enrollment_id: Uuid) -> Result<Option<Enrollment>, DatabaseError> {
        let enrollment = sqlx::query_as::<_, Enrollment>(&format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM enrollments WHERE id = $1"
        ))
        .bind(enrollment_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(enrollment)
    }

    async fn lesson_course(&self, lesson_id: Uuid) -> Result<Option<Uuid>, DatabaseError> {
        let course_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT cm.course_id
            FROM lessons l
            JOIN course_modules cm ON cm.id = l.module_id
            WHERE l.id = $1
            "#,
        )
        .bind(lesson_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(course_id)
    }

    async fn upsert_completion(
        &self,
        enrollment_id: Uuid,
        lesson_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<(), DatabaseError> {
        // Idempotent: a replay keeps the original completed_at.
        sqlx::query(
            r#"
            INSERT INTO lesson_progress (id, enrollment_id, lesson_id, is_completed, completed_at)
            VALUES ($1, $2, $3, TRUE, $4)
            ON CONFLICT (enrollment_id, lesson_id) DO UPDATE
            SET is_completed = TRUE,
                completed_at = COALESCE(lesson_progress.completed_at, EXCLUDED.completed_at),
                updated_at = NOW()
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(enrollment_id)
        .bind(lesson_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn required_lessons(&self, course_id: Uuid) -> Result<Vec<Uuid>, DatabaseError> {
        let lessons = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT l.id
            FROM lessons l
            JOIN course_modules cm ON cm.id = l.module_id
            WHERE cm.course_id = $1 AND l.is_required
            "#,
        )
        .bind(course_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(lessons)
    }

    async fn count_completed(
        &self,
        enrollment_id: Uuid,
        lesson_ids: &[Uuid],
    ) -> Result<i64, DatabaseError> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM lesson_progress
            WHERE enrollment_id = $1 AND is_completed AND lesson_id = ANY($2)
            "#,
        )
        .bind(enrollment_id)
        .bind(lesson_ids)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn apply_recalculation(
        &self,
        enrollment_id: Uuid,
        outcome: &RecalcOutcome,
    ) -> Result<Enrollment, DatabaseError> {
        // One atomic UPDATE; COALESCE keeps already-set lifecycle timestamps.
        let enrollment = sqlx::query_as::<_, Enrollment>(&format!(
            r#"
            UPDATE enrollments
            SET progress = $2,
                status = $3,
                started_at = COALESCE(started_at, $4),
                completed_at = COALESCE(completed_at, $5),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {ENROLLMENT_COLUMNS}
            "#
        ))
        .bind(enrollment_id)
        .bind(outcome.progress)
        .bind(outcome.status)
        .bind(outcome.started_at)
        .bind(outcome.completed_at)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(DatabaseError::NotFound)?;
        Ok(enrollment)
    }
}
