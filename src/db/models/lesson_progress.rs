use serde::{Deserialize, Serialize};
use sqlx::types::Uuid;
use time::OffsetDateTime;

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct LessonProgress {
    pub id: Uuid,
    pub enrollment_id: Uuid,
    pub lesson_id: Uuid,
    pub is_completed: bool,
    pub completed_at: Option<OffsetDateTime>,
    pub video_progress_secs: i64,
    pub time_spent_secs: i64,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}
