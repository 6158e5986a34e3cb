use serde::{Deserialize, Serialize};
use sqlx::types::Uuid;
use time::OffsetDateTime;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "enrollment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Enrolled,
    InProgress,
    Completed,
    Dropped,
    Suspended,
}

impl EnrollmentStatus {
    /// Dropped and Suspended are terminal for the progress engine: it never
    /// enters or exits them.
    pub fn is_terminal(self) -> bool {
        matches!(self, EnrollmentStatus::Dropped | EnrollmentStatus::Suspended)
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: Uuid,
    pub learner_id: Uuid,
    pub course_id: Uuid,
    pub status: EnrollmentStatus,
    /// Percentage of required lessons completed, 0-100 with two decimals.
    pub progress: f64,
    pub time_spent_secs: i64,
    pub enrolled_at: OffsetDateTime,
    pub started_at: Option<OffsetDateTime>,
    pub completed_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Deserialize, Validate)]
pub struct NewEnrollment {
    pub learner_id: Uuid,
    pub course_id: Uuid,
}
