use serde::{Deserialize, Serialize};
use sqlx::types::Uuid;
use time::OffsetDateTime;

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Certificate {
    pub id: Uuid,
    pub enrollment_id: Uuid,
    pub certificate_url: String,
    pub issued_at: OffsetDateTime,
}
