use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Company -> candidate recruiter assignment. Removal only clears `is_active`.
#[derive(Debug, Clone, Serialize, FromRow, PartialEq)]
pub struct CompanyRecruiter {
    pub id: Uuid,
    pub company_id: Uuid,
    pub recruiter_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub assigned_at: OffsetDateTime,
    pub is_active: bool,
}
