use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A generated interview: the ordered question list plus the parameters it
/// was generated from. `start_time`, `end_time` and `duration_minutes` are
/// written by the voice transport webhook as the call progresses.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Interview {
    pub id: Uuid,
    pub user_id: Uuid,
    pub questions: Vec<String>,
    pub role: String,
    pub level: String,
    pub specialty_skills: Vec<String>,
    pub interview_type: String,
    pub tone: String,
    pub difficulty: String,
    pub is_personalized: bool,
    pub finalized: bool,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i64>,
    pub created_at: DateTime<Utc>,
}
