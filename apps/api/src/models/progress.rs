use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Improving,
    Declining,
    Consistent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendConfidence {
    High,
    Medium,
    Low,
}

/// Direction plus magnitude of a score series, from a least-squares fit.
/// `rate` is the absolute slope in points per session; confidence comes from
/// how well the line explains the series (R²).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressTrend {
    pub direction: TrendDirection,
    pub rate: f64,
    pub confidence: TrendConfidence,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryTrend {
    pub category: String,
    pub trend: ProgressTrend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonDirection {
    Improved,
    Declined,
    Consistent,
}

/// How the current report compares to the user's previous session.
/// Absent from a user's first report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionComparison {
    pub previous_score: i64,
    pub delta: i64,
    pub percent_change: f64,
    pub direction: ComparisonDirection,
    pub consistency_note: String,
}

/// Per-user rollup, merge-upserted after every feedback report.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserProgress {
    pub user_id: Uuid,
    pub total_sessions: i64,
    pub average_score: f64,
    pub best_score: i64,
    pub recent_trend: Json<ProgressTrend>,
    pub category_trends: Json<Vec<CategoryTrend>>,
    pub recommendations: Vec<String>,
    pub last_updated: DateTime<Utc>,
}
