use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use super::progress::SessionComparison;

/// The five fixed rubric categories every feedback report scores.
/// Order matters: reports and trends render in this order.
pub const CATEGORY_NAMES: [&str; 5] = [
    "Communication Skills",
    "Technical Knowledge",
    "Problem Solving",
    "Cultural Fit",
    "Confidence and Clarity",
];

pub fn is_valid_category(name: &str) -> bool {
    CATEGORY_NAMES.contains(&name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// One rubric category as scored by the evaluator.
/// `percentile` and `benchmark_comparison` are filled deterministically after
/// evaluation; the model only supplies score, confidence, evidence and text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryScore {
    pub name: String,
    pub score: i64,
    pub confidence: Confidence,
    #[serde(default)]
    pub evidence: Vec<String>,
    pub comment: String,
    #[serde(default)]
    pub improvement_tips: Vec<String>,
    #[serde(default)]
    pub percentile: Option<String>,
    #[serde(default)]
    pub benchmark_comparison: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionRating {
    /// 1-based position in the interview's question list.
    pub question_number: i64,
    pub question: String,
    pub score: i64,
    pub assessment: String,
}

/// The evaluator's output shape, before validation and augmentation.
/// `limitations`, `next_steps` and `overall_percentile` are optional: when the
/// model omits them the pipeline backfills deterministic values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEvaluation {
    pub total_score: i64,
    pub category_scores: Vec<CategoryScore>,
    pub question_ratings: Vec<QuestionRating>,
    pub strengths: Vec<String>,
    pub areas_for_improvement: Vec<String>,
    pub final_assessment: String,
    #[serde(default)]
    pub limitations: Vec<String>,
    #[serde(default)]
    pub next_steps: Vec<String>,
    #[serde(default)]
    pub overall_percentile: Option<String>,
}

/// Pipeline bookkeeping persisted alongside the report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedbackMetadata {
    pub model: String,
    pub transcript_chars: usize,
    pub transcript_truncated: bool,
    /// Which deterministic cap applied, if any ("no_substance" / "minimal_effort").
    pub effort_cap: Option<String>,
    /// Non-fatal data-quality defects found during validation.
    pub validation_flags: Vec<String>,
}

/// Persisted feedback report, one per (interview, user) pair.
/// Immutable once written except for the session comparison backfill.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Feedback {
    pub id: Uuid,
    pub interview_id: Uuid,
    pub user_id: Uuid,
    pub total_score: i64,
    pub overall_percentile: String,
    pub reliability_score: i64,
    pub category_scores: Json<Vec<CategoryScore>>,
    pub question_ratings: Json<Vec<QuestionRating>>,
    pub strengths: Vec<String>,
    pub areas_for_improvement: Vec<String>,
    pub final_assessment: String,
    pub limitations: Vec<String>,
    pub next_steps: Vec<String>,
    pub session_comparison: Option<Json<SessionComparison>>,
    pub metadata: Json<FeedbackMetadata>,
    pub created_at: DateTime<Utc>,
}
