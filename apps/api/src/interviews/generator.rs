//! Interview generation — quota gate, one LLM call, persist.
//!
//! Flow: resource quota check → build prompt → LLM generate (retried when
//! the count comes back wrong) → INSERT interview → return the row.

use serde::Deserialize;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::interviews::prompts::{build_question_system, QUESTION_PROMPT_TEMPLATE};
use crate::llm_client::LlmClient;
use crate::models::interview::Interview;
use crate::quota::guard::{QuotaGuard, ResourceKind};
use crate::scoring::calibration::MAX_QUESTIONS;

/// Retries when the model returns the wrong number of questions.
const MAX_GENERATION_RETRIES: u32 = 2;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("interview limit reached: {limit} per billing period on your plan")]
    QuotaExceeded { limit: i64 },

    #[error(transparent)]
    App(#[from] AppError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateInterviewRequest {
    pub user_id: Uuid,
    pub role: String,
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default = "default_interview_type")]
    pub interview_type: String,
    #[serde(default = "default_tone")]
    pub tone: String,
    /// Defaults to the experience level when absent.
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub specialty_skills: Vec<String>,
    #[serde(default = "default_question_count")]
    pub question_count: usize,
    #[serde(default)]
    pub is_personalized: bool,
}

fn default_level() -> String {
    "mid".to_string()
}

fn default_interview_type() -> String {
    "mixed".to_string()
}

fn default_tone() -> String {
    "professional".to_string()
}

fn default_question_count() -> usize {
    5
}

/// Runs the generation flow and persists the interview.
pub async fn generate_interview(
    pool: &PgPool,
    llm: &LlmClient,
    quota: &QuotaGuard,
    request: GenerateInterviewRequest,
) -> Result<Interview, GenerationError> {
    if request.role.trim().is_empty() {
        return Err(AppError::Validation("role is required".to_string()).into());
    }

    let gate = quota
        .quota_availability(request.user_id, ResourceKind::Interviews)
        .await?;
    if !gate.allowed {
        return Err(GenerationError::QuotaExceeded { limit: gate.limit });
    }

    // The evaluator rates at most MAX_QUESTIONS, so generating more would
    // only produce questions that never get scored.
    let count = request.question_count.clamp(1, MAX_QUESTIONS);
    if count != request.question_count {
        warn!(
            requested = request.question_count,
            clamped = count,
            "question count out of range, clamped"
        );
    }

    let difficulty = request
        .difficulty
        .clone()
        .unwrap_or_else(|| request.level.clone());
    let prompt = build_question_prompt(&request, &difficulty, count);
    let questions = call_llm_with_retry(llm, &prompt, count).await?;

    let interview: Interview = sqlx::query_as(
        r#"
        INSERT INTO interviews
            (id, user_id, questions, role, level, specialty_skills,
             interview_type, tone, difficulty, is_personalized, finalized)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, FALSE)
        RETURNING id, user_id, questions, role, level, specialty_skills,
                  interview_type, tone, difficulty, is_personalized, finalized,
                  start_time, end_time, duration_minutes, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(request.user_id)
    .bind(&questions)
    .bind(&request.role)
    .bind(&request.level)
    .bind(&request.specialty_skills)
    .bind(&request.interview_type)
    .bind(&request.tone)
    .bind(&difficulty)
    .bind(request.is_personalized)
    .fetch_one(pool)
    .await
    .map_err(AppError::from)?;

    info!(
        interview_id = %interview.id,
        user_id = %request.user_id,
        questions = questions.len(),
        "interview generated"
    );

    Ok(interview)
}

/// Calls the LLM for questions. Retries up to MAX_GENERATION_RETRIES times
/// when the cleaned list comes back short.
async fn call_llm_with_retry(
    llm: &LlmClient,
    prompt: &str,
    want: usize,
) -> Result<Vec<String>, AppError> {
    let system = build_question_system();

    for attempt in 0..=MAX_GENERATION_RETRIES {
        let raw: Vec<String> = llm
            .call_json(prompt, &system)
            .await
            .map_err(|e| AppError::Llm(format!("question generation failed: {e}")))?;

        match sanitize_questions(raw, want) {
            Some(questions) => return Ok(questions),
            None => warn!(
                attempt = attempt + 1,
                max = MAX_GENERATION_RETRIES + 1,
                want,
                "generation returned too few questions, retrying"
            ),
        }
    }

    Err(AppError::Llm(format!(
        "question generation returned too few questions after {} attempts",
        MAX_GENERATION_RETRIES + 1
    )))
}

/// Trims and drops empty entries; `None` when fewer than `want` survive.
/// Extras beyond `want` are cut, keeping the model's warm-up-first order.
fn sanitize_questions(raw: Vec<String>, want: usize) -> Option<Vec<String>> {
    let mut questions: Vec<String> = raw
        .into_iter()
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .collect();
    if questions.len() < want {
        return None;
    }
    questions.truncate(want);
    Some(questions)
}

fn build_question_prompt(
    request: &GenerateInterviewRequest,
    difficulty: &str,
    count: usize,
) -> String {
    let skills_line = if request.specialty_skills.is_empty() {
        "none listed, infer from the role".to_string()
    } else {
        request.specialty_skills.join(", ")
    };

    QUESTION_PROMPT_TEMPLATE
        .replace("{role}", &request.role)
        .replace("{level}", &request.level)
        .replace("{interview_type}", &request.interview_type)
        .replace("{tone}", &request.tone)
        .replace("{difficulty}", difficulty)
        .replace("{skills}", &skills_line)
        .replace("{count}", &count.to_string())
}
