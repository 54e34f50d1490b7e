//! One model call in, one complete feedback report out.
//!
//! The pipeline never persists a partial report: parse and validation
//! failures get a single repair round-trip, and if that also fails the
//! request returns a failure envelope with the database untouched.

use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::feedback::{Feedback, FeedbackMetadata, RawEvaluation};
use crate::models::progress::SessionComparison;
use crate::models::transcript::Utterance;
use crate::progress::tracker::ProgressTracker;
use crate::scoring::augment::{augment, reliability_score};
use crate::scoring::calibration::{
    apply_cap, cap_questions, effort_cap, render_transcript, Level,
};
use crate::scoring::evaluator::Evaluator;
use crate::scoring::percentile::percentile_label;
use crate::scoring::prompts::{
    build_evaluation_prompt, build_evaluation_system, build_repair_prompt,
};
use crate::scoring::store::{FeedbackDraft, FeedbackStore};
use crate::scoring::validation::{parse_evaluation, validate, ValidationReport};
use crate::session::transcript::TranscriptCollector;

#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("interview not found for this user")]
    InterviewNotFound,

    #[error("no transcript available for this interview")]
    EmptyTranscript,

    #[error("evaluation did not produce a usable report: {}", .problems.join("; "))]
    InvalidEvaluation { problems: Vec<String> },

    #[error(transparent)]
    App(#[from] AppError),
}

/// A validated, calibrated, augmented evaluation plus its bookkeeping.
pub struct EvaluatedReport {
    pub eval: RawEvaluation,
    pub level: Level,
    pub reliability: i64,
    pub metadata: FeedbackMetadata,
}

/// Runs one evaluation round plus at most one repair round, then the
/// deterministic calibration and augmentation passes.
pub async fn run_evaluation(
    evaluator: &dyn Evaluator,
    role: &str,
    level_raw: &str,
    questions: &[String],
    transcript: &[Utterance],
) -> Result<EvaluatedReport, ScoringError> {
    let questions = cap_questions(questions);
    let prep = render_transcript(transcript);
    if prep.text.is_empty() {
        return Err(ScoringError::EmptyTranscript);
    }
    let level = Level::parse(level_raw);

    let system = build_evaluation_system();
    let prompt = build_evaluation_prompt(role, level.as_str(), questions, &prep.text);
    let first = evaluator.complete(&system, &prompt).await?;

    let mut repaired = false;
    let (mut eval, report) = match check(&first, questions) {
        Ok(accepted) => accepted,
        Err(problems) => {
            warn!(?problems, "evaluation failed validation, attempting repair");
            repaired = true;
            let repair = build_repair_prompt(&problems, &first);
            let second = evaluator.complete(&system, &repair).await?;
            check(&second, questions)
                .map_err(|problems| ScoringError::InvalidEvaluation { problems })?
        }
    };

    let mut flags = report.flags;
    if repaired {
        flags.push("accepted after one repair round".to_string());
    }

    let cap = effort_cap(transcript);
    if let Some(cap) = cap {
        info!(cap = cap.as_str(), "effort cap applied to evaluation");
        apply_cap(&mut eval, cap);
    }

    augment(&mut eval, level);

    let metadata = FeedbackMetadata {
        model: evaluator.model().to_string(),
        transcript_chars: prep.chars,
        transcript_truncated: prep.truncated,
        effort_cap: cap.map(|c| c.as_str().to_string()),
        validation_flags: flags,
    };

    Ok(EvaluatedReport {
        reliability: reliability_score(transcript, questions.len()),
        eval,
        level,
        metadata,
    })
}

fn check(
    raw: &str,
    questions: &[String],
) -> Result<(RawEvaluation, ValidationReport), Vec<String>> {
    let eval = parse_evaluation(raw).map_err(|e| vec![e])?;
    let report = validate(&eval, questions);
    if report.is_valid() {
        Ok((eval, report))
    } else {
        Err(report.errors)
    }
}

/// Flattens an evaluated report into the row the store writes.
pub fn assemble_feedback(
    id: Uuid,
    interview_id: Uuid,
    user_id: Uuid,
    report: EvaluatedReport,
    session_comparison: Option<SessionComparison>,
) -> FeedbackDraft {
    let EvaluatedReport {
        eval,
        level,
        reliability,
        metadata,
    } = report;

    let overall_percentile = eval
        .overall_percentile
        .clone()
        .unwrap_or_else(|| percentile_label(eval.total_score, level).to_string());

    FeedbackDraft {
        id,
        interview_id,
        user_id,
        total_score: eval.total_score,
        overall_percentile,
        reliability_score: reliability,
        category_scores: eval.category_scores,
        question_ratings: eval.question_ratings,
        strengths: eval.strengths,
        areas_for_improvement: eval.areas_for_improvement,
        final_assessment: eval.final_assessment,
        limitations: eval.limitations,
        next_steps: eval.next_steps,
        session_comparison,
        metadata,
    }
}

#[derive(Debug, Clone)]
pub struct FeedbackRequest {
    pub interview_id: Uuid,
    pub user_id: Uuid,
    /// Stable id for idempotent regeneration. A fresh one is minted when
    /// absent.
    pub feedback_id: Option<Uuid>,
    /// Client-reported transcript. When empty, the webhook-collected
    /// transcript for the interview is used instead.
    pub transcript: Vec<Utterance>,
    pub actual_duration_minutes: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct FeedbackCreated {
    pub feedback_id: Uuid,
    pub total_score: i64,
    pub overall_percentile: String,
}

#[derive(Clone)]
pub struct ScoringPipeline {
    evaluator: Arc<dyn Evaluator>,
    store: Arc<dyn FeedbackStore>,
    progress: ProgressTracker,
    transcripts: Arc<TranscriptCollector>,
}

impl ScoringPipeline {
    pub fn new(
        evaluator: Arc<dyn Evaluator>,
        store: Arc<dyn FeedbackStore>,
        progress: ProgressTracker,
        transcripts: Arc<TranscriptCollector>,
    ) -> Self {
        Self {
            evaluator,
            store,
            progress,
            transcripts,
        }
    }

    pub async fn create_feedback(
        &self,
        request: FeedbackRequest,
    ) -> Result<FeedbackCreated, ScoringError> {
        let context = self
            .store
            .interview_context(request.interview_id, request.user_id)
            .await?
            .ok_or(ScoringError::InterviewNotFound)?;

        // The caller's transcript wins; utterances collected from webhook
        // events cover calls that ended without a client report.
        let transcript = if request.transcript.is_empty() {
            self.transcripts.snapshot(request.interview_id).await
        } else {
            request.transcript
        };

        let report = run_evaluation(
            self.evaluator.as_ref(),
            &context.role,
            &context.level,
            &context.questions,
            &transcript,
        )
        .await?;

        // Comparison is computed before the new report lands, so the score
        // is never compared against itself.
        let comparison = match self
            .progress
            .session_comparison(request.user_id, report.eval.total_score)
            .await
        {
            Ok(comparison) => comparison,
            Err(err) => {
                warn!(user_id = %request.user_id, error = %err, "session comparison unavailable");
                None
            }
        };

        let id = request.feedback_id.unwrap_or_else(Uuid::new_v4);
        let draft = assemble_feedback(id, request.interview_id, request.user_id, report, comparison);
        let feedback_id = self.store.persist(&draft).await?;

        // Secondary writes are logged, never allowed to fail the report.
        if let Err(err) = self
            .store
            .mark_finalized(request.interview_id, request.actual_duration_minutes)
            .await
        {
            error!(interview_id = %request.interview_id, error = %err, "failed to mark interview finalized");
        }
        if let Err(err) = self.progress.record_feedback(request.user_id).await {
            error!(user_id = %request.user_id, error = %err, "failed to update progress rollup");
        }
        self.transcripts.clear(request.interview_id).await;

        info!(
            interview_id = %request.interview_id,
            %feedback_id,
            total_score = draft.total_score,
            "feedback report persisted"
        );

        Ok(FeedbackCreated {
            feedback_id,
            total_score: draft.total_score,
            overall_percentile: draft.overall_percentile,
        })
    }

    pub async fn fetch(
        &self,
        interview_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Feedback>, AppError> {
        self.store.fetch(interview_id, user_id).await
    }
}
