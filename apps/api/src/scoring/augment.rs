//! Deterministic augmentation of a validated evaluation.
//!
//! Everything here is computed without a second model call: percentile and
//! benchmark labels, disclosure backfills, synthesized next steps, and the
//! reliability score.

use crate::models::feedback::RawEvaluation;
use crate::models::transcript::{Role, Utterance};
use crate::scoring::calibration::Level;
use crate::scoring::percentile::{benchmark_comparison, percentile_label};

/// Disclosures attached to every report when the model does not supply its
/// own. The list is fixed: reports must not vary in what they admit they
/// cannot judge.
pub const ASSESSMENT_LIMITATIONS: [&str; 6] = [
    "This assessment is based solely on the interview transcript and evaluates \
     communication, not actual job performance.",
    "Technical claims made by the candidate could not be independently verified.",
    "Cultural fit observations are inherently subjective and depend on how the \
     questions were framed.",
    "Voice-to-text transcription may have introduced errors that affected scoring.",
    "A single mock interview is a limited sample and may not reflect performance \
     on a different day.",
    "Scores are calibrated against typical candidates at the stated experience \
     level, not against a specific company's bar.",
];

/// Candidate speech this long (about 400 words) counts as full volume for
/// the reliability score.
const VOLUME_TARGET_CHARS: usize = 2_400;

/// Fills in everything the model is allowed to omit and everything it is not
/// trusted to compute.
pub fn augment(eval: &mut RawEvaluation, level: Level) {
    for category in &mut eval.category_scores {
        category.percentile = Some(percentile_label(category.score, level).to_string());
        category.benchmark_comparison = Some(benchmark_comparison(category.score, level));
    }

    if eval.limitations.is_empty() {
        eval.limitations = ASSESSMENT_LIMITATIONS.iter().map(|s| s.to_string()).collect();
    }

    if eval.next_steps.is_empty() {
        eval.next_steps = synthesize_next_steps(eval);
    }

    if eval.overall_percentile.is_none() {
        eval.overall_percentile = Some(percentile_label(eval.total_score, level).to_string());
    }
}

/// Lowest-scoring category first, then a recommendation keyed to the overall
/// band.
fn synthesize_next_steps(eval: &RawEvaluation) -> Vec<String> {
    let mut steps = Vec::new();

    if let Some(weakest) = eval.category_scores.iter().min_by_key(|c| c.score) {
        steps.push(format!(
            "Focus your next practice sessions on {}: it was your lowest-scoring \
             area at {}.",
            weakest.name, weakest.score
        ));
    }

    let overall = if eval.total_score < 70 {
        "Rebuild the fundamentals: structure every answer around the situation, \
         what you did, and the result before adding depth."
    } else if eval.total_score <= 85 {
        "Refine strong answers with concrete examples and measurable outcomes."
    } else {
        "Maintain your consistency: practice advanced scenarios and edge cases \
         to stay sharp."
    };
    steps.push(overall.to_string());

    steps
}

/// Reliability of the report as a 0-100 integer, weighted 70% answer
/// coverage and 30% candidate speech volume. A report over two one-word
/// answers is arithmetically valid and still nearly worthless; this number
/// says so.
pub fn reliability_score(transcript: &[Utterance], question_count: usize) -> i64 {
    let answers: Vec<&Utterance> = transcript
        .iter()
        .filter(|u| u.role == Role::Candidate)
        .collect();

    let coverage = if question_count == 0 {
        0.0
    } else {
        (answers.len() as f64 / question_count as f64).min(1.0)
    };

    let candidate_chars: usize = answers.iter().map(|u| u.content.len()).sum();
    let volume = (candidate_chars as f64 / VOLUME_TARGET_CHARS as f64).min(1.0);

    ((coverage * 0.7 + volume * 0.3) * 100.0).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn evaluation(total: i64, category_scores: &[(&str, i64)]) -> RawEvaluation {
        let categories: Vec<serde_json::Value> = category_scores
            .iter()
            .map(|(name, score)| {
                json!({
                    "name": name,
                    "score": score,
                    "confidence": "medium",
                    "evidence": [],
                    "comment": "c",
                    "improvement_tips": []
                })
            })
            .collect();
        serde_json::from_value(json!({
            "total_score": total,
            "category_scores": categories,
            "question_ratings": [],
            "strengths": [],
            "areas_for_improvement": [],
            "final_assessment": "f"
        }))
        .unwrap()
    }

    #[test]
    fn test_missing_limitations_backfilled_verbatim() {
        let mut eval = evaluation(70, &[("Communication Skills", 70)]);
        augment(&mut eval, Level::Mid);
        assert_eq!(eval.limitations.len(), 6);
        for (got, want) in eval.limitations.iter().zip(ASSESSMENT_LIMITATIONS) {
            assert_eq!(got, want);
        }
    }

    #[test]
    fn test_model_supplied_limitations_kept() {
        let mut eval = evaluation(70, &[("Communication Skills", 70)]);
        eval.limitations = vec!["transcript was partially inaudible".to_string()];
        augment(&mut eval, Level::Mid);
        assert_eq!(eval.limitations.len(), 1);
    }

    #[test]
    fn test_next_steps_name_the_weakest_category() {
        let mut eval = evaluation(
            72,
            &[
                ("Communication Skills", 80),
                ("Technical Knowledge", 55),
                ("Problem Solving", 75),
            ],
        );
        augment(&mut eval, Level::Mid);
        assert!(eval.next_steps[0].contains("Technical Knowledge"));
        assert!(eval.next_steps[1].contains("concrete examples"));
    }

    #[test]
    fn test_next_steps_band_recommendations() {
        let mut low = evaluation(50, &[("Communication Skills", 50)]);
        augment(&mut low, Level::Mid);
        assert!(low.next_steps[1].contains("fundamentals"));

        let mut high = evaluation(90, &[("Communication Skills", 90)]);
        augment(&mut high, Level::Mid);
        assert!(high.next_steps[1].contains("advanced scenarios"));
    }

    #[test]
    fn test_percentiles_filled_for_overall_and_categories() {
        let mut eval = evaluation(92, &[("Communication Skills", 40)]);
        augment(&mut eval, Level::Senior);
        assert_eq!(
            eval.overall_percentile.as_deref(),
            Some("Top 10% of candidates")
        );
        let category = &eval.category_scores[0];
        assert_eq!(category.percentile.as_deref(), Some("Bottom 20% of candidates"));
        assert_eq!(
            category.benchmark_comparison.as_deref(),
            Some("Scores well below the typical senior candidate")
        );
    }

    #[test]
    fn test_reliability_rewards_coverage_and_volume() {
        let answer = "a ".repeat(1300); // 2600 chars, past the volume target
        let full: Vec<Utterance> = (0..5)
            .map(|_| Utterance {
                role: Role::Candidate,
                content: answer.clone(),
            })
            .collect();
        assert_eq!(reliability_score(&full, 5), 100);

        let sparse = vec![Utterance {
            role: Role::Candidate,
            content: "yes".to_string(),
        }];
        // 1 of 5 answered, negligible volume.
        assert_eq!(reliability_score(&sparse, 5), 14);

        assert_eq!(reliability_score(&[], 5), 0);
    }
}
