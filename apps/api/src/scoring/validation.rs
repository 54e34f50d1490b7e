//! Structural validation of evaluator output.
//!
//! A report that fails any check here is never persisted. The pipeline gets
//! one repair round-trip with the model; after that it fails closed.

use crate::llm_client::strip_json_fences;
use crate::models::feedback::{is_valid_category, RawEvaluation, CATEGORY_NAMES};

const SCORE_RANGE: std::ops::RangeInclusive<i64> = 0..=100;

#[derive(Debug, Default)]
pub struct ValidationReport {
    /// Fatal defects. Any entry here blocks persistence.
    pub errors: Vec<String>,
    /// Data-quality notes recorded in the report's metadata.
    pub flags: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Parses evaluator output into a [`RawEvaluation`].
///
/// Tries the text as-is first. If that fails, strips code fences and slices
/// from the first `{` to the last `}` before one more attempt, which salvages
/// responses wrapped in prose despite the JSON-only system prompt.
pub fn parse_evaluation(raw: &str) -> Result<RawEvaluation, String> {
    if let Ok(eval) = serde_json::from_str::<RawEvaluation>(raw) {
        return Ok(eval);
    }

    let stripped = strip_json_fences(raw);
    let candidate = slice_outer_object(stripped).unwrap_or(stripped);
    serde_json::from_str(candidate).map_err(|e| format!("response is not a valid evaluation: {e}"))
}

fn slice_outer_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Checks an evaluation against the rubric contract.
///
/// Fatal: wrong category set, any score outside 0-100, question ratings that
/// do not line up one-to-one and in order with the questions asked, or an
/// empty final assessment. Flagged but tolerated: a score of 80+ without a
/// supporting quote.
pub fn validate(eval: &RawEvaluation, questions: &[String]) -> ValidationReport {
    let mut report = ValidationReport::default();

    if !SCORE_RANGE.contains(&eval.total_score) {
        report
            .errors
            .push(format!("total_score {} is out of range 0-100", eval.total_score));
    }

    for name in CATEGORY_NAMES {
        match eval.category_scores.iter().filter(|c| c.name == name).count() {
            0 => report.errors.push(format!("category \"{name}\" is missing")),
            1 => {}
            n => report
                .errors
                .push(format!("category \"{name}\" appears {n} times")),
        }
    }

    for category in &eval.category_scores {
        if !is_valid_category(&category.name) {
            report
                .errors
                .push(format!("\"{}\" is not a rubric category", category.name));
        }
        if !SCORE_RANGE.contains(&category.score) {
            report.errors.push(format!(
                "category \"{}\" score {} is out of range 0-100",
                category.name, category.score
            ));
        } else if category.score >= 80
            && category.evidence.iter().all(|e| e.trim().is_empty())
        {
            report.flags.push(format!(
                "category \"{}\" scored {} without evidence",
                category.name, category.score
            ));
        }
    }

    if eval.question_ratings.len() != questions.len() {
        report.errors.push(format!(
            "expected {} question ratings, got {}",
            questions.len(),
            eval.question_ratings.len()
        ));
    } else {
        for (i, rating) in eval.question_ratings.iter().enumerate() {
            let expected = (i + 1) as i64;
            if rating.question_number != expected {
                report.errors.push(format!(
                    "question rating at position {} has question_number {}",
                    expected, rating.question_number
                ));
            }
            if !SCORE_RANGE.contains(&rating.score) {
                report.errors.push(format!(
                    "question {} score {} is out of range 0-100",
                    expected, rating.score
                ));
            }
        }
    }

    if eval.final_assessment.trim().is_empty() {
        report.errors.push("final_assessment is empty".to_string());
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_evaluation() -> serde_json::Value {
        let categories: Vec<serde_json::Value> = CATEGORY_NAMES
            .iter()
            .map(|name| {
                json!({
                    "name": name,
                    "score": 65,
                    "confidence": "medium",
                    "evidence": ["a direct quote"],
                    "comment": "held up under follow-ups",
                    "improvement_tips": ["be more concrete"]
                })
            })
            .collect();
        json!({
            "total_score": 65,
            "category_scores": categories,
            "question_ratings": [
                {"question_number": 1, "question": "q1", "score": 60, "assessment": "ok"},
                {"question_number": 2, "question": "q2", "score": 70, "assessment": "good"}
            ],
            "strengths": ["clear structure"],
            "areas_for_improvement": ["quantify results"],
            "final_assessment": "Solid answers overall. Go deeper on trade-offs next time."
        })
    }

    fn questions() -> Vec<String> {
        vec!["q1".to_string(), "q2".to_string()]
    }

    #[test]
    fn test_valid_evaluation_passes() {
        let eval: RawEvaluation = serde_json::from_value(valid_evaluation()).unwrap();
        let report = validate(&eval, &questions());
        assert!(report.is_valid(), "unexpected errors: {:?}", report.errors);
        assert!(report.flags.is_empty());
    }

    #[test]
    fn test_missing_category_is_fatal() {
        let mut value = valid_evaluation();
        value["category_scores"].as_array_mut().unwrap().remove(1);
        let eval: RawEvaluation = serde_json::from_value(value).unwrap();
        let report = validate(&eval, &questions());
        assert!(!report.is_valid());
        assert!(report
            .errors
            .iter()
            .any(|e| e.contains("Technical Knowledge") && e.contains("missing")));
    }

    #[test]
    fn test_out_of_range_score_is_fatal() {
        let mut value = valid_evaluation();
        value["category_scores"][0]["score"] = json!(140);
        let eval: RawEvaluation = serde_json::from_value(value).unwrap();
        assert!(!validate(&eval, &questions()).is_valid());
    }

    #[test]
    fn test_misnumbered_ratings_are_fatal() {
        let mut value = valid_evaluation();
        value["question_ratings"][1]["question_number"] = json!(5);
        let eval: RawEvaluation = serde_json::from_value(value).unwrap();
        let report = validate(&eval, &questions());
        assert!(report.errors.iter().any(|e| e.contains("question_number 5")));
    }

    #[test]
    fn test_rating_count_mismatch_is_fatal() {
        let eval: RawEvaluation = serde_json::from_value(valid_evaluation()).unwrap();
        let report = validate(&eval, &["q1".to_string()]);
        assert!(report
            .errors
            .iter()
            .any(|e| e.contains("expected 1 question ratings, got 2")));
    }

    #[test]
    fn test_empty_assessment_is_fatal() {
        let mut value = valid_evaluation();
        value["final_assessment"] = json!("   ");
        let eval: RawEvaluation = serde_json::from_value(value).unwrap();
        assert!(!validate(&eval, &questions()).is_valid());
    }

    #[test]
    fn test_high_score_without_evidence_is_flagged_not_fatal() {
        let mut value = valid_evaluation();
        value["category_scores"][2]["score"] = json!(85);
        value["category_scores"][2]["evidence"] = json!([]);
        value["total_score"] = json!(70);
        let eval: RawEvaluation = serde_json::from_value(value).unwrap();
        let report = validate(&eval, &questions());
        assert!(report.is_valid());
        assert_eq!(report.flags.len(), 1);
        assert!(report.flags[0].contains("Problem Solving"));
    }

    #[test]
    fn test_parse_salvages_prose_wrapped_json() {
        let raw = format!(
            "Here is the evaluation you asked for:\n```json\n{}\n```\nHope that helps!",
            valid_evaluation()
        );
        let eval = parse_evaluation(&raw);
        assert!(eval.is_ok());
        assert_eq!(eval.unwrap().total_score, 65);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_evaluation("I cannot evaluate this transcript.").is_err());
    }
}
