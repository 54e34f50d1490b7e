//! Deterministic calibration: input preparation and effort caps.
//!
//! The caps exist because models flatter. A candidate who answered
//! "testing" five times will still get a 60 from an uncalibrated judge; the
//! rules here run after evaluation and clamp whatever came back, so prompt
//! compliance is a bonus rather than a requirement.

use crate::models::feedback::RawEvaluation;
use crate::models::transcript::{Role, Utterance};

/// Questions beyond this many are not sent to the evaluator.
pub const MAX_QUESTIONS: usize = 15;

/// Transcript budget in characters, cut on utterance boundaries.
pub const TRANSCRIPT_CHAR_BUDGET: usize = 24_000;

pub const TRUNCATION_MARKER: &str = "[transcript truncated]";

/// Scores when the candidate gave nothing to assess.
const NO_SUBSTANCE_CAP: i64 = 10;
/// Scores when answers existed but averaged under ten substantive words.
const MINIMAL_EFFORT_CAP: i64 = 30;
const MINIMAL_EFFORT_WORDS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Junior,
    Mid,
    Senior,
}

impl Level {
    /// Normalizes free-form level strings. Unknown input means mid, not an
    /// error: the field comes from UI dropdowns and old records.
    pub fn parse(raw: &str) -> Level {
        match raw.trim().to_lowercase().as_str() {
            "junior" | "jr" | "entry" | "entry-level" | "intern" => Level::Junior,
            "senior" | "sr" | "staff" | "lead" | "principal" => Level::Senior,
            _ => Level::Mid,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Level::Junior => "junior",
            Level::Mid => "mid",
            Level::Senior => "senior",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TranscriptPrep {
    pub text: String,
    pub chars: usize,
    pub truncated: bool,
}

fn speaker(role: Role) -> &'static str {
    match role {
        Role::Interviewer => "Interviewer",
        Role::Candidate => "Candidate",
        Role::System => "System",
    }
}

/// Renders `role: content` lines up to the character budget. Truncation cuts
/// whole utterances and appends the marker so the evaluator knows the tail
/// is missing.
pub fn render_transcript(transcript: &[Utterance]) -> TranscriptPrep {
    let mut text = String::new();
    let mut truncated = false;

    for utterance in transcript {
        let line = format!("{}: {}\n", speaker(utterance.role), utterance.content.trim());
        if text.len() + line.len() > TRANSCRIPT_CHAR_BUDGET {
            truncated = true;
            break;
        }
        text.push_str(&line);
    }

    if truncated {
        text.push_str(TRUNCATION_MARKER);
    }
    let chars = text.chars().count();
    TranscriptPrep {
        text,
        chars,
        truncated,
    }
}

/// Caps question lists at the evaluator's limit, keeping the first ones.
pub fn cap_questions(questions: &[String]) -> &[String] {
    &questions[..questions.len().min(MAX_QUESTIONS)]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffortCap {
    NoSubstance,
    MinimalEffort,
}

impl EffortCap {
    pub fn max_score(self) -> i64 {
        match self {
            EffortCap::NoSubstance => NO_SUBSTANCE_CAP,
            EffortCap::MinimalEffort => MINIMAL_EFFORT_CAP,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EffortCap::NoSubstance => "no_substance",
            EffortCap::MinimalEffort => "minimal_effort",
        }
    }
}

/// Phrases that mark an utterance as a non-answer.
const THROWAWAY_ANSWERS: [&str; 12] = [
    "testing",
    "test",
    "just testing",
    "no",
    "nope",
    "idk",
    "i don't know",
    "i dont know",
    "skip",
    "pass",
    "no comment",
    "n/a",
];

fn is_throwaway(answer: &str) -> bool {
    let normalized: String = answer
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '\'' || *c == '/')
        .collect();
    let normalized = normalized.trim();
    THROWAWAY_ANSWERS.contains(&normalized) || normalized.is_empty()
}

fn word_count(answer: &str) -> usize {
    answer.split_whitespace().count()
}

/// Decides whether a cap applies, from the candidate's side of the
/// transcript only. No answers, or nothing but throwaway answers, is the
/// hard cap; real answers that average under ten words are the soft one.
pub fn effort_cap(transcript: &[Utterance]) -> Option<EffortCap> {
    let answers: Vec<&str> = transcript
        .iter()
        .filter(|u| u.role == Role::Candidate)
        .map(|u| u.content.as_str())
        .collect();

    if answers.is_empty() || answers.iter().all(|a| is_throwaway(a)) {
        return Some(EffortCap::NoSubstance);
    }

    let substantive_words: usize = answers
        .iter()
        .filter(|a| !is_throwaway(a))
        .map(|a| word_count(a))
        .sum();
    if substantive_words / answers.len() < MINIMAL_EFFORT_WORDS {
        return Some(EffortCap::MinimalEffort);
    }

    None
}

/// Clamps every score in the evaluation to the cap. Total, categories and
/// per-question ratings all move together so the report stays coherent.
pub fn apply_cap(eval: &mut RawEvaluation, cap: EffortCap) {
    let max = cap.max_score();
    eval.total_score = eval.total_score.min(max);
    for category in &mut eval.category_scores {
        category.score = category.score.min(max);
    }
    for rating in &mut eval.question_ratings {
        rating.score = rating.score.min(max);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(content: &str) -> Utterance {
        Utterance {
            role: Role::Candidate,
            content: content.to_string(),
        }
    }

    fn interviewer(content: &str) -> Utterance {
        Utterance {
            role: Role::Interviewer,
            content: content.to_string(),
        }
    }

    #[test]
    fn test_level_parse_known_aliases() {
        assert_eq!(Level::parse("Senior"), Level::Senior);
        assert_eq!(Level::parse("staff"), Level::Senior);
        assert_eq!(Level::parse("entry-level"), Level::Junior);
        assert_eq!(Level::parse("mid"), Level::Mid);
    }

    #[test]
    fn test_level_parse_defaults_to_mid() {
        assert_eq!(Level::parse("architect III"), Level::Mid);
        assert_eq!(Level::parse(""), Level::Mid);
    }

    #[test]
    fn test_render_transcript_formats_speakers() {
        let prep = render_transcript(&[
            interviewer("Tell me about yourself."),
            candidate("I spent four years on payments infrastructure."),
        ]);
        assert!(prep.text.starts_with("Interviewer: Tell me about yourself.\n"));
        assert!(prep.text.contains("Candidate: I spent four years"));
        assert!(!prep.truncated);
    }

    #[test]
    fn test_render_transcript_truncates_on_utterance_boundary() {
        let long = "word ".repeat(2000); // ~10k chars per utterance
        let utterances: Vec<Utterance> = (0..5).map(|_| candidate(&long)).collect();
        let prep = render_transcript(&utterances);
        assert!(prep.truncated);
        assert!(prep.text.ends_with(TRUNCATION_MARKER));
        assert!(prep.text.len() <= TRANSCRIPT_CHAR_BUDGET + TRUNCATION_MARKER.len());
    }

    #[test]
    fn test_cap_questions_keeps_first_fifteen() {
        let questions: Vec<String> = (0..20).map(|i| format!("q{i}")).collect();
        let capped = cap_questions(&questions);
        assert_eq!(capped.len(), 15);
        assert_eq!(capped[0], "q0");
        assert_eq!(capped[14], "q14");
    }

    #[test]
    fn test_all_testing_answers_hit_hard_cap() {
        let transcript = vec![
            interviewer("First question?"),
            candidate("testing"),
            interviewer("Second question?"),
            candidate("Testing."),
            candidate("testing"),
        ];
        assert_eq!(effort_cap(&transcript), Some(EffortCap::NoSubstance));
    }

    #[test]
    fn test_refusals_hit_hard_cap() {
        let transcript = vec![candidate("no"), candidate("skip"), candidate("I don't know")];
        assert_eq!(effort_cap(&transcript), Some(EffortCap::NoSubstance));
    }

    #[test]
    fn test_short_answers_hit_soft_cap() {
        let transcript = vec![
            candidate("I used Python."),
            candidate("Maybe microservices."),
            candidate("Yes, I think so."),
        ];
        assert_eq!(effort_cap(&transcript), Some(EffortCap::MinimalEffort));
    }

    #[test]
    fn test_substantive_answers_are_uncapped() {
        let transcript = vec![
            candidate(
                "At my last role I designed the ingestion pipeline that handled \
                 roughly two million events per hour, and I led the migration off \
                 the legacy queue without downtime.",
            ),
            candidate(
                "I usually start with the failure modes: what happens when the \
                 downstream is slow, when messages duplicate, and when a consumer \
                 crashes mid-batch.",
            ),
        ];
        assert_eq!(effort_cap(&transcript), None);
    }

    #[test]
    fn test_apply_cap_clamps_every_score() {
        let mut eval: RawEvaluation = serde_json::from_value(serde_json::json!({
            "total_score": 78,
            "category_scores": [
                {"name": "Communication Skills", "score": 82, "confidence": "high",
                 "evidence": ["q"], "comment": "c", "improvement_tips": []},
                {"name": "Technical Knowledge", "score": 8, "confidence": "low",
                 "evidence": [], "comment": "c", "improvement_tips": []}
            ],
            "question_ratings": [
                {"question_number": 1, "question": "q", "score": 65, "assessment": "a"}
            ],
            "strengths": [], "areas_for_improvement": [],
            "final_assessment": "f"
        }))
        .unwrap();

        apply_cap(&mut eval, EffortCap::NoSubstance);
        assert_eq!(eval.total_score, 10);
        assert_eq!(eval.category_scores[0].score, 10);
        assert_eq!(eval.category_scores[1].score, 8);
        assert_eq!(eval.question_ratings[0].score, 10);
    }
}
