// Evaluation prompt. The calibration rules the pipeline enforces in code are
// also spelled out here so a well-behaved model agrees with the enforcement
// instead of fighting it.

use crate::llm_client::prompts::{JSON_ONLY_SYSTEM, STRICT_SCHEMA_INSTRUCTION};

pub const EVALUATION_SYSTEM_ROLE: &str = "You are a rigorous interview assessor. \
    You score mock interview transcripts against a fixed five-category rubric. \
    You are fair but strict: scores above 80 are reserved for genuinely strong, \
    evidence-backed performances.";

const EVALUATION_PROMPT_TEMPLATE: &str = r#"Assess the following mock interview.

ROLE: {role}
EXPERIENCE LEVEL: {level}

QUESTIONS ASKED:
{questions}

TRANSCRIPT:
{transcript}

Score the candidate in EXACTLY these five categories, in this order:
- Communication Skills
- Technical Knowledge
- Problem Solving
- Cultural Fit
- Confidence and Clarity

HARD RULES:
1. Every score is an integer from 0 to 100.
2. Judge ONLY what is in the transcript. Do not invent strengths the
   candidate never demonstrated.
3. Every category scored 80 or above MUST include at least one direct quote
   from the candidate in its "evidence" array.
4. If the candidate gave no real answers (said "testing", refused, or spoke
   off-topic), no score may exceed 10.
5. If answers were minimal (a sentence or less per question), no score may
   exceed 30.
6. Rate every question listed above, in order, using 1-based question_number.
7. "final_assessment" is 2-4 sentences of plain, direct feedback addressed
   to the candidate.

Return JSON with EXACTLY this shape:
{
  "total_score": 72,
  "category_scores": [
    {
      "name": "Communication Skills",
      "score": 74,
      "confidence": "high",
      "evidence": ["direct quote from the candidate"],
      "comment": "one or two sentences on this category",
      "improvement_tips": ["one concrete tip", "another concrete tip"]
    }
  ],
  "question_ratings": [
    {
      "question_number": 1,
      "question": "the question text",
      "score": 70,
      "assessment": "one sentence on how the answer landed"
    }
  ],
  "strengths": ["specific strength shown in the transcript"],
  "areas_for_improvement": ["specific gap shown in the transcript"],
  "final_assessment": "2-4 sentences addressed to the candidate."
}

"category_scores" must contain all five categories. Do not add keys."#;

pub fn build_evaluation_system() -> String {
    format!("{EVALUATION_SYSTEM_ROLE} {JSON_ONLY_SYSTEM} {STRICT_SCHEMA_INSTRUCTION}")
}

pub fn build_evaluation_prompt(
    role: &str,
    level: &str,
    questions: &[String],
    transcript: &str,
) -> String {
    let questions_block = questions
        .iter()
        .enumerate()
        .map(|(i, q)| format!("{}. {}", i + 1, q))
        .collect::<Vec<_>>()
        .join("\n");

    EVALUATION_PROMPT_TEMPLATE
        .replace("{role}", role)
        .replace("{level}", level)
        .replace("{questions}", &questions_block)
        .replace("{transcript}", transcript)
}

const REPAIR_PROMPT_TEMPLATE: &str = r#"Your previous evaluation did not match the required schema.

PROBLEMS:
{problems}

YOUR PREVIOUS RESPONSE:
{previous}

Return the SAME evaluation with every listed problem fixed. Keep the exact
JSON shape from before: total_score, category_scores (all five categories),
question_ratings (1-based, one per question, in order), strengths,
areas_for_improvement, final_assessment. Do not change scores that were not
part of a problem."#;

/// One repair attempt is allowed per evaluation. The pipeline fails closed
/// if the repaired response is still invalid.
pub fn build_repair_prompt(problems: &[String], previous: &str) -> String {
    let problems_block = problems
        .iter()
        .map(|p| format!("- {p}"))
        .collect::<Vec<_>>()
        .join("\n");

    REPAIR_PROMPT_TEMPLATE
        .replace("{problems}", &problems_block)
        .replace("{previous}", previous)
}
