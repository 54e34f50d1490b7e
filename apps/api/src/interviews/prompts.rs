// Question generation prompt.

use crate::llm_client::prompts::{JSON_ONLY_SYSTEM, STRICT_SCHEMA_INSTRUCTION};

pub const QUESTION_SYSTEM_ROLE: &str = "You are an experienced interviewer who \
    writes sharp, realistic interview questions tailored to a role and \
    seniority. You never pad with generic filler questions.";

pub const QUESTION_PROMPT_TEMPLATE: &str = r#"Write questions for a mock interview.

ROLE: {role}
EXPERIENCE LEVEL: {level}
INTERVIEW TYPE: {interview_type}
TONE: {tone}
DIFFICULTY: {difficulty}
KEY SKILLS TO PROBE: {skills}

RULES:
1. Write EXACTLY {count} questions.
2. Every question must be answerable out loud in under three minutes.
3. Match the interview type: behavioral questions ask for past situations,
   technical questions probe depth on the listed skills, mixed alternates
   between the two.
4. No multi-part questions. One question asks one thing.
5. Order from warm-up to hardest.

Return a JSON array of exactly {count} strings:
["first question", "second question"]"#;

pub fn build_question_system() -> String {
    format!("{QUESTION_SYSTEM_ROLE} {JSON_ONLY_SYSTEM} {STRICT_SCHEMA_INSTRUCTION}")
}
