// Shared prompt fragments.
// Each service that makes LLM calls defines its own prompts.rs alongside it;
// this file holds only the pieces every caller shares.

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You are a precise, structured assistant. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON value. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Instruction appended to prompts whose output is deserialized against a
/// fixed schema.
pub const STRICT_SCHEMA_INSTRUCTION: &str = "\
    CRITICAL: Return EXACTLY the schema shown in the example. \
    No extra keys, no missing keys, no trailing commas. \
    Numbers must be plain integers, not strings.";
