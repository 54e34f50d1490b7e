//! The feedback scoring pipeline.
//!
//! One LLM evaluation per interview, wrapped in deterministic machinery:
//! input preparation (question cap, transcript truncation, level
//! normalization), strict schema validation with a single repair pass,
//! rule-based calibration caps the model cannot talk its way out of, and
//! percentile/limitations/next-steps augmentation computed locally. A report
//! either comes out complete or not at all.

pub mod augment;
pub mod calibration;
pub mod evaluator;
pub mod handlers;
pub mod percentile;
pub mod pipeline;
pub mod prompts;
pub mod store;
pub mod validation;
