//! Interview generation: prompt assembly, LLM question synthesis with
//! retry, and persistence of the resulting interview row.

pub mod generator;
pub mod handlers;
pub mod prompts;
