//! Cross-session progress: comparisons, trend fits, recommendations.

pub mod handlers;
pub mod store;
pub mod tracker;
pub mod trend;
