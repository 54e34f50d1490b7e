//! Percentile and benchmark lookups.
//!
//! The same score reads differently by experience level: a 85 is excellent
//! for a junior and merely good for a senior. Pure lookup tables, no model
//! involvement.

use crate::scoring::calibration::Level;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    Excellent,
    Good,
    Adequate,
    Concerning,
    Poor,
}

/// Band minimums per level, strictest band first. Senior minimums are the
/// highest across the board.
fn thresholds(level: Level) -> [i64; 4] {
    match level {
        Level::Junior => [85, 70, 55, 40],
        Level::Mid => [88, 75, 60, 45],
        Level::Senior => [90, 80, 65, 50],
    }
}

pub fn band_for_score(score: i64, level: Level) -> Band {
    let [excellent, good, adequate, concerning] = thresholds(level);
    if score >= excellent {
        Band::Excellent
    } else if score >= good {
        Band::Good
    } else if score >= adequate {
        Band::Adequate
    } else if score >= concerning {
        Band::Concerning
    } else {
        Band::Poor
    }
}

pub fn percentile_label(score: i64, level: Level) -> &'static str {
    match band_for_score(score, level) {
        Band::Excellent => "Top 10% of candidates",
        Band::Good => "Top 25% of candidates",
        Band::Adequate => "Top 50% of candidates",
        Band::Concerning => "Bottom 40% of candidates",
        Band::Poor => "Bottom 20% of candidates",
    }
}

/// One-line comparison against the typical candidate at this level, attached
/// to each category score.
pub fn benchmark_comparison(score: i64, level: Level) -> String {
    let descriptor = match band_for_score(score, level) {
        Band::Excellent => "well above",
        Band::Good => "above",
        Band::Adequate => "in line with",
        Band::Concerning => "below",
        Band::Poor => "well below",
    };
    format!(
        "Scores {descriptor} the typical {} candidate",
        level_noun(level)
    )
}

fn level_noun(level: Level) -> &'static str {
    match level {
        Level::Junior => "junior",
        Level::Mid => "mid-level",
        Level::Senior => "senior",
    }
}
