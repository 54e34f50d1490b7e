//! Least-squares trend fitting over score series.

use crate::models::progress::{ProgressTrend, TrendConfidence, TrendDirection};

/// Slopes flatter than this read as "consistent" regardless of sign.
const FLAT_SLOPE: f64 = 0.5;

/// Fits `score = a + b * session_index` over a chronological series and
/// classifies the result. Needs at least two points; `None` otherwise.
///
/// Direction comes from the slope, confidence from R². A perfectly flat
/// series gets R² = 1: the line explains it completely.
pub fn calculate_trend(scores: &[i64]) -> Option<ProgressTrend> {
    if scores.len() < 2 {
        return None;
    }

    let n = scores.len() as f64;
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = scores.iter().sum::<i64>() as f64 / n;

    let mut ss_xy = 0.0;
    let mut ss_xx = 0.0;
    let mut ss_tot = 0.0;
    for (i, &score) in scores.iter().enumerate() {
        let dx = i as f64 - mean_x;
        let dy = score as f64 - mean_y;
        ss_xy += dx * dy;
        ss_xx += dx * dx;
        ss_tot += dy * dy;
    }

    let slope = ss_xy / ss_xx;

    let mut ss_res = 0.0;
    for (i, &score) in scores.iter().enumerate() {
        let predicted = mean_y + slope * (i as f64 - mean_x);
        let residual = score as f64 - predicted;
        ss_res += residual * residual;
    }
    let r_squared = if ss_tot < 1e-6 {
        1.0
    } else {
        1.0 - ss_res / ss_tot
    };

    let direction = if slope.abs() < FLAT_SLOPE {
        TrendDirection::Consistent
    } else if slope > 0.0 {
        TrendDirection::Improving
    } else {
        TrendDirection::Declining
    };

    let confidence = if r_squared > 0.7 {
        TrendConfidence::High
    } else if r_squared > 0.4 {
        TrendConfidence::Medium
    } else {
        TrendConfidence::Low
    };

    Some(ProgressTrend {
        direction,
        rate: slope.abs(),
        confidence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steady_improvement_is_high_confidence() {
        let trend = calculate_trend(&[60, 65, 70, 75]).unwrap();
        assert_eq!(trend.direction, TrendDirection::Improving);
        assert_eq!(trend.confidence, TrendConfidence::High);
        assert!((trend.rate - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_steady_decline() {
        let trend = calculate_trend(&[80, 74, 69, 62]).unwrap();
        assert_eq!(trend.direction, TrendDirection::Declining);
        assert_eq!(trend.confidence, TrendConfidence::High);
    }

    #[test]
    fn test_flat_series_is_consistent_with_full_fit() {
        let trend = calculate_trend(&[70, 70, 70, 70]).unwrap();
        assert_eq!(trend.direction, TrendDirection::Consistent);
        assert_eq!(trend.confidence, TrendConfidence::High);
        assert_eq!(trend.rate, 0.0);
    }

    #[test]
    fn test_small_oscillation_is_consistent() {
        // Slope 0.2, under the flat threshold.
        let trend = calculate_trend(&[68, 69, 68, 69]).unwrap();
        assert_eq!(trend.direction, TrendDirection::Consistent);
    }

    #[test]
    fn test_noisy_series_is_low_confidence() {
        let trend = calculate_trend(&[60, 75, 58, 74]).unwrap();
        assert_eq!(trend.confidence, TrendConfidence::Low);
    }

    #[test]
    fn test_single_point_has_no_trend() {
        assert!(calculate_trend(&[70]).is_none());
        assert!(calculate_trend(&[]).is_none());
    }
}
