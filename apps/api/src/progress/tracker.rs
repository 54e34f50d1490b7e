//! Session-over-session comparison and long-run progress rollups.
//!
//! Rollups are written on the feedback path and read back on the progress
//! endpoint, so reads stay cheap. A user needs at least two reports before
//! any of this applies; a first session has nothing to compare against.

use std::sync::Arc;

use chrono::Utc;
use sqlx::types::Json;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::feedback::CATEGORY_NAMES;
use crate::models::progress::{
    CategoryTrend, ComparisonDirection, ProgressTrend, SessionComparison, TrendConfidence,
    TrendDirection, UserProgress,
};
use crate::progress::store::{FeedbackPoint, ProgressRollup, ProgressStore};
use crate::progress::trend::calculate_trend;

/// Prior sessions loaded for the comparison path.
const COMPARISON_WINDOW: i64 = 5;
/// Sessions fitted for trends.
const TREND_WINDOW: i64 = 10;
/// Score deltas under this read as "consistent", not movement.
const CONSISTENT_DELTA: i64 = 2;
/// A 20-point standard deviation over recent sessions counts as fully
/// inconsistent.
const MAX_REASONABLE_STDEV: f64 = 20.0;

#[derive(Clone)]
pub struct ProgressTracker {
    store: Arc<dyn ProgressStore>,
}

impl ProgressTracker {
    pub fn new(store: Arc<dyn ProgressStore>) -> Self {
        Self { store }
    }

    /// Compares a fresh score against the most recent prior session.
    /// `None` on a first-ever report. Call before the new report is
    /// persisted, or the score will be compared against itself.
    pub async fn session_comparison(
        &self,
        user_id: Uuid,
        current_score: i64,
    ) -> Result<Option<SessionComparison>, AppError> {
        let history = self.store.recent_scores(user_id, COMPARISON_WINDOW).await?;
        let Some(previous) = history.first() else {
            return Ok(None);
        };

        let previous_score = previous.total_score;
        let delta = current_score - previous_score;
        let percent_change = if previous_score <= 0 {
            0.0
        } else {
            delta as f64 / previous_score as f64 * 100.0
        };
        let direction = if delta.abs() < CONSISTENT_DELTA {
            ComparisonDirection::Consistent
        } else if delta > 0 {
            ComparisonDirection::Improved
        } else {
            ComparisonDirection::Declined
        };

        let mut last_three = vec![current_score];
        last_three.extend(history.iter().take(2).map(|p| p.total_score));

        Ok(Some(SessionComparison {
            previous_score,
            delta,
            percent_change,
            direction,
            consistency_note: consistency_note(&last_three),
        }))
    }

    /// Recomputes the rollup after a report lands. Skipped until the user
    /// has two reports: single-session "trends" are noise.
    pub async fn record_feedback(&self, user_id: Uuid) -> Result<(), AppError> {
        let recent = self.store.recent_scores(user_id, TREND_WINDOW).await?;
        if recent.len() < 2 {
            return Ok(());
        }
        let total_sessions = self.store.feedback_count(user_id).await?;
        let rollup = build_rollup(user_id, total_sessions, &recent);
        self.store.upsert_rollup(&rollup).await
    }

    /// The stored rollup, computing and storing one on the fly for history
    /// that predates rollups. `None` until the user has two reports.
    pub async fn progress_summary(
        &self,
        user_id: Uuid,
    ) -> Result<Option<UserProgress>, AppError> {
        if let Some(row) = self.store.fetch_rollup(user_id).await? {
            return Ok(Some(row));
        }

        let recent = self.store.recent_scores(user_id, TREND_WINDOW).await?;
        if recent.len() < 2 {
            return Ok(None);
        }
        let total_sessions = self.store.feedback_count(user_id).await?;
        let rollup = build_rollup(user_id, total_sessions, &recent);
        self.store.upsert_rollup(&rollup).await?;

        Ok(Some(UserProgress {
            user_id,
            total_sessions: rollup.total_sessions,
            average_score: rollup.average_score,
            best_score: rollup.best_score,
            recent_trend: Json(rollup.recent_trend),
            category_trends: Json(rollup.category_trends),
            recommendations: rollup.recommendations,
            last_updated: Utc::now(),
        }))
    }
}

fn consistency_note(scores: &[i64]) -> String {
    let n = scores.len() as f64;
    let mean = scores.iter().sum::<i64>() as f64 / n;
    let variance = scores
        .iter()
        .map(|&s| {
            let d = s as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    let consistency = (1.0 - variance.sqrt() / MAX_REASONABLE_STDEV).clamp(0.0, 1.0);

    let note = if consistency >= 0.9 {
        "Very consistent performance across recent sessions"
    } else if consistency >= 0.8 {
        "Consistent performance across recent sessions"
    } else if consistency >= 0.7 {
        "Somewhat variable performance across recent sessions"
    } else {
        "Variable performance across recent sessions"
    };
    note.to_string()
}

/// `recent` arrives most recent first; the fits want chronological order.
fn build_rollup(user_id: Uuid, total_sessions: i64, recent: &[FeedbackPoint]) -> ProgressRollup {
    let chronological: Vec<i64> = recent.iter().rev().map(|p| p.total_score).collect();
    let average_score =
        chronological.iter().sum::<i64>() as f64 / chronological.len() as f64;
    let best_score = chronological.iter().copied().max().unwrap_or(0);
    let recent_trend = calculate_trend(&chronological).unwrap_or(ProgressTrend {
        direction: TrendDirection::Consistent,
        rate: 0.0,
        confidence: TrendConfidence::Low,
    });

    let mut category_trends = Vec::new();
    for name in CATEGORY_NAMES {
        let series: Vec<i64> = recent
            .iter()
            .rev()
            .filter_map(|p| {
                p.category_scores
                    .iter()
                    .find(|(n, _)| n.as_str() == name)
                    .map(|(_, score)| *score)
            })
            .collect();
        // Categories with a single data point get no trend.
        if let Some(trend) = calculate_trend(&series) {
            category_trends.push(CategoryTrend {
                category: name.to_string(),
                trend,
            });
        }
    }

    let recommendations = build_recommendations(&recent_trend, average_score, &category_trends);

    ProgressRollup {
        user_id,
        total_sessions,
        average_score,
        best_score,
        recent_trend,
        category_trends,
        recommendations,
    }
}

/// Ordered rules over (overall trend, average, category trends).
fn build_recommendations(
    overall: &ProgressTrend,
    average: f64,
    categories: &[CategoryTrend],
) -> Vec<String> {
    let mut recs = Vec::new();

    match overall.direction {
        TrendDirection::Improving => recs.push(
            "Scores are trending up. Keep the current practice cadence.".to_string(),
        ),
        TrendDirection::Declining => recs.push(
            "Recent scores dipped. Review the feedback from your last two sessions \
             before booking another."
                .to_string(),
        ),
        TrendDirection::Consistent => {
            if average >= 80.0 {
                recs.push(
                    "You are scoring consistently high. Raise the difficulty or try \
                     an unfamiliar interview format."
                        .to_string(),
                );
            } else {
                recs.push(
                    "Scores have plateaued. Change one variable per session and \
                     measure the effect."
                        .to_string(),
                );
            }
        }
    }

    if let Some(declining) = categories
        .iter()
        .find(|c| c.trend.direction == TrendDirection::Declining)
    {
        recs.push(format!(
            "{} is trending down across sessions. Target it directly in your next \
             practice.",
            declining.category
        ));
    }

    if average < 70.0 {
        recs.push(
            "Build a base with easier questions until your average clears 70, then \
             step the difficulty back up."
                .to_string(),
        );
    }

    recs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::store::MemoryProgressStore;

    fn tracker(store: Arc<MemoryProgressStore>) -> ProgressTracker {
        ProgressTracker::new(store)
    }

    #[tokio::test]
    async fn test_first_session_has_no_comparison() {
        let store = Arc::new(MemoryProgressStore::new());
        let t = tracker(store);
        let comparison = t.session_comparison(Uuid::new_v4(), 70).await.unwrap();
        assert!(comparison.is_none());
    }

    #[tokio::test]
    async fn test_comparison_against_most_recent_prior() {
        let store = Arc::new(MemoryProgressStore::new());
        let user = Uuid::new_v4();
        store.push_score(user, 60, &[]).await;
        store.push_score(user, 70, &[]).await;
        let t = tracker(store);

        let comparison = t.session_comparison(user, 80).await.unwrap().unwrap();
        assert_eq!(comparison.previous_score, 70);
        assert_eq!(comparison.delta, 10);
        assert!((comparison.percent_change - 14.285714285714286).abs() < 1e-9);
        assert_eq!(comparison.direction, ComparisonDirection::Improved);
    }

    #[tokio::test]
    async fn test_small_delta_reads_as_consistent() {
        let store = Arc::new(MemoryProgressStore::new());
        let user = Uuid::new_v4();
        store.push_score(user, 70, &[]).await;
        let t = tracker(store);

        let comparison = t.session_comparison(user, 71).await.unwrap().unwrap();
        assert_eq!(comparison.direction, ComparisonDirection::Consistent);
        assert_eq!(comparison.consistency_note, "Very consistent performance across recent sessions");
    }

    #[tokio::test]
    async fn test_zero_previous_score_has_zero_percent_change() {
        let store = Arc::new(MemoryProgressStore::new());
        let user = Uuid::new_v4();
        store.push_score(user, 0, &[]).await;
        let t = tracker(store);

        let comparison = t.session_comparison(user, 50).await.unwrap().unwrap();
        assert_eq!(comparison.delta, 50);
        assert_eq!(comparison.percent_change, 0.0);
    }

    #[tokio::test]
    async fn test_volatile_history_notes_variability() {
        let store = Arc::new(MemoryProgressStore::new());
        let user = Uuid::new_v4();
        store.push_score(user, 40, &[]).await;
        store.push_score(user, 75, &[]).await;
        let t = tracker(store);

        let comparison = t.session_comparison(user, 45).await.unwrap().unwrap();
        assert_eq!(
            comparison.consistency_note,
            "Variable performance across recent sessions"
        );
    }

    #[tokio::test]
    async fn test_progress_summary_requires_two_reports() {
        let store = Arc::new(MemoryProgressStore::new());
        let user = Uuid::new_v4();
        store.push_score(user, 70, &[]).await;
        let t = tracker(store);
        assert!(t.progress_summary(user).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_progress_summary_computes_and_stores_rollup() {
        let store = Arc::new(MemoryProgressStore::new());
        let user = Uuid::new_v4();
        for score in [60, 65, 70, 75] {
            store.push_score(user, score, &[]).await;
        }
        let t = tracker(store.clone());

        let progress = t.progress_summary(user).await.unwrap().unwrap();
        assert_eq!(progress.total_sessions, 4);
        assert_eq!(progress.best_score, 75);
        assert!((progress.average_score - 67.5).abs() < 1e-9);
        assert_eq!(progress.recent_trend.0.direction, TrendDirection::Improving);
        assert_eq!(progress.recent_trend.0.confidence, TrendConfidence::High);
        assert!(progress.recommendations[0].contains("trending up"));

        // Self-healed rollup is now stored.
        assert!(store.inner.lock().await.rollups.contains_key(&user));
    }

    #[tokio::test]
    async fn test_record_feedback_skips_single_session() {
        let store = Arc::new(MemoryProgressStore::new());
        let user = Uuid::new_v4();
        store.push_score(user, 70, &[]).await;
        let t = tracker(store.clone());

        t.record_feedback(user).await.unwrap();
        assert!(store.inner.lock().await.rollups.is_empty());
    }

    #[tokio::test]
    async fn test_record_feedback_stores_rollup() {
        let store = Arc::new(MemoryProgressStore::new());
        let user = Uuid::new_v4();
        store.push_score(user, 80, &[("Communication Skills", 78)]).await;
        store.push_score(user, 70, &[("Communication Skills", 66)]).await;
        let t = tracker(store.clone());

        t.record_feedback(user).await.unwrap();
        let inner = store.inner.lock().await;
        let rollup = inner.rollups.get(&user).unwrap();
        assert_eq!(rollup.total_sessions, 2);
        assert_eq!(rollup.best_score, 80);
        assert_eq!(rollup.recent_trend.direction, TrendDirection::Declining);
    }

    #[tokio::test]
    async fn test_sparse_categories_get_no_trend() {
        let store = Arc::new(MemoryProgressStore::new());
        let user = Uuid::new_v4();
        store
            .push_score(user, 60, &[("Communication Skills", 60)])
            .await;
        store
            .push_score(
                user,
                70,
                &[("Communication Skills", 72), ("Technical Knowledge", 68)],
            )
            .await;
        let t = tracker(store);

        let progress = t.progress_summary(user).await.unwrap().unwrap();
        let trends = &progress.category_trends.0;
        assert_eq!(trends.len(), 1);
        assert_eq!(trends[0].category, "Communication Skills");
        assert_eq!(trends[0].trend.direction, TrendDirection::Improving);
    }

    #[test]
    fn test_recommendations_follow_ordered_rules() {
        let improving = ProgressTrend {
            direction: TrendDirection::Improving,
            rate: 4.0,
            confidence: TrendConfidence::High,
        };
        let declining_category = vec![CategoryTrend {
            category: "Cultural Fit".to_string(),
            trend: ProgressTrend {
                direction: TrendDirection::Declining,
                rate: 3.0,
                confidence: TrendConfidence::Medium,
            },
        }];

        let recs = build_recommendations(&improving, 62.0, &declining_category);
        assert_eq!(recs.len(), 3);
        assert!(recs[0].contains("trending up"));
        assert!(recs[1].contains("Cultural Fit"));
        assert!(recs[2].contains("average clears 70"));

        let flat = ProgressTrend {
            direction: TrendDirection::Consistent,
            rate: 0.1,
            confidence: TrendConfidence::High,
        };
        let recs = build_recommendations(&flat, 84.0, &[]);
        assert_eq!(recs.len(), 1);
        assert!(recs[0].contains("Raise the difficulty"));
    }
}
