// src/elo.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::{
    BASELINE_RATING, K_MEDIUM, K_NEW, K_NEW_THRESHOLD, K_STABLE, K_TESTED_THRESHOLD,
    MAX_PAIR_SKIPS,
};

/// An immutable record of one decided comparison.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ComparisonRecord {
    pub song_id_a: String,
    pub song_id_b: String,
    pub winner_id: String,
    pub timestamp: DateTime<Utc>,
}

impl ComparisonRecord {
    fn involves(&self, song_id: &str) -> bool {
        self.song_id_a == song_id || self.song_id_b == song_id
    }

    fn matches_pair(&self, song_id_a: &str, song_id_b: &str) -> bool {
        (self.song_id_a == song_id_a && self.song_id_b == song_id_b)
            || (self.song_id_a == song_id_b && self.song_id_b == song_id_a)
    }
}

/// Serializable snapshot of the engine's state, used for history persistence.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EloData {
    pub comparisons: Vec<ComparisonRecord>,
    pub skip_counts: HashMap<String, u32>,
    pub k: i32,
}

/// Rating math plus comparison and skip bookkeeping.
///
/// The engine owns the comparison history and skip counters but never the
/// ratings themselves: `update_ratings` is a pure function of the two current
/// ratings, the outcome, and the historical comparison counts. The caller
/// stores the returned ratings in its own map.
///
/// Lookups on unknown song ids return safe defaults (zero counts, the 1500
/// baseline) so a partially loaded catalog never panics the engine.
#[derive(Debug, Clone)]
pub struct RatingEngine {
    base_k: i32,
    comparisons: Vec<ComparisonRecord>,
    skip_counts: HashMap<String, u32>,
}

/// Canonical key for an unordered song pair.
fn pair_key(song_id_a: &str, song_id_b: &str) -> String {
    if song_id_a <= song_id_b {
        format!("{}-{}", song_id_a, song_id_b)
    } else {
        format!("{}-{}", song_id_b, song_id_a)
    }
}

impl Default for RatingEngine {
    fn default() -> Self {
        Self::new(K_MEDIUM)
    }
}

impl RatingEngine {
    pub fn new(base_k: i32) -> Self {
        RatingEngine {
            base_k,
            comparisons: Vec::new(),
            skip_counts: HashMap::new(),
        }
    }

    /// Standard logistic win expectation for A against B.
    /// Symmetric: `expected_score(a, b) + expected_score(b, a) == 1`.
    pub fn expected_score(&self, rating_a: i32, rating_b: i32) -> f64 {
        1.0 / (1.0 + 10f64.powf((rating_b - rating_a) as f64 / 400.0))
    }

    /// K-factor scaled by how tested a song is: new songs move fast toward
    /// their true strength, well-tested songs stabilize.
    pub fn dynamic_k(&self, song_id: &str) -> i32 {
        let count = self.comparison_count(song_id);
        if count < K_NEW_THRESHOLD {
            K_NEW
        } else if count < K_TESTED_THRESHOLD {
            K_MEDIUM
        } else {
            K_STABLE
        }
    }

    /// Computes both sides' new ratings for an outcome where `score_a` is 1.0
    /// if A won and 0.0 if B won. Each side uses its own dynamic K, evaluated
    /// against the comparison count *before* this comparison is recorded, so
    /// callers must apply the update before calling [`record_comparison`].
    ///
    /// Does not record anything; the engine stays a pure function over the
    /// caller-owned rating store.
    ///
    /// [`record_comparison`]: RatingEngine::record_comparison
    pub fn update_ratings(
        &self,
        rating_a: i32,
        rating_b: i32,
        score_a: f64,
        song_id_a: &str,
        song_id_b: &str,
    ) -> (i32, i32) {
        let expected_a = self.expected_score(rating_a, rating_b);
        let expected_b = self.expected_score(rating_b, rating_a);

        let k_a = self.dynamic_k(song_id_a);
        let k_b = self.dynamic_k(song_id_b);

        let new_rating_a = rating_a as f64 + k_a as f64 * (score_a - expected_a);
        let new_rating_b = rating_b as f64 + k_b as f64 * ((1.0 - score_a) - expected_b);

        (new_rating_a.round() as i32, new_rating_b.round() as i32)
    }

    /// Appends a comparison record with the current time.
    pub fn record_comparison(&mut self, song_id_a: &str, song_id_b: &str, winner_id: &str) {
        self.record_comparison_at(song_id_a, song_id_b, winner_id, Utc::now());
    }

    pub fn record_comparison_at(
        &mut self,
        song_id_a: &str,
        song_id_b: &str,
        winner_id: &str,
        timestamp: DateTime<Utc>,
    ) {
        if winner_id != song_id_a && winner_id != song_id_b {
            log::warn!(
                "Recording comparison with winner '{}' outside pair ({}, {})",
                winner_id,
                song_id_a,
                song_id_b
            );
        }
        self.comparisons.push(ComparisonRecord {
            song_id_a: song_id_a.to_owned(),
            song_id_b: song_id_b.to_owned(),
            winner_id: winner_id.to_owned(),
            timestamp,
        });
    }

    /// Increments the skip counter for the unordered pair.
    pub fn record_skip(&mut self, song_id_a: &str, song_id_b: &str) {
        *self
            .skip_counts
            .entry(pair_key(song_id_a, song_id_b))
            .or_insert(0) += 1;
    }

    /// True if any record matches the pair, in either order.
    pub fn has_been_compared(&self, song_id_a: &str, song_id_b: &str) -> bool {
        self.comparisons
            .iter()
            .any(|c| c.matches_pair(song_id_a, song_id_b))
    }

    pub fn comparison_count(&self, song_id: &str) -> usize {
        self.comparisons.iter().filter(|c| c.involves(song_id)).count()
    }

    pub fn completed_comparisons(&self) -> usize {
        self.comparisons.len()
    }

    /// Fraction of this song's comparisons it has won; 0 with no history.
    pub fn win_rate(&self, song_id: &str) -> f64 {
        let relevant: Vec<_> = self
            .comparisons
            .iter()
            .filter(|c| c.involves(song_id))
            .collect();
        if relevant.is_empty() {
            return 0.0;
        }
        let wins = relevant.iter().filter(|c| c.winner_id == song_id).count();
        wins as f64 / relevant.len() as f64
    }

    /// The last `limit` records involving a song, oldest first.
    pub fn recent_comparisons(&self, song_id: &str, limit: usize) -> Vec<&ComparisonRecord> {
        let relevant: Vec<_> = self
            .comparisons
            .iter()
            .filter(|c| c.involves(song_id))
            .collect();
        let start = relevant.len().saturating_sub(limit);
        relevant[start..].to_vec()
    }

    pub fn skip_count(&self, song_id_a: &str, song_id_b: &str) -> u32 {
        self.skip_counts
            .get(&pair_key(song_id_a, song_id_b))
            .copied()
            .unwrap_or(0)
    }

    /// True once a pair has been skipped enough times that offering it again
    /// would just annoy the user.
    pub fn should_skip_pairing(&self, song_id_a: &str, song_id_b: &str) -> bool {
        self.skip_count(song_id_a, song_id_b) >= MAX_PAIR_SKIPS
    }

    /// Heuristic [0,1] estimate of how settled a song's rating is. Not a
    /// statistical confidence interval.
    ///
    /// Weighting: up to 60% from comparison volume (saturating at 10), up to
    /// 30% from win-rate extremity once a song has 5+ comparisons (a song
    /// winning or losing nearly everything is clearly placed), and up to 10%
    /// from recency, decaying over the last 50 recorded comparisons.
    pub fn rating_confidence(&self, song_id: &str) -> f64 {
        let comparison_count = self.comparison_count(song_id);
        let win_rate = self.win_rate(song_id);

        let mut confidence = (comparison_count as f64 / 10.0).min(1.0) * 0.6;

        if comparison_count >= 5 {
            let win_rate_extremity = (win_rate - 0.5).abs() * 2.0;
            confidence += win_rate_extremity * 0.3;
        }

        if let Some(pos) = self.comparisons.iter().rposition(|c| c.involves(song_id)) {
            let age_in_comparisons = self.comparisons.len() - pos;
            let recency_score = (1.0 - age_in_comparisons as f64 / 50.0).max(0.0);
            confidence += recency_score * 0.1;
        }

        confidence.min(1.0)
    }

    /// Mean rating of every historical opponent, to distinguish an "easy
    /// schedule" from a rating proven against strong opposition. Defaults to
    /// the 1500 baseline with no history.
    pub fn average_opponent_rating(
        &self,
        song_id: &str,
        ratings: &HashMap<String, i32>,
    ) -> f64 {
        let mut total = 0i64;
        let mut count = 0u32;

        for comparison in self.comparisons.iter().filter(|c| c.involves(song_id)) {
            let opponent_id = if comparison.song_id_a == song_id {
                &comparison.song_id_b
            } else {
                &comparison.song_id_a
            };
            let opponent_rating = ratings
                .get(opponent_id)
                .copied()
                .unwrap_or(BASELINE_RATING);
            total += opponent_rating as i64;
            count += 1;
        }

        if count == 0 {
            BASELINE_RATING as f64
        } else {
            total as f64 / count as f64
        }
    }

    /// Removes every record of the pair (in either order) plus its skip
    /// counter. Supports undo; the caller restores the ratings separately
    /// from its own snapshot.
    pub fn remove_comparison(&mut self, song_id_a: &str, song_id_b: &str) {
        self.comparisons
            .retain(|c| !c.matches_pair(song_id_a, song_id_b));
        self.skip_counts.remove(&pair_key(song_id_a, song_id_b));
    }

    pub fn export_data(&self) -> EloData {
        EloData {
            comparisons: self.comparisons.clone(),
            skip_counts: self.skip_counts.clone(),
            k: self.base_k,
        }
    }

    pub fn import_data(&mut self, data: EloData) {
        self.comparisons = data.comparisons;
        self.skip_counts = data.skip_counts;
        self.base_k = if data.k > 0 { data.k } else { K_MEDIUM };
    }

    pub fn reset(&mut self) {
        self.comparisons.clear();
        self.skip_counts.clear();
    }
}
