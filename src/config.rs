// src/config.rs

/// Baseline rating assigned to songs with no catalog-provided initial rating.
pub const BASELINE_RATING: i32 = 1500;

/// K-factor for songs with fewer than `K_NEW_THRESHOLD` comparisons.
pub const K_NEW: i32 = 48;
/// K-factor for songs with fewer than `K_TESTED_THRESHOLD` comparisons.
pub const K_MEDIUM: i32 = 32;
/// K-factor for well-tested songs.
pub const K_STABLE: i32 = 16;
/// Below this comparison count a song is considered new (high volatility).
pub const K_NEW_THRESHOLD: usize = 3;
/// Below this comparison count a song is considered only lightly tested.
pub const K_TESTED_THRESHOLD: usize = 7;

/// A pair offered and skipped this many times is never offered again.
pub const MAX_PAIR_SKIPS: u32 = 3;

/// The filename for storing the comparison history of a session.
pub const HISTORY_FILE_NAME: &str = "history.json";
/// The application name, used for creating the application-specific data directory.
pub const APP_NAME: &str = "song_ranker";

/// Tuning knobs for the pairing strategy.
///
/// These values are product-tuning constants carried over verbatim; they were
/// arrived at by iteration, not derivation, so they are kept overridable
/// rather than recomputed.
#[derive(Debug, Clone)]
pub struct PairingConfig {
    /// Completed-comparison thresholds ending phases 1 through 4.
    /// Phase 5 ("finals") runs from the last threshold onward.
    pub phase_thresholds: [usize; 4],
    /// Probability of carrying the previous winner into the next pair.
    pub carry_over_probability: f64,
    /// Carry-over is force-disabled once a song has won this many in a row.
    pub max_consecutive_wins: u32,
    /// Carry-over is force-disabled after this many comparisons without a break.
    pub comparisons_per_break: u32,
    /// Bounded retry count for weighted fresh-pair sampling.
    pub pair_attempts: usize,
    /// Bounded retry count for uniform within-pool sampling.
    pub pool_pair_attempts: usize,
    /// Album-diversity injection only runs below this comparison count.
    pub diversity_window: usize,
    /// Diversity probabilities for comparisons 0-9, 10-19, and 20+.
    pub diversity_chances: [f64; 3],
    /// Classic-album pairing probability per phase 1 through 4.
    pub classic_chances: [f64; 4],
    /// Probability that a classic pairing draws both songs from the classic pool.
    pub classic_pool_chance: f64,
    /// Stream floor for a classic-album song to enter the classic pool.
    pub classic_stream_floor: u64,
    /// Maximum size of the classic pool.
    pub classic_pool_cap: usize,
    /// Stream floor for a song to count as a mainstream album representative.
    pub album_top_stream_floor: u64,
    /// Selection weight multiplier for songs from deprioritized albums.
    pub deprioritized_weight: f64,
    /// Probability of excluding deprioritized albums from classic opponents.
    pub deprioritized_exclusion_chance: f64,
    /// Cross-tier challenges begin at this completed-comparison count...
    pub cross_tier_start: usize,
    /// ...and recur at this interval.
    pub cross_tier_interval: usize,
    /// Probability that a cross-tier challenger comes from ranks 11-30
    /// rather than ranks 31-60.
    pub next_tier_chance: f64,
    /// Lower-tier challengers should have at least this much rating confidence.
    pub challenger_confidence_floor: f64,
    /// Finals strategy split: below the first value, top-10 vs top-10; below
    /// the second, top-10 vs ranks 11-20; otherwise a wildcard challenge.
    pub finals_strategy_split: [f64; 2],
}

impl Default for PairingConfig {
    fn default() -> Self {
        PairingConfig {
            phase_thresholds: [15, 30, 50, 80],
            carry_over_probability: 0.75,
            max_consecutive_wins: 3,
            comparisons_per_break: 7,
            pair_attempts: 100,
            pool_pair_attempts: 50,
            diversity_window: 40,
            diversity_chances: [0.1, 0.3, 0.5],
            classic_chances: [0.4, 0.5, 0.5, 0.45],
            classic_pool_chance: 0.7,
            classic_stream_floor: 10_000_000,
            classic_pool_cap: 80,
            album_top_stream_floor: 150_000_000,
            deprioritized_weight: 0.2,
            deprioritized_exclusion_chance: 0.8,
            cross_tier_start: 20,
            cross_tier_interval: 10,
            next_tier_chance: 0.6,
            challenger_confidence_floor: 0.7,
            finals_strategy_split: [0.7, 0.9],
        }
    }
}
