// src/pairing.rs

use rand::prelude::*;
use std::collections::{HashMap, HashSet};

use crate::catalog::Catalog;
use crate::config::{PairingConfig, BASELINE_RATING};
use crate::elo::RatingEngine;

/// Session phase, determined purely by the completed-comparison count.
/// Early phases restrict candidates to the most popular songs so the first
/// screens feel familiar; later phases open the long tail, and finals mode
/// shifts to refining the top of the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Top20,
    Top50,
    Top100,
    AllSongs,
    Finals,
}

impl Phase {
    pub fn number(self) -> u8 {
        match self {
            Phase::Top20 => 1,
            Phase::Top50 => 2,
            Phase::Top100 => 3,
            Phase::AllSongs => 4,
            Phase::Finals => 5,
        }
    }
}

/// Popularity tiers, computed once per session from static stream counts and
/// immutable thereafter.
#[derive(Debug, Clone)]
pub struct Tiers {
    top20: Vec<String>,
    top50: Vec<String>,
    top100: Vec<String>,
    all: Vec<String>,
    /// Songs from albums flagged classic, above the classic stream floor.
    classic_pool: Vec<String>,
    /// Per album: its strongest representatives, most-streamed first.
    album_top_songs: HashMap<String, Vec<String>>,
}

impl Tiers {
    pub fn build(catalog: &Catalog, config: &PairingConfig) -> Self {
        let mut by_streams: Vec<_> = catalog.songs.iter().collect();
        by_streams.sort_by(|a, b| b.streams.cmp(&a.streams));

        let ids = |n: usize| -> Vec<String> {
            by_streams.iter().take(n).map(|s| s.id.clone()).collect()
        };
        let top20 = ids(20);
        let top50 = ids(50);
        let top100 = ids(100);
        let all: Vec<String> = catalog.songs.iter().map(|s| s.id.clone()).collect();

        let classic_pool: Vec<String> = by_streams
            .iter()
            .filter(|s| {
                catalog
                    .album(&s.album_id)
                    .map(|a| a.classic)
                    .unwrap_or(false)
                    && s.streams > config.classic_stream_floor
            })
            .take(config.classic_pool_cap)
            .map(|s| s.id.clone())
            .collect();

        let mut album_top_songs = HashMap::new();
        let mut seen_albums = HashSet::new();
        for song in &catalog.songs {
            if !seen_albums.insert(song.album_id.clone()) {
                continue;
            }
            let mainstream: Vec<&str> = by_streams
                .iter()
                .filter(|s| {
                    s.album_id == song.album_id && s.streams > config.album_top_stream_floor
                })
                .take(3)
                .map(|s| s.id.as_str())
                .collect();
            let representatives: Vec<String> = if mainstream.len() >= 2 {
                mainstream.iter().take(2).map(|s| (*s).to_owned()).collect()
            } else {
                by_streams
                    .iter()
                    .filter(|s| s.album_id == song.album_id)
                    .take(2)
                    .map(|s| s.id.clone())
                    .collect()
            };
            if !representatives.is_empty() {
                album_top_songs.insert(song.album_id.clone(), representatives);
            }
        }

        log::info!(
            "Song tiers: top20 {}, top50 {}, top100 {}, all {}, classic pool {}",
            top20.len(),
            top50.len(),
            top100.len(),
            all.len(),
            classic_pool.len()
        );

        Tiers {
            top20,
            top50,
            top100,
            all,
            classic_pool,
            album_top_songs,
        }
    }

    pub fn pool(&self, phase: Phase) -> &[String] {
        match phase {
            Phase::Top20 => &self.top20,
            Phase::Top50 => &self.top50,
            Phase::Top100 => &self.top100,
            Phase::AllSongs | Phase::Finals => &self.all,
        }
    }
}

/// A song with its current standing, used by the rating-aware strategies.
struct RankedSong {
    id: String,
    rating: i32,
    confidence: f64,
    avg_opponent_rating: f64,
}

/// Retries a sampling closure a bounded number of times, then gives up.
/// Rejection sampling must never loop forever on an exhausted pool.
fn sample_until<T>(max_attempts: usize, mut sample: impl FnMut() -> Option<T>) -> Option<T> {
    for _ in 0..max_attempts {
        if let Some(value) = sample() {
            return Some(value);
        }
    }
    None
}

/// Uniform two-distinct-songs draw from a pool, rejecting already-compared
/// and skip-capped pairs.
fn select_pair_from_pool<R: Rng>(
    pool: &[String],
    engine: &RatingEngine,
    max_attempts: usize,
    rng: &mut R,
) -> Option<(String, String)> {
    if pool.len() < 2 {
        return None;
    }
    sample_until(max_attempts, || {
        let idx1 = rng.random_range(0..pool.len());
        let mut idx2 = rng.random_range(0..pool.len());
        while idx2 == idx1 {
            idx2 = rng.random_range(0..pool.len());
        }
        let (id1, id2) = (&pool[idx1], &pool[idx2]);
        if !engine.has_been_compared(id1, id2) && !engine.should_skip_pairing(id1, id2) {
            Some((id1.clone(), id2.clone()))
        } else {
            None
        }
    })
}

/// Weighted fresh-pair draw: songs from deprioritized albums get a fraction
/// of the normal selection weight.
fn select_weighted_pair<R: Rng>(
    pool: &[String],
    catalog: &Catalog,
    engine: &RatingEngine,
    config: &PairingConfig,
    rng: &mut R,
) -> Option<(String, String)> {
    if pool.len() < 2 {
        return None;
    }

    let weighted: Vec<(&String, f64)> = pool
        .iter()
        .map(|id| {
            let weight = if catalog.is_deprioritized(id) {
                config.deprioritized_weight
            } else {
                1.0
            };
            (id, weight)
        })
        .collect();

    sample_until(config.pair_attempts, || {
        let (id_a, _) = weighted.choose_weighted(rng, |(_, w)| *w).ok()?;
        let (id_b, _) = weighted.choose_weighted(rng, |(_, w)| *w).ok()?;
        if id_a != id_b
            && !engine.has_been_compared(id_a, id_b)
            && !engine.should_skip_pairing(id_a, id_b)
        {
            Some(((*id_a).clone(), (*id_b).clone()))
        } else {
            None
        }
    })
}

/// Chooses the next pair to present, given the engine's state.
///
/// Per-turn strategy priority: album diversity injection, finals refinement,
/// cross-tier challenge, classic-album pairing, winner carry-over, weighted
/// fresh pair, and finally an all-songs fallback. The first rule that
/// produces a valid pair wins; if nothing does, the session is exhausted.
#[derive(Debug)]
pub struct PairingSelector {
    config: PairingConfig,
    tiers: Tiers,
    shown_albums: HashSet<String>,
    last_winner: Option<String>,
    consecutive_wins: u32,
    comparisons_since_break: u32,
}

impl PairingSelector {
    pub fn new(catalog: &Catalog, config: PairingConfig) -> Self {
        let tiers = Tiers::build(catalog, &config);
        PairingSelector {
            config,
            tiers,
            shown_albums: HashSet::new(),
            last_winner: None,
            consecutive_wins: 0,
            comparisons_since_break: 0,
        }
    }

    pub fn current_phase(&self, completed_comparisons: usize) -> Phase {
        let t = &self.config.phase_thresholds;
        if completed_comparisons < t[0] {
            Phase::Top20
        } else if completed_comparisons < t[1] {
            Phase::Top50
        } else if completed_comparisons < t[2] {
            Phase::Top100
        } else if completed_comparisons < t[3] {
            Phase::AllSongs
        } else {
            Phase::Finals
        }
    }

    /// Records the outcome of the comparison just decided, for carry-over.
    pub fn note_winner(&mut self, winner_id: &str) {
        if self.last_winner.as_deref() == Some(winner_id) {
            self.consecutive_wins += 1;
        } else {
            self.consecutive_wins = 1;
        }
        self.last_winner = Some(winner_id.to_owned());
    }

    /// A skip breaks the carry-over chain.
    pub fn note_skip(&mut self) {
        self.last_winner = None;
        self.consecutive_wins = 0;
    }

    pub fn reset(&mut self) {
        self.shown_albums.clear();
        self.last_winner = None;
        self.consecutive_wins = 0;
        self.comparisons_since_break = 0;
    }

    pub fn next_pair<R: Rng>(
        &mut self,
        catalog: &Catalog,
        engine: &RatingEngine,
        ratings: &HashMap<String, i32>,
        rng: &mut R,
    ) -> Option<(String, String)> {
        let completed = engine.completed_comparisons();
        let phase = self.current_phase(completed);
        log::debug!(
            "Selecting pair for phase {} at comparison #{}",
            phase.number(),
            completed + 1
        );

        if completed < self.config.diversity_window {
            if let Some(pair) = self.diversity_pairing(completed, catalog, engine, rng) {
                self.comparisons_since_break += 1;
                return Some(pair);
            }
        }

        if phase == Phase::Finals {
            if let Some(pair) = self.finals_pairing(catalog, engine, ratings, rng) {
                self.comparisons_since_break += 1;
                return Some(pair);
            }
        }

        if phase != Phase::Finals && self.is_cross_tier_turn(completed) {
            if let Some(pair) = self.cross_tier_challenge(catalog, engine, ratings, rng) {
                log::debug!("Generated cross-tier challenge pairing");
                self.comparisons_since_break += 1;
                return Some(pair);
            }
        }

        if phase != Phase::Finals {
            let classic_chance = self.config.classic_chances[(phase.number() - 1) as usize];
            if rng.random::<f64>() < classic_chance {
                if let Some(pair) = self.classic_pairing(phase, catalog, engine, rng) {
                    log::debug!("Generated classic album pairing");
                    self.comparisons_since_break += 1;
                    return Some(pair);
                }
            }
        }

        if let Some(winner_id) = self.last_winner.clone() {
            if self.should_carry_over(rng) {
                let pool = self.tiers.pool(phase);
                if let Some(opponent_id) =
                    select_opponent_for_winner(&winner_id, pool, engine, ratings, rng)
                {
                    log::debug!("Carrying over winner to next comparison");
                    self.comparisons_since_break += 1;
                    return Some((winner_id, opponent_id));
                }
            }
        }

        // Fresh pair: also acts as the fatigue break.
        self.consecutive_wins = 0;
        self.comparisons_since_break = 0;

        let pair = select_weighted_pair(
            self.tiers.pool(phase),
            catalog,
            engine,
            &self.config,
            rng,
        );
        if let Some(pair) = pair {
            self.comparisons_since_break += 1;
            return Some(pair);
        }

        log::warn!(
            "No valid pairs in phase {} pool, widening to all songs",
            phase.number()
        );
        let fallback = select_weighted_pair(
            self.tiers.pool(Phase::AllSongs),
            catalog,
            engine,
            &self.config,
            rng,
        );
        if let Some(pair) = fallback {
            self.comparisons_since_break += 1;
            return Some(pair);
        }

        log::warn!("No more valid pairings possible");
        None
    }

    /// Carry-over is force-disabled by fatigue: a song on a long win streak
    /// or too many comparisons since the last fresh break.
    fn should_carry_over<R: Rng>(&self, rng: &mut R) -> bool {
        if self.consecutive_wins >= self.config.max_consecutive_wins {
            log::debug!("Forcing new pair: same song won {} in a row", self.consecutive_wins);
            return false;
        }
        if self.comparisons_since_break >= self.config.comparisons_per_break {
            log::debug!(
                "Forcing new pair: {} comparisons since last break",
                self.comparisons_since_break
            );
            return false;
        }
        rng.random::<f64>() < self.config.carry_over_probability
    }

    /// Early-session album diversity: occasionally surface an album the user
    /// has not seen yet, represented by its most popular song, against a
    /// well-known opponent.
    fn diversity_pairing<R: Rng>(
        &mut self,
        completed: usize,
        catalog: &Catalog,
        engine: &RatingEngine,
        rng: &mut R,
    ) -> Option<(String, String)> {
        let unshown: Vec<&String> = self
            .tiers
            .album_top_songs
            .keys()
            .filter(|album_id| !self.shown_albums.contains(*album_id))
            .collect();
        if unshown.is_empty() {
            return None;
        }

        let chance = if completed < 10 {
            self.config.diversity_chances[0]
        } else if completed < 20 {
            self.config.diversity_chances[1]
        } else {
            self.config.diversity_chances[2]
        };
        if rng.random::<f64>() >= chance {
            return None;
        }

        let album_id = (*unshown.choose(rng)?).clone();
        let song_id = self.tiers.album_top_songs.get(&album_id)?.first()?.clone();

        let candidates: Vec<&String> = self
            .tiers
            .pool(Phase::Top50)
            .iter()
            .filter(|id| {
                *id != &song_id
                    && !engine.has_been_compared(&song_id, id)
                    && !engine.should_skip_pairing(&song_id, id)
            })
            .collect();
        if candidates.is_empty() {
            return None;
        }

        let cap = candidates.len().min(20);
        let opponent_id = candidates[rng.random_range(0..cap)].clone();

        self.shown_albums.insert(album_id.clone());
        if let Some(opponent) = catalog.song(&opponent_id) {
            self.shown_albums.insert(opponent.album_id.clone());
        }
        log::debug!(
            "Album diversity pairing: surfacing '{}'",
            catalog.album_name(&album_id)
        );
        Some((song_id, opponent_id))
    }

    fn is_cross_tier_turn(&self, completed: usize) -> bool {
        completed >= self.config.cross_tier_start
            && completed % self.config.cross_tier_interval == 0
    }

    fn ranked_songs(
        &self,
        catalog: &Catalog,
        engine: &RatingEngine,
        ratings: &HashMap<String, i32>,
    ) -> Vec<RankedSong> {
        let mut ranked: Vec<RankedSong> = catalog
            .songs
            .iter()
            .map(|song| RankedSong {
                id: song.id.clone(),
                rating: ratings.get(&song.id).copied().unwrap_or(BASELINE_RATING),
                confidence: engine.rating_confidence(&song.id),
                avg_opponent_rating: engine.average_opponent_rating(&song.id, ratings),
            })
            .collect();
        ranked.sort_by(|a, b| b.rating.cmp(&a.rating));
        ranked
    }

    /// Tests a top-10 song with a shaky rating against a climber from below.
    ///
    /// The top-10 candidate is chosen by priority: low confidence, or a
    /// rating built against a weak average schedule. The challenger comes
    /// from ranks 11-30 most of the time, otherwise from ranks 31-60 with a
    /// preference for songs whose own ratings are already well settled.
    fn cross_tier_challenge<R: Rng>(
        &self,
        catalog: &Catalog,
        engine: &RatingEngine,
        ratings: &HashMap<String, i32>,
        rng: &mut R,
    ) -> Option<(String, String)> {
        let ranked = self.ranked_songs(catalog, engine, ratings);
        let top10 = &ranked[..ranked.len().min(10)];
        let next_tier = &ranked[ranked.len().min(10)..ranked.len().min(30)];
        let lower_tier = &ranked[ranked.len().min(30)..ranked.len().min(60)];

        let mut prioritized: Vec<(&RankedSong, f64)> = top10
            .iter()
            .map(|song| {
                let priority = (1.0 - song.confidence)
                    + (BASELINE_RATING as f64 - song.avg_opponent_rating) / 500.0;
                (song, priority)
            })
            .collect();
        prioritized.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        prioritized.truncate(3);
        if prioritized.is_empty() {
            return None;
        }
        let top_song = prioritized[rng.random_range(0..prioritized.len())].0;

        let mut challenger: Option<&RankedSong> = None;
        if rng.random::<f64>() < self.config.next_tier_chance && !next_tier.is_empty() {
            let challengers: Vec<&RankedSong> = next_tier
                .iter()
                .filter(|song| {
                    !engine.has_been_compared(&top_song.id, &song.id)
                        && !engine.should_skip_pairing(&top_song.id, &song.id)
                })
                .take(10)
                .collect();
            if !challengers.is_empty() {
                let cap = challengers.len().min(5);
                challenger = Some(challengers[rng.random_range(0..cap)]);
            }
        }

        if challenger.is_none() && !lower_tier.is_empty() {
            let strong: Vec<&RankedSong> = lower_tier
                .iter()
                .filter(|song| {
                    !engine.has_been_compared(&top_song.id, &song.id)
                        && !engine.should_skip_pairing(&top_song.id, &song.id)
                        && song.confidence > self.config.challenger_confidence_floor
                })
                .take(5)
                .collect();
            if !strong.is_empty() {
                challenger = Some(strong[rng.random_range(0..strong.len())]);
            } else {
                let any: Vec<&RankedSong> = lower_tier
                    .iter()
                    .filter(|song| {
                        !engine.has_been_compared(&top_song.id, &song.id)
                            && !engine.should_skip_pairing(&top_song.id, &song.id)
                    })
                    .collect();
                if !any.is_empty() {
                    let cap = any.len().min(10);
                    challenger = Some(any[rng.random_range(0..cap)]);
                }
            }
        }

        challenger.map(|c| {
            log::debug!(
                "Cross-tier challenge: '{}' (conf {:.2}) vs '{}' (conf {:.2})",
                top_song.id,
                top_song.confidence,
                c.id,
                c.confidence
            );
            (top_song.id.clone(), c.id.clone())
        })
    }

    /// Late-session refinement of the top of the board: mostly top-10 vs
    /// top-10, sometimes top-10 vs ranks 11-20, with a rare wildcard shot
    /// from ranks 21-40. Each sub-case falls through when no valid pair
    /// remains.
    fn finals_pairing<R: Rng>(
        &self,
        catalog: &Catalog,
        engine: &RatingEngine,
        ratings: &HashMap<String, i32>,
        rng: &mut R,
    ) -> Option<(String, String)> {
        let ranked = self.ranked_songs(catalog, engine, ratings);
        let top20: Vec<&RankedSong> = ranked.iter().take(20).collect();

        let strategy = rng.random::<f64>();
        let mut pair: Option<(String, String)> = None;

        if strategy < self.config.finals_strategy_split[0] {
            let top10_ids: Vec<String> =
                top20.iter().take(10).map(|s| s.id.clone()).collect();
            pair = select_pair_from_pool(
                &top10_ids,
                engine,
                self.config.pool_pair_attempts,
                rng,
            );
            if pair.is_some() {
                log::debug!("Finals: top 10 vs top 10 matchup");
            }
        }

        if pair.is_none() && strategy < self.config.finals_strategy_split[1] {
            let top10: Vec<&RankedSong> = top20.iter().copied().take(10).collect();
            let next10: Vec<&RankedSong> = top20.iter().copied().skip(10).collect();
            if !top10.is_empty() && !next10.is_empty() {
                let song1 = top10[rng.random_range(0..top10.len())];
                let candidates: Vec<&RankedSong> = next10
                    .iter()
                    .copied()
                    .filter(|s| {
                        !engine.has_been_compared(&song1.id, &s.id)
                            && !engine.should_skip_pairing(&song1.id, &s.id)
                    })
                    .collect();
                if !candidates.is_empty() {
                    let song2 = candidates[rng.random_range(0..candidates.len())];
                    pair = Some((song1.id.clone(), song2.id.clone()));
                    log::debug!("Finals: top 10 vs 11-20 validation");
                }
            }
        }

        if pair.is_none() {
            let wildcards = &ranked[ranked.len().min(20)..ranked.len().min(40)];
            if !wildcards.is_empty() && !top20.is_empty() {
                let wildcard = &wildcards[rng.random_range(0..wildcards.len())];
                let candidates: Vec<&RankedSong> = top20
                    .iter()
                    .copied()
                    .filter(|s| {
                        !engine.has_been_compared(&wildcard.id, &s.id)
                            && !engine.should_skip_pairing(&wildcard.id, &s.id)
                    })
                    .collect();
                if !candidates.is_empty() {
                    let opponent = candidates[rng.random_range(0..candidates.len())];
                    pair = Some((wildcard.id.clone(), opponent.id.clone()));
                    log::debug!("Finals: wildcard challenge");
                }
            }
        }

        pair
    }

    /// Pairs involving the pre-computed classic pool, to keep mainstream
    /// favorites in rotation throughout the session.
    fn classic_pairing<R: Rng>(
        &self,
        phase: Phase,
        catalog: &Catalog,
        engine: &RatingEngine,
        rng: &mut R,
    ) -> Option<(String, String)> {
        let classic = &self.tiers.classic_pool;
        if classic.len() < 2 {
            return None;
        }

        if rng.random::<f64>() < self.config.classic_pool_chance {
            if let Some(pair) =
                select_pair_from_pool(classic, engine, self.config.pool_pair_attempts, rng)
            {
                log::debug!("Classic matchup: '{}' vs '{}'", pair.0, pair.1);
                return Some(pair);
            }
        }

        let classic_song_id = classic[rng.random_range(0..classic.len())].clone();
        let mut candidates: Vec<&String> = self
            .tiers
            .pool(phase)
            .iter()
            .filter(|id| {
                *id != &classic_song_id
                    && !engine.has_been_compared(&classic_song_id, id)
                    && !engine.should_skip_pairing(&classic_song_id, id)
            })
            .collect();

        if rng.random::<f64>() < self.config.deprioritized_exclusion_chance {
            let filtered: Vec<&String> = candidates
                .iter()
                .filter(|id| !catalog.is_deprioritized(id))
                .copied()
                .collect();
            if !filtered.is_empty() {
                candidates = filtered;
            }
        }

        if candidates.is_empty() {
            return None;
        }
        let opponent_id = candidates[rng.random_range(0..candidates.len())].clone();
        Some((classic_song_id, opponent_id))
    }

    #[cfg(test)]
    fn set_fatigue_state(&mut self, last_winner: Option<&str>, consecutive_wins: u32) {
        self.last_winner = last_winner.map(str::to_owned);
        self.consecutive_wins = consecutive_wins;
    }
}

/// Finds an opponent for the carried-over winner: an unseen, non-skip-capped
/// song with a close rating and little testing so far, randomized among the
/// five best candidates.
fn select_opponent_for_winner<R: Rng>(
    winner_id: &str,
    candidate_pool: &[String],
    engine: &RatingEngine,
    ratings: &HashMap<String, i32>,
    rng: &mut R,
) -> Option<String> {
    let winner_rating = ratings.get(winner_id).copied().unwrap_or(BASELINE_RATING);

    let mut scored: Vec<(&String, i64)> = candidate_pool
        .iter()
        .filter(|id| {
            id.as_str() != winner_id
                && !engine.has_been_compared(winner_id, id)
                && !engine.should_skip_pairing(winner_id, id)
        })
        .map(|id| {
            let rating = ratings.get(id).copied().unwrap_or(BASELINE_RATING);
            let rating_diff = (winner_rating - rating).abs() as i64;
            let comparison_count = engine.comparison_count(id) as i64;
            (id, 1000 - rating_diff - comparison_count * 20)
        })
        .collect();

    if scored.is_empty() {
        log::debug!("No valid opponents for winner, selecting a new pair");
        return None;
    }

    scored.sort_by(|a, b| b.1.cmp(&a.1));
    scored.truncate(5);
    let (id, _) = scored[rng.random_range(0..scored.len())];
    Some(id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Album, Song};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// Catalog of `n` songs spread over 4 albums, streams strictly
    /// decreasing so the popularity order equals the song index order.
    fn make_catalog(n: usize) -> Catalog {
        let albums = vec![
            Album { id: "a0".into(), name: "Album 0".into(), classic: true, deprioritized: false },
            Album { id: "a1".into(), name: "Album 1".into(), classic: false, deprioritized: false },
            Album { id: "a2".into(), name: "Album 2".into(), classic: false, deprioritized: true },
            Album { id: "a3".into(), name: "Album 3".into(), classic: false, deprioritized: false },
        ];
        let songs = (0..n)
            .map(|i| Song {
                id: format!("s{}", i),
                title: format!("Song {}", i),
                album_id: format!("a{}", i % 4),
                streams: 1_000_000_000 - i as u64 * 1_000_000,
                initial_rating: 1500,
            })
            .collect();
        Catalog::new(songs, albums)
    }

    /// Config with every probabilistic override disabled, so next_pair always
    /// falls through to the fresh-pair rule and pool membership is decided by
    /// phase alone.
    fn plain_config() -> PairingConfig {
        PairingConfig {
            diversity_chances: [0.0, 0.0, 0.0],
            classic_chances: [0.0, 0.0, 0.0, 0.0],
            carry_over_probability: 0.0,
            ..PairingConfig::default()
        }
    }

    fn rng(seed: u64) -> StdRng {
        StdRng::seed_from_u64(seed)
    }

    #[test]
    fn test_tiers_follow_stream_order() {
        let catalog = make_catalog(300);
        let tiers = Tiers::build(&catalog, &PairingConfig::default());
        assert_eq!(tiers.top20.len(), 20);
        assert_eq!(tiers.top50.len(), 50);
        assert_eq!(tiers.top100.len(), 100);
        assert_eq!(tiers.all.len(), 300);
        assert!(tiers.top20.contains(&"s0".to_owned()));
        assert!(tiers.top20.contains(&"s19".to_owned()));
        assert!(!tiers.top20.contains(&"s20".to_owned()));
    }

    #[test]
    fn test_classic_pool_respects_flag_and_floor() {
        let catalog = make_catalog(100);
        let tiers = Tiers::build(&catalog, &PairingConfig::default());
        // Only album a0 is classic; its songs are indices 0, 4, 8, ...
        assert!(!tiers.classic_pool.is_empty());
        for id in &tiers.classic_pool {
            let song = catalog.song(id).unwrap();
            assert_eq!(song.album_id, "a0");
            assert!(song.streams > PairingConfig::default().classic_stream_floor);
        }
    }

    #[test]
    fn test_album_top_songs_prefer_most_streamed() {
        let catalog = make_catalog(40);
        let tiers = Tiers::build(&catalog, &PairingConfig::default());
        // Album a0's most streamed song is s0.
        let reps = tiers.album_top_songs.get("a0").unwrap();
        assert_eq!(reps[0], "s0");
        assert_eq!(reps.len(), 2);
    }

    #[test]
    fn test_diversity_pairing_surfaces_unshown_album() {
        let catalog = make_catalog(60);
        let ratings = catalog.initial_ratings();
        let engine = RatingEngine::default();
        let config = PairingConfig {
            diversity_chances: [1.0, 1.0, 1.0],
            ..plain_config()
        };
        let mut selector = PairingSelector::new(&catalog, config);
        let mut rng = rng(19);

        let top50: HashSet<String> = (0..50).map(|i| format!("s{}", i)).collect();
        let (song, opponent) = selector
            .next_pair(&catalog, &engine, &ratings, &mut rng)
            .expect("pair available");

        // The surfaced song is the most popular representative of its album,
        // the opponent comes from the top-50 pool, and both albums end up
        // marked as shown.
        let album = catalog.song(&song).unwrap().album_id.clone();
        assert_eq!(selector.tiers.album_top_songs[&album][0], song);
        assert!(top50.contains(&opponent));
        assert!(selector.shown_albums.contains(&album));
        let opponent_album = catalog.song(&opponent).unwrap().album_id.clone();
        assert!(selector.shown_albums.contains(&opponent_album));

        // Once every album has been surfaced the rule falls through.
        for id in ["a0", "a1", "a2", "a3"] {
            selector.shown_albums.insert(id.to_owned());
        }
        assert!(selector
            .diversity_pairing(0, &catalog, &engine, &mut rng)
            .is_none());
    }

    #[test]
    fn test_phase_transitions() {
        let catalog = make_catalog(300);
        let selector = PairingSelector::new(&catalog, PairingConfig::default());
        assert_eq!(selector.current_phase(0), Phase::Top20);
        assert_eq!(selector.current_phase(14), Phase::Top20);
        assert_eq!(selector.current_phase(15), Phase::Top50);
        assert_eq!(selector.current_phase(29), Phase::Top50);
        assert_eq!(selector.current_phase(30), Phase::Top100);
        assert_eq!(selector.current_phase(50), Phase::AllSongs);
        assert_eq!(selector.current_phase(80), Phase::Finals);
        assert_eq!(selector.current_phase(500), Phase::Finals);
    }

    #[test]
    fn test_phase_boundary_restricts_pool() {
        let catalog = make_catalog(300);
        let ratings = catalog.initial_ratings();
        let mut engine = RatingEngine::default();
        let mut selector = PairingSelector::new(&catalog, plain_config());
        let mut rng = rng(7);

        // 14 completed comparisons: strictly top-20 candidates. The recorded
        // pairs sit far outside the top tiers so they never constrain the
        // draws under test.
        for i in 0..14 {
            let (a, b) = (format!("s{}", 200 + 2 * i), format!("s{}", 201 + 2 * i));
            engine.record_comparison(&a, &b, &a);
        }
        let top20: HashSet<String> = (0..20).map(|i| format!("s{}", i)).collect();
        let top50: HashSet<String> = (0..50).map(|i| format!("s{}", i)).collect();

        for _ in 0..20 {
            let (a, b) = selector
                .next_pair(&catalog, &engine, &ratings, &mut rng)
                .expect("pool not exhausted");
            assert!(top20.contains(&a), "{} outside top 20 at 14 comparisons", a);
            assert!(top20.contains(&b), "{} outside top 20 at 14 comparisons", b);
            assert_ne!(a, b);
        }

        // One more comparison crosses into phase 2: top-50 allowed.
        engine.record_comparison("s228", "s229", "s228");
        for _ in 0..20 {
            let (a, b) = selector
                .next_pair(&catalog, &engine, &ratings, &mut rng)
                .expect("pool not exhausted");
            assert!(top50.contains(&a), "{} outside top 50 at 15 comparisons", a);
            assert!(top50.contains(&b), "{} outside top 50 at 15 comparisons", b);
        }
    }

    #[test]
    fn test_no_self_pairing() {
        let catalog = make_catalog(30);
        let ratings = catalog.initial_ratings();
        let mut engine = RatingEngine::default();
        let mut selector = PairingSelector::new(&catalog, PairingConfig::default());
        let mut rng = rng(42);

        for _ in 0..60 {
            match selector.next_pair(&catalog, &engine, &ratings, &mut rng) {
                Some((a, b)) => {
                    assert_ne!(a, b);
                    engine.record_comparison(&a, &b, &a);
                    selector.note_winner(&a);
                }
                None => break,
            }
        }
    }

    #[test]
    fn test_exhaustion_with_two_songs() {
        let catalog = make_catalog(2);
        let ratings = catalog.initial_ratings();
        let mut engine = RatingEngine::default();
        let mut selector = PairingSelector::new(&catalog, plain_config());
        let mut rng = rng(3);

        let (a, b) = selector
            .next_pair(&catalog, &engine, &ratings, &mut rng)
            .expect("one pair available");
        engine.record_comparison(&a, &b, &a);

        assert!(selector
            .next_pair(&catalog, &engine, &ratings, &mut rng)
            .is_none());
    }

    #[test]
    fn test_skip_capped_pair_never_offered() {
        let catalog = make_catalog(2);
        let ratings = catalog.initial_ratings();
        let mut engine = RatingEngine::default();
        let mut selector = PairingSelector::new(&catalog, plain_config());
        let mut rng = rng(11);

        engine.record_skip("s0", "s1");
        engine.record_skip("s0", "s1");
        engine.record_skip("s0", "s1");

        assert!(selector
            .next_pair(&catalog, &engine, &ratings, &mut rng)
            .is_none());
    }

    #[test]
    fn test_carry_over_fatigue_after_three_wins() {
        let catalog = make_catalog(30);
        let mut selector = PairingSelector::new(&catalog, PairingConfig::default());
        selector.set_fatigue_state(Some("s0"), 3);

        // With three consecutive wins the probability draw must never matter.
        for seed in 0..50 {
            let mut rng = rng(seed);
            assert!(!selector.should_carry_over(&mut rng));
        }
    }

    #[test]
    fn test_carry_over_break_after_seven_comparisons() {
        let catalog = make_catalog(30);
        let mut selector = PairingSelector::new(&catalog, PairingConfig::default());
        selector.set_fatigue_state(Some("s0"), 1);
        selector.comparisons_since_break = 7;

        for seed in 0..50 {
            let mut rng = rng(seed);
            assert!(!selector.should_carry_over(&mut rng));
        }
    }

    #[test]
    fn test_carry_over_uses_probability_when_fresh() {
        let catalog = make_catalog(30);
        let mut selector = PairingSelector::new(&catalog, PairingConfig::default());
        selector.set_fatigue_state(Some("s0"), 1);

        let mut rng = rng(5);
        let carried = (0..200)
            .filter(|_| selector.should_carry_over(&mut rng))
            .count();
        // 75% probability; allow generous slack for a 200-draw sample.
        assert!(carried > 100, "carried only {} of 200", carried);
        assert!(carried < 200);
    }

    #[test]
    fn test_select_opponent_prefers_close_ratings() {
        let catalog = make_catalog(10);
        let engine = RatingEngine::default();
        let mut ratings = catalog.initial_ratings();
        ratings.insert("s0".into(), 1600);
        ratings.insert("s1".into(), 1590); // closest
        ratings.insert("s2".into(), 1300);
        ratings.insert("s3".into(), 1250);
        ratings.insert("s4".into(), 1200);
        ratings.insert("s5".into(), 1150);
        ratings.insert("s6".into(), 1100);
        ratings.insert("s7".into(), 1050);
        ratings.insert("s8".into(), 1000);
        ratings.insert("s9".into(), 950);

        let pool: Vec<String> = (0..10).map(|i| format!("s{}", i)).collect();
        let mut rng = rng(17);
        let mut seen = HashSet::new();
        for _ in 0..100 {
            let opponent = select_opponent_for_winner("s0", &pool, &engine, &ratings, &mut rng)
                .expect("candidates exist");
            assert_ne!(opponent, "s0");
            seen.insert(opponent);
        }
        // Picks randomize among the 5 best scorers; the far tail never shows.
        assert!(seen.contains("s1"));
        assert!(!seen.contains("s8"));
        assert!(!seen.contains("s9"));
    }

    #[test]
    fn test_sample_until_bounded() {
        let mut attempts = 0;
        let result: Option<()> = sample_until(10, || {
            attempts += 1;
            None
        });
        assert!(result.is_none());
        assert_eq!(attempts, 10);

        let found = sample_until(10, || Some(5));
        assert_eq!(found, Some(5));
    }

    #[test]
    fn test_weighted_pair_dampens_deprioritized_albums() {
        let catalog = make_catalog(40);
        let engine = RatingEngine::default();
        let config = PairingConfig::default();
        let pool: Vec<String> = (0..40).map(|i| format!("s{}", i)).collect();
        let mut rng = rng(23);

        let mut deprioritized_hits = 0usize;
        let mut total = 0usize;
        for _ in 0..400 {
            let (a, b) = select_weighted_pair(&pool, &catalog, &engine, &config, &mut rng)
                .expect("pairs available");
            for id in [&a, &b] {
                total += 1;
                if catalog.is_deprioritized(id) {
                    deprioritized_hits += 1;
                }
            }
        }
        // A quarter of the pool is deprioritized at 20% weight, so its songs
        // should make up roughly 6% of draws; assert well under the 25% an
        // unweighted draw would give.
        let share = deprioritized_hits as f64 / total as f64;
        assert!(share < 0.15, "deprioritized share too high: {}", share);
    }

    #[test]
    fn test_finals_pairs_stay_near_top() {
        let catalog = make_catalog(100);
        let mut ratings = catalog.initial_ratings();
        // Spread ratings so ranks are unambiguous: s0 highest.
        for i in 0..100 {
            ratings.insert(format!("s{}", i), 2000 - (i as i32) * 5);
        }
        let engine = RatingEngine::default();
        let selector = PairingSelector::new(&catalog, PairingConfig::default());
        let mut rng = rng(31);

        for _ in 0..100 {
            let (a, b) = selector
                .finals_pairing(&catalog, &engine, &ratings, &mut rng)
                .expect("finals pair available");
            let rank_of = |id: &str| id[1..].parse::<usize>().unwrap();
            // Wildcards reach down to rank 40; nothing below that appears.
            assert!(rank_of(&a) < 40, "{} too low-ranked for finals", a);
            assert!(rank_of(&b) < 40, "{} too low-ranked for finals", b);
            assert_ne!(a, b);
        }
    }

    #[test]
    fn test_finals_never_offers_skip_capped_pair() {
        let catalog = make_catalog(12);
        let mut ratings = catalog.initial_ratings();
        for i in 0..12 {
            ratings.insert(format!("s{}", i), 2000 - (i as i32) * 5);
        }
        // Every pair has been compared except (s0, s10), which is
        // skip-capped: no finals branch may offer anything.
        let mut engine = RatingEngine::default();
        for i in 0..12 {
            for j in (i + 1)..12 {
                if (i, j) == (0, 10) {
                    continue;
                }
                let (a, b) = (format!("s{}", i), format!("s{}", j));
                engine.record_comparison(&a, &b, &a);
            }
        }
        for _ in 0..3 {
            engine.record_skip("s0", "s10");
        }

        let selector = PairingSelector::new(&catalog, PairingConfig::default());
        let mut rng = rng(53);
        for _ in 0..200 {
            assert!(selector
                .finals_pairing(&catalog, &engine, &ratings, &mut rng)
                .is_none());
        }
    }

    #[test]
    fn test_cross_tier_never_offers_skip_capped_pair() {
        let catalog = make_catalog(15);
        let mut ratings = catalog.initial_ratings();
        for i in 0..15 {
            ratings.insert(format!("s{}", i), 2000 - (i as i32) * 5);
        }
        // Every top-10 song has faced every challenger except (s1, s10),
        // which is skip-capped; no challenge may fall back to it.
        let mut engine = RatingEngine::default();
        for i in 0..10 {
            for j in 10..15 {
                if (i, j) == (1, 10) {
                    continue;
                }
                let (a, b) = (format!("s{}", i), format!("s{}", j));
                engine.record_comparison(&a, &b, &a);
            }
        }
        for _ in 0..3 {
            engine.record_skip("s1", "s10");
        }

        let selector = PairingSelector::new(&catalog, PairingConfig::default());
        let mut rng = rng(59);
        for _ in 0..200 {
            assert!(selector
                .cross_tier_challenge(&catalog, &engine, &ratings, &mut rng)
                .is_none());
        }
    }

    #[test]
    fn test_cross_tier_pits_top10_against_lower_ranks() {
        let catalog = make_catalog(100);
        let mut ratings = catalog.initial_ratings();
        for i in 0..100 {
            ratings.insert(format!("s{}", i), 2000 - (i as i32) * 5);
        }
        let engine = RatingEngine::default();
        let selector = PairingSelector::new(&catalog, PairingConfig::default());
        let mut rng = rng(13);

        for _ in 0..50 {
            let (top, challenger) = selector
                .cross_tier_challenge(&catalog, &engine, &ratings, &mut rng)
                .expect("challenge available");
            let rank_of = |id: &str| id[1..].parse::<usize>().unwrap();
            assert!(rank_of(&top) < 10, "{} not a top-10 song", top);
            assert!(
                (10..60).contains(&rank_of(&challenger)),
                "{} not in challenger range",
                challenger
            );
        }
    }

    #[test]
    fn test_cross_tier_turns() {
        let catalog = make_catalog(50);
        let selector = PairingSelector::new(&catalog, PairingConfig::default());
        assert!(!selector.is_cross_tier_turn(10));
        assert!(!selector.is_cross_tier_turn(19));
        assert!(selector.is_cross_tier_turn(20));
        assert!(!selector.is_cross_tier_turn(21));
        assert!(selector.is_cross_tier_turn(30));
        assert!(selector.is_cross_tier_turn(70));
    }

    #[test]
    fn test_classic_pairing_includes_classic_song() {
        let catalog = make_catalog(60);
        let engine = RatingEngine::default();
        let selector = PairingSelector::new(&catalog, PairingConfig::default());
        let mut rng = rng(47);

        for _ in 0..50 {
            let (a, b) = selector
                .classic_pairing(Phase::Top100, &catalog, &engine, &mut rng)
                .expect("classic pair available");
            let a_classic = catalog.song(&a).map(|s| s.album_id == "a0").unwrap();
            let b_classic = catalog.song(&b).map(|s| s.album_id == "a0").unwrap();
            assert!(a_classic || b_classic, "neither {} nor {} is classic", a, b);
            assert_ne!(a, b);
        }
    }
}
