// src/session.rs

use rand::Rng;
use std::collections::HashMap;
use std::fmt;

use crate::catalog::{Album, Catalog, Song};
use crate::config::{PairingConfig, BASELINE_RATING};
use crate::elo::{EloData, RatingEngine};
use crate::pairing::PairingSelector;

/// Error for a choice that names a winner outside the offered pair.
/// This is a caller bug, distinct from the tolerated data-absence cases.
#[derive(Debug)]
pub struct ChoiceError {
    message: String,
}

impl ChoiceError {
    fn new(message: String) -> Self {
        Self { message }
    }
}

impl fmt::Display for ChoiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "choice error: {}", self.message)
    }
}

impl std::error::Error for ChoiceError {}

/// Pre-comparison rating snapshot, retained so a comparison can be undone.
/// The engine itself never stores historical ratings.
#[derive(Debug, Clone)]
struct UndoEntry {
    song_id_a: String,
    song_id_b: String,
    rating_a_before: i32,
    rating_b_before: i32,
}

/// An album's aggregate standing over its compared songs.
#[derive(Debug, Clone)]
pub struct AlbumStanding {
    pub album: Album,
    pub average_rating: f64,
    pub compared_songs: usize,
}

/// One ranking session: owns the rating store, the rating engine, the
/// pairing selector, and the RNG every selection draws from.
///
/// The engine computes rating updates but the session stores them; the
/// selector proposes pairs but the session records outcomes. Sessions are
/// independent values, so a multi-user adaptation simply holds one per user.
pub struct Session<R: Rng> {
    catalog: Catalog,
    ratings: HashMap<String, i32>,
    engine: RatingEngine,
    selector: PairingSelector,
    rng: R,
    undo_stack: Vec<UndoEntry>,
}

impl<R: Rng> Session<R> {
    pub fn new(catalog: Catalog, config: PairingConfig, rng: R) -> Self {
        let ratings = catalog.initial_ratings();
        let selector = PairingSelector::new(&catalog, config);
        Session {
            catalog,
            ratings,
            engine: RatingEngine::default(),
            selector,
            rng,
            undo_stack: Vec::new(),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn engine(&self) -> &RatingEngine {
        &self.engine
    }

    /// The next pair to present, or `None` once no valid pairing remains.
    pub fn next_pair(&mut self) -> Option<(String, String)> {
        self.selector
            .next_pair(&self.catalog, &self.engine, &self.ratings, &mut self.rng)
    }

    /// Applies the user's decision for an offered pair: updates both ratings
    /// (each side under its own dynamic K), records the comparison, and
    /// advances the carry-over bookkeeping.
    ///
    /// # Errors
    ///
    /// Returns a [`ChoiceError`] if `winner_id` is neither of the pair.
    pub fn choose(
        &mut self,
        song_id_a: &str,
        song_id_b: &str,
        winner_id: &str,
    ) -> Result<(), ChoiceError> {
        if winner_id != song_id_a && winner_id != song_id_b {
            return Err(ChoiceError::new(format!(
                "winner '{}' is not part of the pair ({}, {})",
                winner_id, song_id_a, song_id_b
            )));
        }

        let rating_a = self.rating_of(song_id_a);
        let rating_b = self.rating_of(song_id_b);
        self.undo_stack.push(UndoEntry {
            song_id_a: song_id_a.to_owned(),
            song_id_b: song_id_b.to_owned(),
            rating_a_before: rating_a,
            rating_b_before: rating_b,
        });

        let score_a = if winner_id == song_id_a { 1.0 } else { 0.0 };
        let (new_rating_a, new_rating_b) =
            self.engine
                .update_ratings(rating_a, rating_b, score_a, song_id_a, song_id_b);

        self.ratings.insert(song_id_a.to_owned(), new_rating_a);
        self.ratings.insert(song_id_b.to_owned(), new_rating_b);
        self.engine.record_comparison(song_id_a, song_id_b, winner_id);
        self.selector.note_winner(winner_id);

        log::debug!(
            "Comparison #{}: '{}' beat '{}' ({} -> {}, {} -> {})",
            self.engine.completed_comparisons(),
            winner_id,
            if winner_id == song_id_a { song_id_b } else { song_id_a },
            rating_a,
            new_rating_a,
            rating_b,
            new_rating_b
        );
        Ok(())
    }

    /// Records a skip for the pair and breaks the carry-over chain.
    pub fn skip(&mut self, song_id_a: &str, song_id_b: &str) {
        self.engine.record_skip(song_id_a, song_id_b);
        self.selector.note_skip();
        log::debug!("Skipped pair ({}, {})", song_id_a, song_id_b);
    }

    /// Reverts the most recent comparison: restores both pre-comparison
    /// ratings and removes the record. Returns false with nothing to undo.
    pub fn undo_last(&mut self) -> bool {
        let entry = match self.undo_stack.pop() {
            Some(entry) => entry,
            None => return false,
        };
        self.engine
            .remove_comparison(&entry.song_id_a, &entry.song_id_b);
        self.ratings
            .insert(entry.song_id_a.clone(), entry.rating_a_before);
        self.ratings
            .insert(entry.song_id_b.clone(), entry.rating_b_before);
        log::debug!(
            "Undid comparison ({}, {})",
            entry.song_id_a,
            entry.song_id_b
        );
        true
    }

    pub fn completed_comparisons(&self) -> usize {
        self.engine.completed_comparisons()
    }

    pub fn rating_of(&self, song_id: &str) -> i32 {
        self.ratings.get(song_id).copied().unwrap_or(BASELINE_RATING)
    }

    pub fn confidence_of(&self, song_id: &str) -> f64 {
        self.engine.rating_confidence(song_id)
    }

    /// All songs sorted by current rating, best first.
    pub fn ranked_songs(&self) -> Vec<(&Song, i32)> {
        let mut ranked: Vec<(&Song, i32)> = self
            .catalog
            .songs
            .iter()
            .map(|song| (song, self.rating_of(&song.id)))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked
    }

    /// Albums ranked by average rating over their compared songs. Albums
    /// need at least two compared songs to qualify; at most five returned.
    pub fn top_albums(&self) -> Vec<AlbumStanding> {
        let mut totals: HashMap<&str, (i64, usize)> = HashMap::new();
        for song in &self.catalog.songs {
            if self.engine.comparison_count(&song.id) == 0 {
                continue;
            }
            let entry = totals.entry(song.album_id.as_str()).or_insert((0, 0));
            entry.0 += self.rating_of(&song.id) as i64;
            entry.1 += 1;
        }

        let mut standings: Vec<AlbumStanding> = totals
            .into_iter()
            .filter(|(_, (_, count))| *count >= 2)
            .filter_map(|(album_id, (total, count))| {
                self.catalog.album(album_id).map(|album| AlbumStanding {
                    album: album.clone(),
                    average_rating: total as f64 / count as f64,
                    compared_songs: count,
                })
            })
            .collect();
        standings.sort_by(|a, b| {
            b.average_rating
                .partial_cmp(&a.average_rating)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        standings.truncate(5);
        standings
    }

    /// Rebuilds session state from persisted history. Comparisons are
    /// replayed in recorded order so every rating update sees the same
    /// dynamic K it saw originally; the exact records and skip counters are
    /// then restored wholesale. Records naming songs no longer in the
    /// catalog replay harmlessly against baseline ratings.
    pub fn resume(&mut self, data: EloData) {
        self.restart();
        for record in &data.comparisons {
            let rating_a = self.rating_of(&record.song_id_a);
            let rating_b = self.rating_of(&record.song_id_b);
            let score_a = if record.winner_id == record.song_id_a {
                1.0
            } else {
                0.0
            };
            let (new_a, new_b) = self.engine.update_ratings(
                rating_a,
                rating_b,
                score_a,
                &record.song_id_a,
                &record.song_id_b,
            );
            self.ratings.insert(record.song_id_a.clone(), new_a);
            self.ratings.insert(record.song_id_b.clone(), new_b);
            self.engine.record_comparison_at(
                &record.song_id_a,
                &record.song_id_b,
                &record.winner_id,
                record.timestamp,
            );
        }
        self.engine.import_data(data);
        log::info!(
            "Resumed {} comparisons from history",
            self.engine.completed_comparisons()
        );
    }

    /// Back to a fresh session over the same catalog.
    pub fn restart(&mut self) {
        self.ratings = self.catalog.initial_ratings();
        self.engine.reset();
        self.selector.reset();
        self.undo_stack.clear();
        log::info!("Session restarted");
    }
}
