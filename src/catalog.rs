// src/catalog.rs

use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fmt,
    fs::File,
    io::BufReader,
    path::Path,
};

use crate::config::BASELINE_RATING;

/// Custom error type for catalog files that load but fail validation.
#[derive(Debug)]
pub struct CatalogError {
    message: String,
}

impl CatalogError {
    pub fn new(message: String) -> Self {
        Self { message }
    }
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "catalog error: {}", self.message)
    }
}

impl std::error::Error for CatalogError {}

fn default_initial_rating() -> i32 {
    BASELINE_RATING
}

/// A rankable song. The stream count seeds popularity tiering and is never
/// mutated; the current rating lives in the session's rating map, not here.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Song {
    pub id: String,
    pub title: String,
    #[serde(rename = "albumId")]
    pub album_id: String,
    /// Lifetime stream count, used only to seed popularity tiers.
    #[serde(rename = "spotifyStreams", default)]
    pub streams: u64,
    #[serde(rename = "initialRating", default = "default_initial_rating")]
    pub initial_rating: i32,
}

/// An album. The `classic` and `deprioritized` flags drive the pairing
/// strategy's mainstream-boost and long-tail-dampening rules.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Album {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub classic: bool,
    #[serde(default)]
    pub deprioritized: bool,
}

#[derive(Deserialize, Debug)]
struct CatalogFile {
    songs: Vec<Song>,
    #[serde(default)]
    albums: Vec<Album>,
}

/// The loaded song catalog: static data, built once before a session starts.
#[derive(Debug, Clone)]
pub struct Catalog {
    pub songs: Vec<Song>,
    pub albums: HashMap<String, Album>,
}

impl Catalog {
    pub fn new(songs: Vec<Song>, albums: Vec<Album>) -> Self {
        let albums = albums.into_iter().map(|a| (a.id.clone(), a)).collect();
        Catalog { songs, albums }
    }

    pub fn song(&self, id: &str) -> Option<&Song> {
        self.songs.iter().find(|s| s.id == id)
    }

    pub fn album(&self, id: &str) -> Option<&Album> {
        self.albums.get(id)
    }

    pub fn album_name(&self, id: &str) -> &str {
        self.albums.get(id).map(|a| a.name.as_str()).unwrap_or("?")
    }

    pub fn is_deprioritized(&self, song_id: &str) -> bool {
        self.song(song_id)
            .and_then(|s| self.albums.get(&s.album_id))
            .map(|a| a.deprioritized)
            .unwrap_or(false)
    }

    /// Initial rating map for a fresh session, keyed by song id.
    pub fn initial_ratings(&self) -> HashMap<String, i32> {
        self.songs
            .iter()
            .map(|s| (s.id.clone(), s.initial_rating))
            .collect()
    }
}

/// Loads a catalog from a JSON file with `songs` and `albums` arrays.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or parsed, or if the song
/// list is empty or contains duplicate ids.
pub fn load_catalog(path: &Path) -> Result<Catalog, Box<dyn std::error::Error>> {
    let file = File::open(path).map_err(|e| {
        CatalogError::new(format!("cannot open '{}': {}", path.display(), e))
    })?;
    let reader = BufReader::new(file);
    let parsed: CatalogFile = serde_json::from_reader(reader).map_err(|e| {
        CatalogError::new(format!("cannot parse '{}': {}", path.display(), e))
    })?;

    if parsed.songs.is_empty() {
        return Err(Box::new(CatalogError::new(format!(
            "'{}' contains no songs",
            path.display()
        ))));
    }

    let mut seen = std::collections::HashSet::new();
    for song in &parsed.songs {
        if !seen.insert(song.id.as_str()) {
            return Err(Box::new(CatalogError::new(format!(
                "duplicate song id '{}'",
                song.id
            ))));
        }
    }

    log::info!(
        "Loaded {} songs across {} albums from '{}'",
        parsed.songs.len(),
        parsed.albums.len(),
        path.display()
    );

    Ok(Catalog::new(parsed.songs, parsed.albums))
}
