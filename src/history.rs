// src/history.rs

use std::{
    fs::{self, File, OpenOptions},
    io::{self, BufReader, BufWriter, Error as IoError, ErrorKind as IoErrorKind},
    path::{Path, PathBuf},
};

use crate::config::{APP_NAME, HISTORY_FILE_NAME, K_MEDIUM};
use crate::elo::EloData;

/// Returns the full path to the application's data directory.
/// This function creates the directory if it does not already exist.
///
/// # Errors
///
/// Returns an error if the system's data directory cannot be determined
/// or if creating the application data directory fails.
pub fn get_app_data_dir() -> Result<PathBuf, Box<dyn std::error::Error>> {
    let data_dir_base = dirs::data_dir().ok_or_else(|| {
        IoError::new(
            IoErrorKind::NotFound,
            "Failed to determine the system's data directory.",
        )
    })?;

    let app_data_dir = data_dir_base.join(APP_NAME);
    fs::create_dir_all(&app_data_dir)?;

    Ok(app_data_dir)
}

/// Returns the full path to the history JSON file, located within the app data directory.
pub fn get_history_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
    Ok(get_app_data_dir()?.join(HISTORY_FILE_NAME))
}

fn empty_history() -> EloData {
    EloData {
        comparisons: Vec::new(),
        skip_counts: Default::default(),
        k: K_MEDIUM,
    }
}

/// Loads the comparison history from the JSON file.
/// If `custom_path` is provided, it uses that file instead of the default history file.
/// If the file doesn't exist, an empty history is returned.
/// If the file exists but cannot be parsed, a warning is logged and an empty
/// history is returned; a stale session is never worth blocking a new one.
///
/// # Errors
///
/// Returns an error if the history file path cannot be determined or if an
/// I/O error (other than `NotFound`) occurs while reading the file.
pub fn load_history(custom_path: Option<&Path>) -> Result<EloData, Box<dyn std::error::Error>> {
    let history_path_buf;
    let history_path = match custom_path {
        Some(p) => p,
        None => {
            history_path_buf = get_history_path()?;
            &history_path_buf
        }
    };

    match File::open(history_path) {
        Ok(file) => {
            let reader = BufReader::new(file);
            match serde_json::from_reader(reader) {
                Ok(history) => Ok(history),
                Err(e) => {
                    log::warn!(
                        "Could not parse history file at '{}' ({}). Starting with empty history.",
                        history_path.display(),
                        e
                    );
                    Ok(empty_history())
                }
            }
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(empty_history()),
        Err(e) => Err(Box::new(e)),
    }
}

/// Saves the engine's comparison history to disk.
/// If `custom_path` is provided, it saves to that file instead of the default history file.
///
/// # Errors
///
/// Returns an error if the history file path cannot be determined, or if
/// I/O or serialization errors occur while saving.
pub fn save_history(
    data: &EloData,
    custom_path: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let history_path_buf;
    let history_path = match custom_path {
        Some(p) => p,
        None => {
            history_path_buf = get_history_path()?;
            &history_path_buf
        }
    };

    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(history_path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, data)?;

    Ok(())
}
