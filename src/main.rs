// src/main.rs

use clap::Parser;
use dialoguer::{theme::ColorfulTheme, Input, Select};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::env;
use std::path::PathBuf;
use std::process;

// Module declarations
mod catalog;
mod cli;
mod config;
mod elo;
mod history;
mod pairing;
mod session;
mod ui;

// Crate imports for convenience
use crate::catalog::{load_catalog, Song};
use crate::cli::Cli;
use crate::config::PairingConfig;
use crate::history::{load_history, save_history};
use crate::session::Session;
use crate::ui::{show_results, view_standings};

fn main() {
    if let Err(err) = run_app() {
        eprintln!("\nApplication Error: {}", err);
        process::exit(1);
    }
}

/// Label shown on a comparison card: title, album, and how big the song is.
fn describe_song(song: &Song, album_name: &str) -> String {
    if song.streams >= 1_000_000 {
        format!(
            "{} ({}, {}M streams)",
            song.title,
            album_name,
            song.streams / 1_000_000
        )
    } else {
        format!("{} ({})", song.title, album_name)
    }
}

fn run_app() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    env_logger::init();
    let cli_args = Cli::parse();
    let theme = ColorfulTheme::default();

    let catalog_path = match cli_args
        .catalog
        .or_else(|| env::var("SONG_RANKER_CATALOG").ok())
    {
        Some(path) => PathBuf::from(shellexpand::tilde(&path).into_owned()),
        None => PathBuf::from(
            shellexpand::full(
                &Input::<String>::with_theme(&theme)
                    .with_prompt("Enter the path to the song catalog (supports ~ and env vars)")
                    .interact_text()?,
            )?
            .into_owned(),
        ),
    };

    let catalog = load_catalog(&catalog_path)?;
    println!(
        "Loaded {} songs from '{}'. Pick the song you prefer in each matchup.",
        catalog.songs.len(),
        catalog_path.display()
    );

    let rng = match cli_args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => rand::make_rng(),
    };
    let pairing_config = PairingConfig::default();
    let finals_threshold = pairing_config.phase_thresholds[3];
    let mut session = Session::new(catalog, pairing_config, rng);

    let history_path: Option<PathBuf> = cli_args
        .history_file
        .map(|p| PathBuf::from(shellexpand::tilde(&p).into_owned()));

    match load_history(history_path.as_deref()) {
        Ok(history) if !history.comparisons.is_empty() => {
            session.resume(history);
            println!(
                "Resumed {} comparisons from your saved history.",
                session.completed_comparisons()
            );
        }
        Ok(_) => {}
        Err(e) => log::warn!("Could not load history: {}", e),
    }

    'outer: loop {
        let (song_id_a, song_id_b) = match session.next_pair() {
            Some(pair) => pair,
            None => {
                println!("\nNo more valid matchups — you've compared everything!");
                show_results(&session);
                break 'outer;
            }
        };

        let (label_a, label_b) = {
            let catalog = session.catalog();
            let label = |id: &str| {
                catalog
                    .song(id)
                    .map(|s| describe_song(s, catalog.album_name(&s.album_id)))
                    .unwrap_or_else(|| id.to_owned())
            };
            (label(&song_id_a), label(&song_id_b))
        };

        'inner: loop {
            let actions = [
                format!("Pick: {}", label_a),
                format!("Pick: {}", label_b),
                "Skip this matchup".to_owned(),
                "Undo last choice".to_owned(),
                "View standings".to_owned(),
                "Finish and show results".to_owned(),
            ];

            let prompt = format!("Matchup #{}", session.completed_comparisons() + 1);
            let choice_idx = Select::with_theme(&theme)
                .with_prompt(&prompt)
                .items(&actions)
                .default(0)
                .interact_opt()?
                .unwrap_or(actions.len() - 1);

            match choice_idx {
                0 | 1 => {
                    let winner_id = if choice_idx == 0 { &song_id_a } else { &song_id_b };
                    session.choose(&song_id_a, &song_id_b, winner_id)?;

                    if session.completed_comparisons() == finals_threshold {
                        println!("\nEntering finals mode — refining your top picks!");
                    }
                    if let Err(e) =
                        save_history(&session.engine().export_data(), history_path.as_deref())
                    {
                        log::warn!("Could not save history: {}", e);
                    }
                    break 'inner;
                }
                2 => {
                    session.skip(&song_id_a, &song_id_b);
                    break 'inner;
                }
                3 => {
                    if session.undo_last() {
                        println!("Reverted the previous comparison.");
                    } else {
                        println!("Nothing to undo yet.");
                    }
                    // The offered pair is still valid; present it again.
                }
                4 => {
                    view_standings(&session, &theme)?;
                }
                _ => {
                    show_results(&session);
                    let next = Select::with_theme(&theme)
                        .with_prompt("What next?")
                        .items(&["Keep ranking", "Start over", "Quit"])
                        .default(0)
                        .interact_opt()?
                        .unwrap_or(2);
                    match next {
                        0 => continue 'inner,
                        1 => {
                            session.restart();
                            if let Err(e) = save_history(
                                &session.engine().export_data(),
                                history_path.as_deref(),
                            ) {
                                log::warn!("Could not save history: {}", e);
                            }
                            println!("Starting over with fresh ratings.");
                            continue 'outer;
                        }
                        _ => break 'outer,
                    }
                }
            }
        }
    }

    if session.completed_comparisons() > 0 {
        if let Err(e) = save_history(&session.engine().export_data(), history_path.as_deref()) {
            log::warn!("Could not save history: {}", e);
        } else if let Some(path) = &history_path {
            println!("History saved to '{}'.", path.display());
        }
    }
    println!("Goodbye!");
    Ok(())
}
