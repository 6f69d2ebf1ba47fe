// src/ui.rs

use chrono::{DateTime, Local};
use dialoguer::{theme::ColorfulTheme, Input, Select};
use rand::Rng;

use crate::session::Session;

/// Displays the current standings in an interactive list.
/// Shows up to the 20 highest-rated songs.
/// Selecting an entry shows its rating details and recent form.
///
/// # Errors
///
/// Returns an error if any dialoguer interaction fails.
pub fn view_standings<R: Rng>(
    session: &Session<R>,
    theme: &ColorfulTheme,
) -> Result<(), Box<dyn std::error::Error>> {
    if session.completed_comparisons() == 0 {
        println!("\n--- No comparisons yet ---");
        Input::<String>::with_theme(theme)
            .with_prompt("Press Enter to continue...")
            .allow_empty(true)
            .interact()?;
        return Ok(());
    }

    let ranked = session.ranked_songs();
    let items: Vec<String> = ranked
        .iter()
        .take(20)
        .enumerate()
        .map(|(i, (song, rating))| {
            format!(
                "{:2}. {} ({}) — {} [{:.0}% settled]",
                i + 1,
                song.title,
                session.catalog().album_name(&song.album_id),
                rating,
                session.confidence_of(&song.id) * 100.0
            )
        })
        .collect();

    let selection = Select::with_theme(theme)
        .with_prompt("-- Current Standings (top 20) --\nSelect for details, Esc to go back:")
        .items(&items)
        .default(0)
        .interact_opt()?;

    if let Some(index) = selection {
        if let Some((song, rating)) = ranked.get(index) {
            let engine = session.engine();
            let form: String = engine
                .recent_comparisons(&song.id, 5)
                .iter()
                .map(|c| if c.winner_id == song.id { 'W' } else { 'L' })
                .collect();
            let last_compared = engine
                .recent_comparisons(&song.id, 1)
                .first()
                .map(|c| {
                    DateTime::<Local>::from(c.timestamp)
                        .format("%Y-%m-%d %H:%M")
                        .to_string()
                })
                .unwrap_or_else(|| "never".to_owned());

            println!("\n--- {} ---", song.title);
            println!("Album: {}", session.catalog().album_name(&song.album_id));
            println!("Rating: {}", rating);
            println!(
                "Comparisons: {} (win rate {:.0}%)",
                engine.comparison_count(&song.id),
                engine.win_rate(&song.id) * 100.0
            );
            println!("Recent form: {}", if form.is_empty() { "-".into() } else { form });
            println!("Last compared: {}", last_compared);
            println!("------------------------------");

            Input::<String>::with_theme(theme)
                .with_prompt("Press Enter to continue...")
                .allow_empty(true)
                .interact()?;
        }
    }

    Ok(())
}

/// Prints the final ranking: the top songs and the strongest albums.
pub fn show_results<R: Rng>(session: &Session<R>) {
    println!("\n=== Your Top Songs ===");
    for (i, (song, rating)) in session.ranked_songs().iter().take(10).enumerate() {
        println!(
            "{:2}. {} ({}) — {}",
            i + 1,
            song.title,
            session.catalog().album_name(&song.album_id),
            rating
        );
    }

    let albums = session.top_albums();
    if !albums.is_empty() {
        println!("\n=== Your Top Albums ===");
        for (i, standing) in albums.iter().enumerate() {
            println!(
                "{:2}. {} — avg {:.0} over {} songs",
                i + 1,
                standing.album.name,
                standing.average_rating,
                standing.compared_songs
            );
        }
    }
    println!(
        "\nBased on {} comparisons.",
        session.completed_comparisons()
    );
}
