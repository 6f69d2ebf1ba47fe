// src/cli.rs

use clap::Parser;

#[derive(Parser, Debug)]
#[clap(
    author,
    version,
    about = "Ranks a song catalog through pairwise comparisons.",
    long_about = None
)]
pub struct Cli {
    /// Path to the song catalog JSON file (supports ~ and env vars).
    #[clap(short, long)]
    pub catalog: Option<String>,

    /// Seed for the selection RNG. Unseeded runs draw from OS entropy.
    #[clap(long)]
    pub seed: Option<u64>,

    /// Write the comparison history to this file instead of the default
    /// location in the platform data directory.
    #[clap(long, name = "history-file")]
    pub history_file: Option<String>,
}
