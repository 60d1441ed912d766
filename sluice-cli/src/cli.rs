use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "sluice",
    version,
    about = "Resolve live stream URLs and relay them into a media player"
)]
pub struct Args {
    /// Alternate configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (repeatable)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Log errors only
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve a URL and pipe the chosen stream into the player
    Play {
        /// Source URL (site page, direct manifest, rtmp://, hls://, or plain HTTP)
        url: String,

        /// Quality label, or the `best`/`worst` aliases
        quality: Option<String>,

        /// Player command line; `-` is appended so it reads from stdin
        #[arg(short, long)]
        player: Option<String>,
    },

    /// List the stream qualities available for a URL
    Streams { url: String },

    /// Interactive multi-session mode: start and stop relay sessions on
    /// local ports from a command prompt
    Manage,
}
