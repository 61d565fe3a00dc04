//! CLI arguments

use clap::Parser;
use std::path::PathBuf;

/// Singer tap for the Ordway billing API
#[derive(Parser, Debug)]
#[command(name = "tap-ordway")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (JSON)
    #[arg(short, long)]
    pub config: PathBuf,

    /// State file (JSON) from a previous run
    #[arg(short, long, conflicts_with = "state_json")]
    pub state: Option<PathBuf>,

    /// Inline state JSON
    #[arg(long)]
    pub state_json: Option<String>,

    /// Catalog file (JSON) selecting the streams to sync
    #[arg(long, visible_alias = "properties")]
    pub catalog: Option<PathBuf>,

    /// Print the discovered catalog and exit
    #[arg(short, long)]
    pub discover: bool,

    /// Also persist state to this file after every STATE message
    #[arg(long)]
    pub state_output: Option<PathBuf>,

    /// Process change events (one JSON object per line) from a file, or `-` for stdin
    #[arg(long, conflicts_with = "discover")]
    pub events: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,
}
