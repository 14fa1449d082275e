use std::path::PathBuf;

use clap::Parser;

use crate::Commands;

/// Main CLI application arguments and command structure
#[derive(Parser, Debug)]
#[clap(
    version,
    about = "Notes organized by categories, stored in an embedded document store"
)]
pub struct Cli {
    /// Notebook root directory (defaults to $NOTEKEEPER_HOME, then the platform data directory)
    #[clap(short, long, value_parser)]
    pub root: Option<PathBuf>,

    /// Verbose output mode
    #[clap(short, long)]
    pub verbose: bool,

    /// Subcommands for the notekeeper application
    #[clap(subcommand)]
    pub command: Commands,
}
