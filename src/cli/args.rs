use std::path::PathBuf;

use clap::Parser;

use crate::Commands;

/// Main CLI application arguments and command structure
#[derive(Parser, Debug)]
#[clap(
    name = "tagclip",
    version,
    about = "Save, tag and search text clips with an always-current JSON backup"
)]
pub struct Cli {
    /// Path to the configuration file
    #[clap(short = 'c', long, value_parser)]
    pub config: Option<PathBuf>,

    /// Directory holding the persisted store
    #[clap(long, value_parser)]
    pub data_dir: Option<PathBuf>,

    /// Backup file kept in sync with the store
    #[clap(long, value_parser)]
    pub backup_file: Option<PathBuf>,

    /// Verbose output mode
    #[clap(short, long)]
    pub verbose: bool,

    /// Subcommands for the tagclip application
    #[clap(subcommand)]
    pub command: Commands,
}
