//! Shared result types and the command surface of the tagclip application.
use std::path::PathBuf;

use clap::Subcommand;

use crate::{ClipError, Item};

/// A specialized Result type for tagclip operations.
pub type Result<T> = std::result::Result<T, ClipError>;

/// Outcome of a successful `add`.
#[derive(Debug)]
pub struct AddedItem {
    /// The item as it was stored
    pub item: Item,
    /// Set when the document could not be stored; the item was saved without it
    pub attachment_error: Option<ClipError>,
}

/// Summary of replacing the collection with an imported document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    /// Items found in the document
    pub total_items: usize,
    /// Items kept after collapsing duplicate ids
    pub items_imported: usize,
    /// Items dropped because their id was already present
    pub duplicates_dropped: usize,
}

/// Available subcommands for the tagclip application
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Save a new clip
    Add {
        /// Text of the clip; read from stdin when omitted
        content: Option<String>,

        /// Tags to associate with the clip (comma-separated)
        #[clap(short, long)]
        tags: Option<String>,

        /// Link to an external document
        #[clap(short, long)]
        link: Option<String>,

        /// Document to attach
        #[clap(short, long)]
        file: Option<PathBuf>,

        /// Media type of the attached document
        #[clap(long = "type")]
        media_type: Option<String>,
    },

    /// List clips, newest first
    List {
        /// Limit the number of clips shown (0 shows all)
        #[clap(short = 'n', long, default_value_t = 0)]
        limit: usize,

        /// Format output as JSON
        #[clap(short, long)]
        json: bool,
    },

    /// Filter clips by tag or content
    Search {
        /// Text to look for in content and tags
        query: String,

        /// Limit the number of results (0 shows all)
        #[clap(short = 'n', long, default_value_t = 0)]
        limit: usize,

        /// Format output as JSON
        #[clap(short, long)]
        json: bool,
    },

    /// Show a single clip
    Show {
        /// ID of the clip
        id: i64,

        /// Print only the raw content, for piping into a clipboard tool
        #[clap(short, long)]
        raw: bool,
    },

    /// Delete a clip by ID
    Delete {
        /// ID of the clip to delete
        id: i64,
    },

    /// Print the location of a clip's attached document
    Open {
        /// ID of the clip
        id: i64,
    },

    /// List every tag with the number of clips using it
    Tags,

    /// Replace all clips with the contents of an exported JSON document
    Import {
        /// Path to the JSON document
        source: PathBuf,
    },

    /// Write all clips to a JSON document
    Export {
        /// Where to write the document
        output: PathBuf,
    },

    /// Write the backup file now
    Backup,

    /// Replace all clips with the contents of the backup file
    Restore {
        /// Backup file to read (default uses config setting)
        #[clap(short, long)]
        from: Option<PathBuf>,
    },

    /// Configuration management
    Config {
        /// Show current configuration
        #[clap(short = 'S', long)]
        show: bool,

        /// Update a configuration setting (key=value)
        #[clap(short, long)]
        set: Option<String>,

        /// Reset configuration to defaults
        #[clap(short, long)]
        reset: bool,
    },
}
