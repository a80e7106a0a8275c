//! Command-line front end: argument parsing and the command handlers that
//! drive the item store.
mod app;
mod args;

pub use app::*;
pub use args::*;
