//! Tagged clip store library
//!
//! This library keeps a collection of saved text clips with tags, optional links
//! and attached documents, persists it through a key-value store, and mirrors
//! every change into an external JSON backup that seeds the store on startup.

mod attachment;
mod backup;
mod cli;
mod config;
mod errors;
mod helper;
mod item;
mod kv;
mod storage;
mod types;

// Re-export key components
pub use attachment::*;
pub use backup::*;
pub use cli::*;
pub use config::*;
pub use errors::*;
pub use helper::*;
pub use item::*;
pub use kv::*;
pub use storage::*;
pub use types::*;
