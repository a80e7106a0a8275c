use std::{fs, path::Path};

use log::{debug, error, trace, warn};
use serde_json::Value;

use crate::{ClipError, Item, Result};

/// Helper method to load a collection document from file
pub fn load_items_from_file(path: &Path) -> Result<Vec<Item>> {
    debug!("Loading items from file: {}", path.display());
    let content = fs::read_to_string(path).map_err(|e| {
        error!("Failed to open item file {}: {}", path.display(), e);
        ClipError::Io(e)
    })?;

    let items: Vec<Item> = serde_json::from_str(&content)?;
    trace!("Loaded {} items from {}", items.len(), path.display());
    Ok(items)
}

/// Decodes the collection stored under the items key.
pub fn items_from_value(key: &str, value: Value) -> Result<Vec<Item>> {
    serde_json::from_value(value).map_err(|e| {
        error!("Stored collection under '{}' is malformed: {}", key, e);
        ClipError::storage(key, e.to_string())
    })
}

// Helper method for parsing tags
pub fn parse_tags(tags: Option<String>) -> Vec<String> {
    tags.map(|t| {
        t.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

/// Trims tags supplied as a list and drops the empty ones, keeping order.
pub fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    tags.into_iter()
        .flat_map(|t| parse_tags(Some(t)))
        .collect()
}

/// Keeps the first item for every id.
pub fn dedupe_by_id(items: Vec<Item>) -> (Vec<Item>, usize) {
    let mut seen = std::collections::HashSet::with_capacity(items.len());
    let mut dropped = 0;
    let kept = items
        .into_iter()
        .filter(|item| {
            let fresh = seen.insert(item.id);
            if !fresh {
                warn!("Dropping duplicate item id {}", item.id);
                dropped += 1;
            }
            fresh
        })
        .collect();
    (kept, dropped)
}
