//! CLI module for the tagclip application
//!
//! This module handles the command-line interface for interacting with the
//! item store and its backup.
use std::{
    fs,
    io::{stdin, IsTerminal, Read},
    path::{Path, PathBuf},
};

use console::style;
use log::{debug, info, warn};

use crate::{
    load_items_from_file, parse_tags, restore, write_snapshot, Attachment, BackupWorker,
    ClipError, Commands, Config, DirectorySink, Item, ItemStore, JsonFileStore, NewItem, Result,
};

/// CLI Application handler - processes CLI commands and interfaces with ItemStore
pub struct App {
    /// The item store backend
    store: ItemStore,

    /// Mirrors store changes to the backup file when auto backup is on
    backup_worker: Option<BackupWorker>,

    /// Application configuration
    config: Config,

    /// Whether to display verbose output
    verbose: bool,
}

impl App {
    /// Opens the store described by `config`, seeding it from the backup
    /// file when nothing has been persisted yet.
    ///
    /// Must run inside a tokio runtime when `auto_backup` is enabled.
    pub fn startup(config: Config, verbose: bool) -> Result<Self> {
        info!(
            "Opening store: data_dir={}, backup_file={}",
            config.data_dir.display(),
            config.backup_file.display()
        );

        let kv = JsonFileStore::open(&config.data_dir)?;
        let mut store = ItemStore::new(Box::new(kv), config.empty_content_policy)
            .with_attachments(Box::new(DirectorySink::new(&config.attachments_dir)));

        let restored = restore(&config.backup_file);
        if store.seed_if_absent(restored)? {
            info!("Store seeded from {}", config.backup_file.display());
        }
        store.initialize()?;

        let backup_worker = if config.auto_backup {
            let mut worker = BackupWorker::new(&config.backup_file);
            worker.start(store.subscribe())?;
            Some(worker)
        } else {
            debug!("Auto backup disabled");
            None
        };

        Ok(Self {
            store,
            backup_worker,
            config,
            verbose,
        })
    }

    pub fn store(&self) -> &ItemStore {
        &self.store
    }

    /// Run the CLI application with the given command
    pub async fn run(&mut self, command: Commands) -> Result<()> {
        match command {
            Commands::Add {
                content,
                tags,
                link,
                file,
                media_type,
            } => self.handle_add(content, tags, link, file, media_type)?,

            Commands::List { limit, json } => {
                let items = self.store.list().to_vec();
                self.display_items(&items, limit, json)?;
            }

            Commands::Search { query, limit, json } => {
                let items = self.store.search(&query);
                if items.is_empty() {
                    println!("No clips found matching \"{}\"", query);
                } else {
                    self.display_items(&items, limit, json)?;
                }
            }

            Commands::Show { id, raw } => self.handle_show(id, raw)?,

            Commands::Delete { id } => {
                if self.store.remove(id)? {
                    println!("Clip {} deleted", id);
                } else {
                    println!("No clip with ID {}", id);
                }
            }

            Commands::Open { id } => {
                let path = self.store.open_attachment(id)?;
                println!("{}", path.display());
            }

            Commands::Tags => self.handle_tags(),

            Commands::Import { source } => self.handle_import(&source)?,

            Commands::Export { output } => {
                self.store.export_to(&output)?;
                println!(
                    "Exported {} clips to {}",
                    self.store.len(),
                    output.display()
                );
            }

            Commands::Backup => self.handle_backup().await?,

            Commands::Restore { from } => {
                let source = from.unwrap_or_else(|| self.config.backup_file.clone());
                self.handle_import(&source)?;
            }

            Commands::Config { .. } => {
                return Err(ClipError::ApplicationError {
                    message: "config is handled before the store is opened".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Stops the backup worker after it has written every pending change.
    pub async fn shutdown(&mut self) -> Result<()> {
        if let Some(worker) = self.backup_worker.as_mut() {
            worker.stop().await?;
            let status = worker.get_status();
            if let Some(e) = status.last_error {
                warn!("Backup file may be stale: {}", e);
            }
        }
        Ok(())
    }

    fn handle_add(
        &mut self,
        content: Option<String>,
        tags: Option<String>,
        link: Option<String>,
        file: Option<PathBuf>,
        media_type: Option<String>,
    ) -> Result<()> {
        let content = match content {
            Some(c) => c,
            None => read_pasted_content()?,
        };

        let mut candidate = NewItem::new(content, parse_tags(tags));
        if let Some(link) = link {
            candidate = candidate.with_link(link);
        }
        if let Some(path) = file {
            candidate = candidate.with_attachment(read_attachment(&path, media_type)?);
        }

        match self.store.add(candidate)? {
            Some(added) => {
                println!("Clip saved with ID: {}", added.item.id);
                if let Some(e) = added.attachment_error {
                    eprintln!(
                        "{} document was not saved: {}",
                        style("warning:").yellow().bold(),
                        e
                    );
                }
            }
            None => println!("Nothing saved: clip content was empty"),
        }
        Ok(())
    }

    fn handle_show(&self, id: i64, raw: bool) -> Result<()> {
        let item = self.store.get(id).ok_or(ClipError::ItemNotFound { id })?;
        if raw {
            print!("{}", item.content);
        } else {
            self.display_item(item);
        }
        Ok(())
    }

    fn handle_tags(&self) {
        let counts = self.store.tag_counts();
        if counts.is_empty() {
            println!("No tags yet.");
            return;
        }
        for (tag, count) in counts {
            println!("{} ({})", style(format!("#{}", tag)).cyan(), count);
        }
    }

    fn handle_import(&mut self, source: &Path) -> Result<()> {
        if !source.exists() {
            return Err(ClipError::FileNotFound {
                file_path: source.display().to_string(),
            });
        }

        let items = load_items_from_file(source)?;
        let summary = self.store.import_items(items)?;
        println!(
            "Imported {} of {} clips from {}",
            summary.items_imported,
            summary.total_items,
            source.display()
        );
        if summary.duplicates_dropped > 0 {
            println!("Skipped {} clips with duplicate IDs", summary.duplicates_dropped);
        }
        Ok(())
    }

    async fn handle_backup(&self) -> Result<()> {
        let items = self.store.list().to_vec();
        match &self.backup_worker {
            Some(worker) => {
                worker.snapshot_now(items).await?;
                println!("Backup written to {}", worker.backup_file().display());
            }
            None => {
                write_snapshot(&self.config.backup_file, &items)?;
                println!("Backup written to {}", self.config.backup_file.display());
            }
        }
        Ok(())
    }

    /// Display items in the requested format
    fn display_items(&self, items: &[Item], limit: usize, json: bool) -> Result<()> {
        if items.is_empty() {
            println!("No clips saved yet.");
            return Ok(());
        }

        let shown = if limit > 0 && items.len() > limit {
            &items[..limit]
        } else {
            items
        };

        if json {
            println!("{}", serde_json::to_string_pretty(shown)?);
            return Ok(());
        }

        let term_width = terminal_size::terminal_size()
            .map(|(w, _)| w.0 as usize)
            .unwrap_or(80);

        for (i, item) in shown.iter().enumerate() {
            if i > 0 {
                println!("{}", "-".repeat(term_width.min(50)));
            }
            self.display_item(item);
        }

        println!(
            "\nShowing {} of {} clip{}",
            shown.len(),
            items.len(),
            if items.len() == 1 { "" } else { "s" }
        );
        Ok(())
    }

    fn display_item(&self, item: &Item) {
        let created_at = item.timestamp.format("%Y-%m-%d %H:%M");
        println!("ID: {} | Created: {}", style(item.id).bold(), created_at);

        if !item.tags.is_empty() {
            let tags = item
                .tags
                .iter()
                .map(|tag| format!("#{}", tag))
                .collect::<Vec<_>>()
                .join(" ");
            println!("Tags: {}", style(tags).cyan());
        }
        if let Some(link) = &item.doc_link {
            println!("Link: {}", style(link).underlined());
        }
        if let Some(doc) = &item.doc_file {
            println!("Document: {} ({})", doc.name, doc.media_type);
            if self.verbose {
                println!("Locator: {}", doc.locator);
            }
        }

        println!("\n{}", item.content);
    }

    /// Handles `config` without opening the store.
    pub fn handle_config(
        config_path: &Path,
        show: bool,
        set: Option<String>,
        reset: bool,
    ) -> Result<()> {
        let mut config = if reset {
            Config::default()
        } else {
            Config::load(config_path)?
        };

        let changed = reset || set.is_some();
        if let Some(assignment) = set {
            config.set(&assignment)?;
        }
        if changed {
            config.save(config_path)?;
        }

        if show {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Ok(())
    }
}

/// Reads clip text piped on stdin, the CLI counterpart of pasting.
fn read_pasted_content() -> Result<String> {
    let mut input = stdin();
    if input.is_terminal() {
        println!("Paste the clip, then press Ctrl-D:");
    }
    let mut content = String::new();
    input.read_to_string(&mut content)?;
    Ok(content)
}

fn read_attachment(path: &Path, media_type: Option<String>) -> Result<Attachment> {
    if !path.is_file() {
        return Err(ClipError::FileNotFound {
            file_path: path.display().to_string(),
        });
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "document".to_string());
    let bytes = fs::read(path)?;

    Ok(Attachment {
        media_type: media_type.unwrap_or_else(|| guess_media_type(path).to_string()),
        name,
        bytes,
    })
}

/// Best guess at a media type from the file extension.
pub fn guess_media_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "txt" | "md" => "text/plain",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        _ => "application/octet-stream",
    }
}
