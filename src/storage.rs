use std::{collections::BTreeMap, path::Path, path::PathBuf};

use log::{debug, error, info, trace, warn};
use tokio::sync::mpsc;

use crate::{
    dedupe_by_id, items_from_value, normalize_tags, now_millis, write_snapshot, AddedItem,
    AttachmentSink, ClipError, EmptyContentPolicy, ImportSummary, Item, KeyValueStore, NewItem,
    Result, StorageChange,
};

/// Key under which the whole collection is persisted.
pub const ITEMS_KEY: &str = "clipboardItems";

/// Owns the clip collection and keeps it in step with persisted storage.
///
/// The in-memory list is only replaced after the persisted write for the same
/// mutation has succeeded, so a failed write never leaves the two apart.
pub struct ItemStore {
    /// Persisted key-value storage holding the collection under [`ITEMS_KEY`]
    kv: Box<dyn KeyValueStore>,

    /// Newest-first copy of the persisted collection
    items: Vec<Item>,

    /// Handling of blank content in `add`
    policy: EmptyContentPolicy,

    /// Where uploaded documents go, if anywhere
    attachments: Option<Box<dyn AttachmentSink>>,

    /// Flag indicating if the collection has been loaded
    initialized: bool,
}

impl ItemStore {
    pub fn new(kv: Box<dyn KeyValueStore>, policy: EmptyContentPolicy) -> Self {
        Self {
            kv,
            items: Vec::new(),
            policy,
            attachments: None,
            initialized: false,
        }
    }

    pub fn with_attachments(mut self, sink: Box<dyn AttachmentSink>) -> Self {
        self.attachments = Some(sink);
        self
    }

    /// Listens for every persisted write, including ones made by this store.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<StorageChange> {
        self.kv.subscribe()
    }

    /// Loads the persisted collection into memory.
    ///
    /// Safe to call repeatedly: the in-memory list is replaced, never appended to.
    ///
    /// # Returns
    ///
    /// The number of items loaded in case of success or an error
    pub fn initialize(&mut self) -> Result<usize> {
        let items = match self.kv.get(ITEMS_KEY)? {
            Some(value) => items_from_value(ITEMS_KEY, value)?,
            None => {
                debug!("No persisted collection under '{}', starting empty", ITEMS_KEY);
                Vec::new()
            }
        };

        let (items, dropped) = dedupe_by_id(items);
        if dropped > 0 {
            warn!("Ignored {} persisted items with duplicate ids", dropped);
        }

        self.items = items;
        self.initialized = true;
        info!("Loaded {} items into the store", self.items.len());
        Ok(self.items.len())
    }

    /// Writes `items` to persisted storage only if nothing is stored yet.
    ///
    /// Used at startup to seed storage from the restored backup.
    pub fn seed_if_absent(&mut self, items: Vec<Item>) -> Result<bool> {
        if self.kv.get(ITEMS_KEY)?.is_some() {
            trace!("Persisted collection already present, not seeding");
            return Ok(false);
        }

        let (items, _) = dedupe_by_id(items);
        info!("Seeding persisted storage with {} items", items.len());
        self.persist(items)?;
        self.initialized = true;
        Ok(true)
    }

    fn ensure_initialized(&mut self) -> Result<()> {
        if !self.initialized {
            self.initialize()?;
        }
        Ok(())
    }

    /// Writes the full collection, then adopts it as the in-memory list.
    fn persist(&mut self, items: Vec<Item>) -> Result<()> {
        let value = serde_json::to_value(&items)?;
        self.kv.set(ITEMS_KEY, value).map_err(|e| {
            error!("Persisted write failed, in-memory list left unchanged: {}", e);
            match e {
                ClipError::StorageFailure { .. } => e,
                other => ClipError::storage(ITEMS_KEY, other.to_string()),
            }
        })?;
        self.items = items;
        Ok(())
    }

    fn next_id(&self, now_ms: i64) -> Result<i64> {
        let Some(highest) = self.items.iter().map(|item| item.id).max() else {
            return Ok(now_ms);
        };
        let after_highest = highest.checked_add(1).ok_or_else(|| {
            error!("No id left above {}", highest);
            ClipError::Validation {
                message: format!("no unused id above {}", highest),
            }
        })?;
        Ok(now_ms.max(after_highest))
    }

    /// Creates a clip and puts it at the head of the collection.
    ///
    /// Returns `Ok(None)` when blank content is skipped by policy. A document
    /// that cannot be stored does not fail the add; the error is handed back in
    /// [`AddedItem::attachment_error`] and the item is saved without it.
    pub fn add(&mut self, candidate: NewItem) -> Result<Option<AddedItem>> {
        self.ensure_initialized()?;

        if candidate.content.trim().is_empty() {
            match self.policy {
                EmptyContentPolicy::Reject => {
                    debug!("Rejected clip with empty content");
                    return Err(ClipError::Validation {
                        message: "content must not be empty".to_string(),
                    });
                }
                EmptyContentPolicy::Skip => {
                    debug!("Skipped clip with empty content");
                    return Ok(None);
                }
                EmptyContentPolicy::Allow => {}
            }
        }

        let timestamp = now_millis();
        let id = self.next_id(timestamp.timestamp_millis())?;

        let NewItem {
            content,
            tags,
            doc_link,
            attachment,
        } = candidate;

        let mut attachment_error = None;
        let doc_file = match (attachment, &self.attachments) {
            (None, _) => None,
            (Some(upload), Some(sink)) => match sink.store(&upload) {
                Ok(doc) => Some(doc),
                Err(e) => {
                    warn!("Saving clip without its document: {}", e);
                    attachment_error = Some(e);
                    None
                }
            },
            (Some(upload), None) => {
                warn!("No attachment sink configured, dropping '{}'", upload.name);
                attachment_error = Some(ClipError::AttachmentFailed {
                    name: upload.name,
                    message: "no attachment storage configured".to_string(),
                });
                None
            }
        };

        let doc_link = doc_link
            .map(|link| link.trim().to_string())
            .filter(|link| !link.is_empty());

        let item = Item::new(
            id,
            content,
            normalize_tags(tags),
            doc_link,
            doc_file,
            timestamp,
        );

        let mut items = Vec::with_capacity(self.items.len() + 1);
        items.push(item.clone());
        items.extend(self.items.iter().cloned());
        self.persist(items)?;

        info!("Added item {} with {} tags", item.id, item.tags.len());
        Ok(Some(AddedItem {
            item,
            attachment_error,
        }))
    }

    /// Removes the item with `id`. Unknown ids are a no-op.
    ///
    /// # Returns
    ///
    /// Whether an item was removed
    pub fn remove(&mut self, id: i64) -> Result<bool> {
        self.ensure_initialized()?;

        if !self.items.iter().any(|item| item.id == id) {
            debug!("Remove of unknown item {} ignored", id);
            return Ok(false);
        }

        let items: Vec<Item> = self
            .items
            .iter()
            .filter(|item| item.id != id)
            .cloned()
            .collect();
        self.persist(items)?;

        info!("Removed item {}", id);
        Ok(true)
    }

    /// The whole collection, newest first.
    pub fn list(&self) -> &[Item] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: i64) -> Option<&Item> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Items whose content or any tag contains `term`, ignoring case.
    ///
    /// An empty term matches everything. Order is preserved.
    pub fn search(&self, term: &str) -> Vec<Item> {
        let needle = term.to_lowercase();
        if needle.is_empty() {
            return self.items.clone();
        }

        let matches: Vec<Item> = self
            .items
            .iter()
            .filter(|item| item.matches(&needle))
            .cloned()
            .collect();
        debug!("Search '{}' matched {} items", term, matches.len());
        matches
    }

    /// Distinct tags with the number of items carrying each, alphabetically.
    pub fn tag_counts(&self) -> Vec<(String, usize)> {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for item in &self.items {
            for tag in &item.tags {
                *counts.entry(tag.as_str()).or_insert(0) += 1;
            }
        }
        counts
            .into_iter()
            .map(|(tag, count)| (tag.to_string(), count))
            .collect()
    }

    /// Replaces the whole collection in one write, without `add` validation.
    pub fn import_items(&mut self, items: Vec<Item>) -> Result<ImportSummary> {
        let total_items = items.len();
        let (items, duplicates_dropped) = dedupe_by_id(items);
        let items_imported = items.len();

        self.persist(items)?;
        self.initialized = true;

        info!(
            "Imported {} items ({} duplicates dropped)",
            items_imported, duplicates_dropped
        );
        Ok(ImportSummary {
            total_items,
            items_imported,
            duplicates_dropped,
        })
    }

    /// Writes the current collection as a backup-format document.
    pub fn export_to(&self, path: &Path) -> Result<()> {
        write_snapshot(path, &self.items)?;
        info!("Exported {} items to {}", self.items.len(), path.display());
        Ok(())
    }

    /// Resolves the document attached to item `id`.
    pub fn open_attachment(&self, id: i64) -> Result<PathBuf> {
        let item = self.get(id).ok_or(ClipError::ItemNotFound { id })?;
        let doc = item
            .doc_file
            .as_ref()
            .ok_or_else(|| ClipError::ApplicationError {
                message: format!("Item {} has no attached document", id),
            })?;
        let sink = self
            .attachments
            .as_ref()
            .ok_or_else(|| ClipError::AttachmentFailed {
                name: doc.name.clone(),
                message: "no attachment storage configured".to_string(),
            })?;
        sink.open(doc)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashSet,
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
    };

    use serde_json::Value;
    use tempfile::TempDir;

    use super::*;
    use crate::{parse_tags, Attachment, DirectorySink, DocFile, JsonFileStore, MemoryStore};

    /// Memory store whose writes can be made to fail on demand.
    struct FlakyStore {
        inner: MemoryStore,
        fail: Arc<AtomicBool>,
    }

    impl KeyValueStore for FlakyStore {
        fn get(&self, key: &str) -> Result<Option<Value>> {
            self.inner.get(key)
        }

        fn set(&mut self, key: &str, value: Value) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(ClipError::storage(key, "quota exceeded"));
            }
            self.inner.set(key, value)
        }

        fn subscribe(&mut self) -> mpsc::UnboundedReceiver<StorageChange> {
            self.inner.subscribe()
        }
    }

    /// Sink that refuses every document.
    struct BrokenSink;

    impl AttachmentSink for BrokenSink {
        fn store(&self, attachment: &Attachment) -> Result<DocFile> {
            Err(ClipError::AttachmentFailed {
                name: attachment.name.clone(),
                message: "disk full".to_string(),
            })
        }

        fn open(&self, doc: &DocFile) -> Result<PathBuf> {
            Err(ClipError::AttachmentFailed {
                name: doc.name.clone(),
                message: "disk full".to_string(),
            })
        }
    }

    fn memory_store(policy: EmptyContentPolicy) -> ItemStore {
        let mut store = ItemStore::new(Box::new(MemoryStore::new()), policy);
        store.initialize().unwrap();
        store
    }

    fn add(store: &mut ItemStore, content: &str, tags: &str) -> Item {
        store
            .add(NewItem::new(content, parse_tags(Some(tags.to_string()))))
            .unwrap()
            .unwrap()
            .item
    }

    fn ids(items: &[Item]) -> Vec<i64> {
        items.iter().map(|item| item.id).collect()
    }

    #[test]
    fn ids_stay_unique_under_rapid_adds() {
        let mut store = memory_store(EmptyContentPolicy::Reject);
        for i in 0..200 {
            add(&mut store, &format!("clip {}", i), "");
        }

        let unique: HashSet<i64> = store.list().iter().map(|item| item.id).collect();
        assert_eq!(unique.len(), 200);

        // Newest first means ids strictly decrease down the list.
        assert!(store.list().windows(2).all(|pair| pair[0].id > pair[1].id));
    }

    #[test]
    fn add_puts_newest_first() {
        let mut store = memory_store(EmptyContentPolicy::Reject);
        let b = add(&mut store, "B", "");
        let a = add(&mut store, "A", "");
        let x = add(&mut store, "X", "");

        assert_eq!(ids(store.list()), vec![x.id, a.id, b.id]);
    }

    #[test]
    fn remove_twice_is_a_no_op_the_second_time() {
        let mut store = memory_store(EmptyContentPolicy::Reject);
        let keep = add(&mut store, "keep", "");
        let gone = add(&mut store, "gone", "");

        assert!(store.remove(gone.id).unwrap());
        let after_first = store.list().to_vec();
        assert!(!store.remove(gone.id).unwrap());

        assert_eq!(store.list(), after_first.as_slice());
        assert_eq!(ids(store.list()), vec![keep.id]);
    }

    #[test]
    fn search_matches_tags_and_content_ignoring_case() {
        let mut store = memory_store(EmptyContentPolicy::Reject);
        let tagged = add(&mut store, "nothing here", "Tag1, other");
        let _miss = add(&mut store, "unrelated", "misc");
        let in_content = add(&mut store, "mentions TAG1 inline", "");

        let hits = store.search("tag1");
        assert_eq!(ids(&hits), vec![in_content.id, tagged.id]);
    }

    #[test]
    fn empty_search_returns_everything_in_order() {
        let mut store = memory_store(EmptyContentPolicy::Reject);
        add(&mut store, "one", "");
        add(&mut store, "two", "");

        assert_eq!(store.search(""), store.list().to_vec());
    }

    #[test]
    fn search_term_whitespace_is_significant() {
        let mut store = memory_store(EmptyContentPolicy::Reject);
        add(&mut store, "abc", "");
        let spaced = add(&mut store, "x bc", "");

        assert_eq!(ids(&store.search(" bc")), vec![spaced.id]);
        assert_eq!(ids(&store.search(" ")), vec![spaced.id]);
        assert!(store.search("  ").is_empty());
    }

    #[test]
    fn hello_scenario() {
        let mut store = memory_store(EmptyContentPolicy::Reject);
        add(&mut store, "older", "z");

        let added = store
            .add(NewItem::new("hello", vec!["a, b".to_string()]))
            .unwrap()
            .unwrap();
        let item = added.item;
        assert_eq!(item.tags, vec!["a", "b"]);
        assert_eq!(store.list()[0].id, item.id);
        assert!(store.search("a").iter().any(|hit| hit.id == item.id));

        store.remove(item.id).unwrap();
        assert!(store.list().iter().all(|other| other.id != item.id));
        assert!(store.search("a").is_empty());
    }

    #[test]
    fn failed_write_leaves_memory_untouched() {
        let fail = Arc::new(AtomicBool::new(false));
        let kv = FlakyStore {
            inner: MemoryStore::new(),
            fail: Arc::clone(&fail),
        };
        let mut store = ItemStore::new(Box::new(kv), EmptyContentPolicy::Reject);
        store.initialize().unwrap();
        let existing = add(&mut store, "existing", "");

        fail.store(true, Ordering::SeqCst);
        let before = store.list().to_vec();

        let err = store.add(NewItem::new("new", vec![])).unwrap_err();
        assert!(matches!(err, ClipError::StorageFailure { .. }));
        assert_eq!(store.list(), before.as_slice());

        assert!(store.remove(existing.id).is_err());
        assert_eq!(store.list(), before.as_slice());
    }

    #[test]
    fn empty_content_follows_policy() {
        let mut reject = memory_store(EmptyContentPolicy::Reject);
        assert!(matches!(
            reject.add(NewItem::new("  \n", vec![])),
            Err(ClipError::Validation { .. })
        ));
        assert!(reject.is_empty());

        let mut skip = memory_store(EmptyContentPolicy::Skip);
        assert!(skip.add(NewItem::new("", vec![])).unwrap().is_none());
        assert!(skip.is_empty());

        let mut allow = memory_store(EmptyContentPolicy::Allow);
        assert!(allow.add(NewItem::new("", vec![])).unwrap().is_some());
        assert_eq!(allow.len(), 1);
    }

    #[test]
    fn rejected_add_writes_nothing() {
        let mut store = memory_store(EmptyContentPolicy::Reject);
        let mut changes = store.subscribe();

        let _ = store.add(NewItem::new("", vec![]));
        assert!(changes.try_recv().is_err());
    }

    #[test]
    fn every_mutation_notifies_with_the_full_collection() {
        let mut store = memory_store(EmptyContentPolicy::Reject);
        let mut changes = store.subscribe();

        let first = add(&mut store, "first", "");
        add(&mut store, "second", "");
        store.remove(first.id).unwrap();
        store.remove(first.id).unwrap();

        let mut seen = Vec::new();
        while let Ok(change) = changes.try_recv() {
            assert_eq!(change.key, ITEMS_KEY);
            seen.push(change.new_value.as_array().unwrap().len());
        }
        assert_eq!(seen, vec![1, 2, 1]);
    }

    #[test]
    fn initialize_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let kv = JsonFileStore::open(tmp.path()).unwrap();
        let mut store = ItemStore::new(Box::new(kv), EmptyContentPolicy::Reject);
        store.initialize().unwrap();
        add(&mut store, "one", "");
        add(&mut store, "two", "");

        assert_eq!(store.initialize().unwrap(), 2);
        assert_eq!(store.initialize().unwrap(), 2);
        assert_eq!(store.len(), 2);

        let reopened = JsonFileStore::open(tmp.path()).unwrap();
        let mut again = ItemStore::new(Box::new(reopened), EmptyContentPolicy::Reject);
        assert_eq!(again.initialize().unwrap(), 2);
        assert_eq!(again.list(), store.list());
    }

    #[test]
    fn add_before_initialize_keeps_persisted_items() {
        let mut kv = MemoryStore::new();
        let ts = now_millis();
        let old = Item::new(1, "persisted".into(), vec![], None, None, ts);
        kv.set(ITEMS_KEY, serde_json::to_value(vec![old.clone()]).unwrap())
            .unwrap();

        let mut store = ItemStore::new(Box::new(kv), EmptyContentPolicy::Reject);
        add(&mut store, "fresh", "");
        assert_eq!(store.len(), 2);
        assert_eq!(store.list()[1], old);
    }

    #[test]
    fn seed_only_applies_when_storage_is_empty() {
        let ts = now_millis();
        let restored = vec![Item::new(5, "restored".into(), vec![], None, None, ts)];

        let mut store = ItemStore::new(Box::new(MemoryStore::new()), EmptyContentPolicy::Reject);
        assert!(store.seed_if_absent(restored.clone()).unwrap());
        assert!(!store.seed_if_absent(Vec::new()).unwrap());

        store.initialize().unwrap();
        assert_eq!(store.list(), restored.as_slice());
    }

    #[test]
    fn new_ids_exceed_imported_ones() {
        let mut store = memory_store(EmptyContentPolicy::Reject);
        let far_future = now_millis().timestamp_millis() + 10_000_000;
        let ts = now_millis();
        store
            .import_items(vec![Item::new(far_future, "future".into(), vec![], None, None, ts)])
            .unwrap();

        let fresh = add(&mut store, "fresh", "");
        assert_eq!(fresh.id, far_future + 1);
    }

    #[test]
    fn add_fails_once_ids_are_exhausted() {
        let mut store = memory_store(EmptyContentPolicy::Reject);
        let ts = now_millis();
        store
            .import_items(vec![Item::new(i64::MAX, "last".into(), vec![], None, None, ts)])
            .unwrap();
        let mut changes = store.subscribe();

        let err = store.add(NewItem::new("fresh", vec![])).unwrap_err();
        assert!(matches!(err, ClipError::Validation { .. }));
        assert_eq!(ids(store.list()), vec![i64::MAX]);
        assert!(changes.try_recv().is_err());
    }

    #[test]
    fn import_replaces_everything_and_collapses_duplicates() {
        let mut store = memory_store(EmptyContentPolicy::Skip);
        add(&mut store, "will vanish", "");

        let ts = now_millis();
        let summary = store
            .import_items(vec![
                Item::new(3, "".into(), vec![], None, None, ts),
                Item::new(2, "b".into(), vec![], None, None, ts),
                Item::new(3, "dup".into(), vec![], None, None, ts),
            ])
            .unwrap();

        assert_eq!(
            summary,
            ImportSummary {
                total_items: 3,
                items_imported: 2,
                duplicates_dropped: 1,
            }
        );
        // Blank content is accepted here; import bypasses add validation.
        assert_eq!(ids(store.list()), vec![3, 2]);
    }

    #[test]
    fn attachment_is_stored_by_reference() {
        let tmp = TempDir::new().unwrap();
        let mut store = memory_store(EmptyContentPolicy::Reject)
            .with_attachments(Box::new(DirectorySink::new(tmp.path())));

        let added = store
            .add(NewItem::new("see attached", vec![]).with_attachment(Attachment {
                name: "plan.txt".into(),
                media_type: "text/plain".into(),
                bytes: b"step one".to_vec(),
            }))
            .unwrap()
            .unwrap();

        assert!(added.attachment_error.is_none());
        let doc = added.item.doc_file.clone().unwrap();
        assert_eq!(doc.name, "plan.txt");

        let path = store.open_attachment(added.item.id).unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"step one");
    }

    #[test]
    fn failed_attachment_still_creates_the_item() {
        let mut store =
            memory_store(EmptyContentPolicy::Reject).with_attachments(Box::new(BrokenSink));

        let added = store
            .add(
                NewItem::new("with doc", vec![])
                    .with_link(" https://example.com/roadmap ")
                    .with_attachment(Attachment {
                        name: "big.bin".into(),
                        ..Default::default()
                    }),
            )
            .unwrap()
            .unwrap();

        assert!(matches!(
            added.attachment_error,
            Some(ClipError::AttachmentFailed { .. })
        ));
        assert!(added.item.doc_file.is_none());
        assert_eq!(added.item.doc_link.as_deref(), Some("https://example.com/roadmap"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn tag_counts_are_sorted_and_counted() {
        let mut store = memory_store(EmptyContentPolicy::Reject);
        add(&mut store, "one", "work, urgent");
        add(&mut store, "two", "work");

        assert_eq!(
            store.tag_counts(),
            vec![("urgent".to_string(), 1), ("work".to_string(), 2)]
        );
    }

    #[test]
    fn open_attachment_reports_missing_item() {
        let store = memory_store(EmptyContentPolicy::Reject);
        assert!(matches!(
            store.open_attachment(42),
            Err(ClipError::ItemNotFound { id: 42 })
        ));
    }
}
