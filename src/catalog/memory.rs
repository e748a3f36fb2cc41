//! In-memory catalog.
//!
//! No persistence. Useful for tests and for embedding where the caller
//! owns durability. Uses `RwLock<HashMap>` for thread-safe access.

use std::collections::HashMap;
use std::sync::RwLock;

use super::{BlobRecord, CatalogConflict, CatalogFuture, MetadataCatalog};

enum Entry {
    Claimed,
    Recorded(BlobRecord),
}

#[derive(Default)]
pub struct MemoryCatalog {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of claimed or recorded ids.
    pub fn len(&self) -> usize {
        self.entries.read().expect("rwlock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MetadataCatalog for MemoryCatalog {
    fn exists(&self, id: &str) -> CatalogFuture<'_, bool> {
        let id = id.to_string();
        Box::pin(async move {
            let entries = self.entries.read().expect("rwlock poisoned");
            Ok(entries.contains_key(&id))
        })
    }

    fn claim(&self, id: &str) -> CatalogFuture<'_, ()> {
        let id = id.to_string();
        Box::pin(async move {
            let mut entries = self.entries.write().expect("rwlock poisoned");
            if entries.contains_key(&id) {
                return Err(CatalogConflict { id }.into());
            }
            entries.insert(id, Entry::Claimed);
            Ok(())
        })
    }

    fn record(&self, record: BlobRecord) -> CatalogFuture<'_, ()> {
        Box::pin(async move {
            // Check and insert under one write lock.
            let mut entries = self.entries.write().expect("rwlock poisoned");
            if let Some(Entry::Recorded(_)) = entries.get(&record.id) {
                return Err(CatalogConflict { id: record.id }.into());
            }
            entries.insert(record.id.clone(), Entry::Recorded(record));
            Ok(())
        })
    }

    fn release(&self, id: &str) -> CatalogFuture<'_, ()> {
        let id = id.to_string();
        Box::pin(async move {
            let mut entries = self.entries.write().expect("rwlock poisoned");
            if let Some(Entry::Claimed) = entries.get(&id) {
                entries.remove(&id);
            }
            Ok(())
        })
    }

    fn lookup(&self, id: &str) -> CatalogFuture<'_, Option<BlobRecord>> {
        let id = id.to_string();
        Box::pin(async move {
            let entries = self.entries.read().expect("rwlock poisoned");
            Ok(match entries.get(&id) {
                Some(Entry::Recorded(record)) => Some(record.clone()),
                _ => None,
            })
        })
    }
}
