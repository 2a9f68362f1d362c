//! In-memory photo catalog
//!
//! Listings come back newest first. Records are kept in insertion order
//! under a sequence number, so two uploads in the same millisecond still
//! list deterministically.

use crate::types::{PhotoId, PhotoRecord, StoredArtifact, UserId};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

/// Largest page a listing may request
pub const MAX_PAGE_SIZE: usize = 100;

/// A validated page request (1-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    number: usize,
    size: usize,
}

impl Page {
    /// `None` unless `number >= 1` and `1 <= size <= 100`
    #[must_use]
    pub fn new(number: usize, size: usize) -> Option<Self> {
        (number >= 1 && (1..=MAX_PAGE_SIZE).contains(&size)).then_some(Self { number, size })
    }

    fn offset(self) -> usize {
        (self.number - 1).saturating_mul(self.size)
    }
}

#[derive(Debug, Default)]
struct Inner {
    next_seq: u64,
    records: HashMap<PhotoId, (u64, PhotoRecord)>,
    order: BTreeMap<u64, PhotoId>,
}

impl Inner {
    fn newest_first(&self) -> impl Iterator<Item = &PhotoRecord> {
        self.order
            .values()
            .rev()
            .filter_map(|id| self.records.get(id).map(|(_, r)| r))
    }
}

#[derive(Debug, Default)]
pub struct PhotoCatalog {
    inner: RwLock<Inner>,
}

impl PhotoCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: PhotoRecord) {
        let mut inner = self.inner.write();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.order.insert(seq, record.id);
        if let Some((old_seq, _)) = inner.records.insert(record.id, (seq, record)) {
            inner.order.remove(&old_seq);
        }
    }

    #[must_use]
    pub fn get(&self, id: PhotoId) -> Option<PhotoRecord> {
        self.inner.read().records.get(&id).map(|(_, r)| r.clone())
    }

    /// Edit a record in place; returns the updated copy
    pub fn update<F>(&self, id: PhotoId, edit: F) -> Option<PhotoRecord>
    where
        F: FnOnce(&mut PhotoRecord),
    {
        let mut inner = self.inner.write();
        let (_, record) = inner.records.get_mut(&id)?;
        edit(record);
        Some(record.clone())
    }

    pub fn remove(&self, id: PhotoId) -> Option<PhotoRecord> {
        let mut inner = self.inner.write();
        let (seq, record) = inner.records.remove(&id)?;
        inner.order.remove(&seq);
        Some(record)
    }

    /// All photos, newest first, optionally narrowed to one category
    #[must_use]
    pub fn list(&self, page: Page, category: Option<&str>) -> Vec<PhotoRecord> {
        let inner = self.inner.read();
        inner
            .newest_first()
            .filter(|r| category.map_or(true, |c| r.category.eq_ignore_ascii_case(c)))
            .skip(page.offset())
            .take(page.size)
            .cloned()
            .collect()
    }

    /// One owner's photos, newest first
    #[must_use]
    pub fn list_by_owner(&self, owner: UserId, page: Page) -> Vec<PhotoRecord> {
        let inner = self.inner.read();
        inner
            .newest_first()
            .filter(|r| r.owner == owner)
            .skip(page.offset())
            .take(page.size)
            .cloned()
            .collect()
    }

    /// The stored artifact behind a blob key, with the photo it belongs to
    #[must_use]
    pub fn artifact_by_key(&self, key: &str) -> Option<(PhotoId, StoredArtifact)> {
        let inner = self.inner.read();
        inner.records.values().find_map(|(_, record)| {
            record
                .artifacts()
                .find(|a| a.key == key)
                .map(|a| (record.id, a.clone()))
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
