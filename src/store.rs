//! The collection of imported records
//!
//! [`Store`] is the seam between the importer/search engine and whatever holds
//! the authoritative collection. [`InMemoryStore`] keeps insertion order
//! behind a `RwLock`; every operation is atomic with respect to the others.

use std::sync::{PoisonError, RwLock};

use crate::error::{StoreError, StoreResult};
use crate::model::Record;

/// Authoritative collection of records, keyed by `Record::id`
pub trait Store: Send + Sync {
    /// Add a record; fails with `Conflict` when its id is already present
    fn append(&self, record: Record) -> StoreResult<()>;

    /// Point-in-time copy of every record, in insertion order
    fn list(&self) -> StoreResult<Vec<Record>>;

    fn find_by_id(&self, id: i64) -> StoreResult<Record>;

    /// Replace the record stored under `id`, keeping its position
    fn replace(&self, id: i64, record: Record) -> StoreResult<()>;

    fn remove(&self, id: i64) -> StoreResult<()>;

    fn len(&self) -> StoreResult<usize> {
        Ok(self.list()?.len())
    }

    fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    items: RwLock<Vec<Record>>,
}

fn poisoned<T>(_: PoisonError<T>) -> StoreError {
    StoreError::Poisoned
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for InMemoryStore {
    fn append(&self, record: Record) -> StoreResult<()> {
        let mut items = self.items.write().map_err(poisoned)?;
        if items.iter().any(|item| item.id == record.id) {
            return Err(StoreError::Conflict { id: record.id });
        }
        items.push(record);
        Ok(())
    }

    fn list(&self) -> StoreResult<Vec<Record>> {
        Ok(self.items.read().map_err(poisoned)?.clone())
    }

    fn find_by_id(&self, id: i64) -> StoreResult<Record> {
        self.items
            .read()
            .map_err(poisoned)?
            .iter()
            .find(|item| item.id == id)
            .cloned()
            .ok_or(StoreError::NotFound { id })
    }

    fn replace(&self, id: i64, record: Record) -> StoreResult<()> {
        let mut items = self.items.write().map_err(poisoned)?;
        let index = items
            .iter()
            .position(|item| item.id == id)
            .ok_or(StoreError::NotFound { id })?;

        // A replacement may carry a new id, but not one held by another entry.
        if record.id != id && items.iter().any(|item| item.id == record.id) {
            return Err(StoreError::Conflict { id: record.id });
        }
        items[index] = record;
        Ok(())
    }

    fn remove(&self, id: i64) -> StoreResult<()> {
        let mut items = self.items.write().map_err(poisoned)?;
        let index = items
            .iter()
            .position(|item| item.id == id)
            .ok_or(StoreError::NotFound { id })?;
        items.remove(index);
        Ok(())
    }

    fn len(&self) -> StoreResult<usize> {
        Ok(self.items.read().map_err(poisoned)?.len())
    }
}
