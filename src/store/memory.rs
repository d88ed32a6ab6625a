//! In-process record store.
//!
//! Records live in an ordered map so `find_max` and ordered scans are cheap.
//! Reachability and scan faults can be injected to exercise the service's
//! error mapping.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};

use crate::model::Item;
use crate::store::{InsertOutcome, RecordStore, RecordStream, StoreError};

/// Sentinel meaning "no scan fault armed".
const NO_FAULT: usize = usize::MAX;

#[derive(Debug)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<i64, Item>>,
    reachable: AtomicBool,
    scan_fault_after: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            reachable: AtomicBool::new(true),
            scan_fault_after: AtomicUsize::new(NO_FAULT),
        }
    }

    /// Build a store pre-populated with `items`. Later duplicates are dropped.
    pub fn with_items(items: impl IntoIterator<Item = Item>) -> Self {
        let store = Self::new();
        {
            let mut records = store.records.write().unwrap_or_else(|p| p.into_inner());
            for item in items {
                records.entry(item.id).or_insert(item);
            }
        }
        store
    }

    /// Simulate the store going away (or coming back).
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Make subsequent scans fail after yielding `after` records.
    pub fn set_scan_fault(&self, after: Option<usize>) {
        self.scan_fault_after
            .store(after.unwrap_or(NO_FAULT), Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_reachable(&self) -> Result<(), StoreError> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unreachable("connection refused".to_string()))
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.check_reachable()
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Item>, StoreError> {
        self.check_reachable()?;
        let records = self.records.read().unwrap_or_else(|p| p.into_inner());
        Ok(records.get(&id).cloned())
    }

    async fn find_max(&self) -> Result<Option<Item>, StoreError> {
        self.check_reachable()?;
        let records = self.records.read().unwrap_or_else(|p| p.into_inner());
        Ok(records.values().next_back().cloned())
    }

    async fn insert_unique(&self, item: Item) -> Result<InsertOutcome, StoreError> {
        self.check_reachable()?;
        let mut records = self.records.write().unwrap_or_else(|p| p.into_inner());
        if records.contains_key(&item.id) {
            return Ok(InsertOutcome::Duplicate);
        }
        records.insert(item.id, item);
        Ok(InsertOutcome::Inserted)
    }

    async fn all(&self) -> Result<RecordStream, StoreError> {
        self.check_reachable()?;
        let snapshot: Vec<Item> = self
            .records
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .values()
            .cloned()
            .collect();

        let fault_after = self.scan_fault_after.load(Ordering::SeqCst);
        let mut items: Vec<Result<Item, StoreError>> = snapshot.into_iter().map(Ok).collect();
        if fault_after != NO_FAULT {
            items.truncate(fault_after);
            items.push(Err(StoreError::Fault("cursor lost during scan".to_string())));
        }

        Ok(stream::iter(items).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::TryStreamExt;

    #[tokio::test]
    async fn insert_unique_rejects_duplicates() {
        let store = MemoryStore::new();
        assert_eq!(
            store.insert_unique(Item::new(1, "a")).await.unwrap(),
            InsertOutcome::Inserted
        );
        assert_eq!(
            store.insert_unique(Item::new(1, "b")).await.unwrap(),
            InsertOutcome::Duplicate
        );
        assert_eq!(store.find_by_id(1).await.unwrap(), Some(Item::new(1, "a")));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn find_max_tracks_greatest_id() {
        let store = MemoryStore::new();
        assert_eq!(store.find_max().await.unwrap(), None);

        store.insert_unique(Item::new(7, "seven")).await.unwrap();
        store.insert_unique(Item::new(3, "three")).await.unwrap();
        assert_eq!(store.find_max().await.unwrap(), Some(Item::new(7, "seven")));
    }

    #[tokio::test]
    async fn scans_are_ordered_and_restartable() {
        let store = MemoryStore::with_items([Item::new(2, "b"), Item::new(1, "a")]);

        let first: Vec<Item> = store.all().await.unwrap().try_collect().await.unwrap();
        let second: Vec<Item> = store.all().await.unwrap().try_collect().await.unwrap();

        assert_eq!(first, vec![Item::new(1, "a"), Item::new(2, "b")]);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn unreachable_store_fails_every_operation() {
        let store = MemoryStore::new();
        store.set_reachable(false);

        assert!(matches!(store.ping().await, Err(StoreError::Unreachable(_))));
        assert!(matches!(store.find_by_id(1).await, Err(StoreError::Unreachable(_))));
        assert!(matches!(
            store.insert_unique(Item::new(1, "a")).await,
            Err(StoreError::Unreachable(_))
        ));
        assert!(store.all().await.is_err());

        store.set_reachable(true);
        assert!(store.ping().await.is_ok());
    }

    #[tokio::test]
    async fn scan_fault_terminates_after_partial_output() {
        let store =
            MemoryStore::with_items([Item::new(1, "a"), Item::new(2, "b"), Item::new(3, "c")]);
        store.set_scan_fault(Some(1));

        let results: Vec<Result<Item, StoreError>> = store.all().await.unwrap().collect().await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0], Ok(Item::new(1, "a")));
        assert!(matches!(results[1], Err(StoreError::Fault(_))));
    }
}
