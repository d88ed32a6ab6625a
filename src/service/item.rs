//! CRUD operations over the record store.

use std::sync::Arc;
use std::time::Instant;

use futures_util::stream::{BoxStream, StreamExt};
use tokio::sync::Mutex;

use crate::model::{Item, ItemRequest, ServingStatus};
use crate::observability::metrics;
use crate::rpc::Status;
use crate::store::{InsertOutcome, RecordStore, StoreError};

/// Stream of items produced by `ListAllItems`. An `Err` is always last.
pub type ItemStream = BoxStream<'static, Result<Item, Status>>;

/// Attempts at allocating a fresh id before giving up. Only explicit-id
/// inserts racing onto `max + 1` can force a second round.
const MAX_ALLOCATION_ROUNDS: usize = 3;

pub struct ItemService {
    store: Option<Arc<dyn RecordStore>>,
    allocation: Mutex<()>,
}

impl ItemService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store: Some(store),
            allocation: Mutex::new(()),
        }
    }

    /// A service whose store could not be configured.
    pub fn without_store() -> Self {
        Self {
            store: None,
            allocation: Mutex::new(()),
        }
    }

    fn store(&self) -> Result<&Arc<dyn RecordStore>, Status> {
        self.store
            .as_ref()
            .ok_or_else(|| Status::unavailable("Database unavailable"))
    }

    pub async fn get_item_by_id(&self, id: i64) -> Result<Item, Status> {
        let start = Instant::now();
        let result = self.find(id).await;
        metrics::record_service_call("GetItemById", status_label(&result), start);
        result
    }

    /// Start a lazy pass over all items.
    ///
    /// Reachability is checked before the stream is handed out; faults
    /// during the scan surface as a final INTERNAL element.
    pub async fn list_all_items(&self) -> Result<ItemStream, Status> {
        let start = Instant::now();
        let result = self.scan().await;
        metrics::record_service_call("ListAllItems", status_label(&result), start);
        result
    }

    pub async fn add_item(&self, request: ItemRequest) -> Result<Item, Status> {
        let start = Instant::now();
        let result = self.insert(request).await;
        metrics::record_service_call("AddItem", status_label(&result), start);
        result
    }

    async fn find(&self, id: i64) -> Result<Item, Status> {
        let store = self.store()?;
        match store.find_by_id(id).await {
            Ok(Some(item)) => Ok(item),
            Ok(None) => Err(Status::not_found("Item not found")),
            Err(e) => Err(store_status("retrieving item", &e)),
        }
    }

    async fn scan(&self) -> Result<ItemStream, Status> {
        let store = self.store()?;
        let records = store
            .all()
            .await
            .map_err(|e| store_status("listing items", &e))?;
        Ok(records
            .map(|record| record.map_err(|e| store_status("listing items", &e)))
            .boxed())
    }

    async fn insert(&self, request: ItemRequest) -> Result<Item, Status> {
        let store = self.store()?;

        if request.id > 0 {
            let existing = store
                .find_by_id(request.id)
                .await
                .map_err(|e| store_status("creating item", &e))?;
            if existing.is_some() {
                return Err(Status::already_exists("Item exists"));
            }
            let item = Item::new(request.id, request.name);
            return match store.insert_unique(item.clone()).await {
                Ok(InsertOutcome::Inserted) => Ok(item),
                Ok(InsertOutcome::Duplicate) => Err(Status::already_exists("Item exists")),
                Err(e) => Err(store_status("creating item", &e)),
            };
        }

        let _allocation = self.allocation.lock().await;
        for _ in 0..MAX_ALLOCATION_ROUNDS {
            let last = store
                .find_max()
                .await
                .map_err(|e| store_status("allocating id", &e))?;
            let next_id = match last {
                None => 1,
                Some(last) => last.id.checked_add(1).ok_or_else(|| {
                    tracing::error!(last_id = last.id, "Item id space exhausted");
                    Status::resource_exhausted("Could not allocate item id")
                })?,
            };

            let item = Item::new(next_id, request.name.clone());
            match store.insert_unique(item.clone()).await {
                Ok(InsertOutcome::Inserted) => {
                    tracing::debug!(id = next_id, "Allocated item id");
                    return Ok(item);
                }
                Ok(InsertOutcome::Duplicate) => {
                    tracing::warn!(
                        id = next_id,
                        "Allocated id taken by a concurrent insert, retrying"
                    );
                }
                Err(e) => return Err(store_status("creating item", &e)),
            }
        }
        Err(Status::internal("Could not allocate item id"))
    }

    /// Liveness of the backing store.
    pub async fn health_check(&self) -> ServingStatus {
        let Some(store) = self.store.as_ref() else {
            return ServingStatus::NotServing;
        };
        match store.ping().await {
            Ok(()) => ServingStatus::Serving,
            Err(e) => {
                tracing::warn!(error = %e, "Store liveness probe failed");
                ServingStatus::NotServing
            }
        }
    }
}

fn store_status(context: &str, error: &StoreError) -> Status {
    match error {
        StoreError::Unreachable(_) => {
            tracing::error!(error = %error, "Store unreachable while {}", context);
            Status::unavailable("Database unavailable")
        }
        StoreError::Fault(_) => {
            tracing::error!(error = %error, "Store error while {}", context);
            Status::internal("Database error")
        }
    }
}

fn status_label<T>(result: &Result<T, Status>) -> &'static str {
    match result {
        Ok(_) => "OK",
        Err(status) => status.code.as_str(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::Code;
    use crate::store::MemoryStore;
    use futures_util::TryStreamExt;
    use std::collections::HashSet;

    fn service() -> (Arc<MemoryStore>, ItemService) {
        let store = Arc::new(MemoryStore::new());
        let service = ItemService::new(store.clone());
        (store, service)
    }

    #[tokio::test]
    async fn auto_allocated_ids_then_list() {
        let (_, service) = service();

        let a = service.add_item(ItemRequest::new(0, "a")).await.unwrap();
        let b = service.add_item(ItemRequest::new(0, "b")).await.unwrap();
        assert_eq!(a, Item::new(1, "a"));
        assert_eq!(b, Item::new(2, "b"));

        let items: Vec<Item> = service.list_all_items().await.unwrap().try_collect().await.unwrap();
        assert_eq!(items, vec![Item::new(1, "a"), Item::new(2, "b")]);
    }

    #[tokio::test]
    async fn negative_id_is_auto_allocated() {
        let (_, service) = service();
        service.add_item(ItemRequest::new(41, "x")).await.unwrap();

        let item = service.add_item(ItemRequest::new(-5, "y")).await.unwrap();
        assert_eq!(item, Item::new(42, "y"));
    }

    #[tokio::test]
    async fn explicit_existing_id_is_rejected_without_mutation() {
        let (store, service) = service();
        service.add_item(ItemRequest::new(5, "original")).await.unwrap();

        let err = service.add_item(ItemRequest::new(5, "other")).await.unwrap_err();
        assert_eq!(err.code, Code::AlreadyExists);
        assert_eq!(store.len(), 1);
        assert_eq!(
            service.get_item_by_id(5).await.unwrap(),
            Item::new(5, "original")
        );
    }

    #[tokio::test]
    async fn allocation_after_max_id_fails_cleanly() {
        let (store, service) = service();
        service.add_item(ItemRequest::new(i64::MAX, "max")).await.unwrap();

        let err = service.add_item(ItemRequest::new(0, "next")).await.unwrap_err();
        assert_eq!(err.code, Code::ResourceExhausted);
        assert_eq!(store.len(), 1);

        // Explicit ids below the maximum still work.
        assert_eq!(
            service.add_item(ItemRequest::new(7, "seven")).await.unwrap(),
            Item::new(7, "seven")
        );
    }

    #[tokio::test]
    async fn get_missing_item_is_not_found() {
        let (_, service) = service();
        let err = service.get_item_by_id(99).await.unwrap_err();
        assert_eq!(err.code, Code::NotFound);
    }

    #[tokio::test]
    async fn concurrent_allocation_never_repeats_an_id() {
        let (store, service) = service();
        let service = Arc::new(service);

        let mut handles = Vec::new();
        for i in 0..64 {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                service
                    .add_item(ItemRequest::new(0, format!("item-{i}")))
                    .await
                    .unwrap()
                    .id
            }));
        }

        let mut ids = HashSet::new();
        for handle in handles {
            assert!(ids.insert(handle.await.unwrap()));
        }
        assert_eq!(ids.len(), 64);
        assert_eq!(ids, (1..=64).collect::<HashSet<i64>>());
        assert_eq!(store.len(), 64);
    }

    #[tokio::test]
    async fn unreachable_store_maps_to_unavailable() {
        let (store, service) = service();
        store.set_reachable(false);

        assert_eq!(service.get_item_by_id(1).await.unwrap_err().code, Code::Unavailable);
        assert_eq!(
            service.add_item(ItemRequest::new(0, "a")).await.unwrap_err().code,
            Code::Unavailable
        );
        match service.list_all_items().await {
            Err(status) => assert_eq!(status.code, Code::Unavailable),
            Ok(_) => panic!("list should fail before producing a stream"),
        }
        assert_eq!(service.health_check().await, ServingStatus::NotServing);
    }

    #[tokio::test]
    async fn scan_fault_ends_stream_with_internal() {
        let store = Arc::new(MemoryStore::with_items([Item::new(1, "a"), Item::new(2, "b")]));
        store.set_scan_fault(Some(1));
        let service = ItemService::new(store);

        let results: Vec<Result<Item, Status>> =
            service.list_all_items().await.unwrap().collect().await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0], Ok(Item::new(1, "a")));
        assert_eq!(results[1].as_ref().unwrap_err().code, Code::Internal);
    }

    #[tokio::test]
    async fn missing_store_is_not_serving() {
        let service = ItemService::without_store();
        assert_eq!(service.health_check().await, ServingStatus::NotServing);
        assert_eq!(service.get_item_by_id(1).await.unwrap_err().code, Code::Unavailable);
    }

    #[tokio::test]
    async fn reachable_store_is_serving() {
        let (_, service) = service();
        assert_eq!(service.health_check().await, ServingStatus::Serving);
    }
}
