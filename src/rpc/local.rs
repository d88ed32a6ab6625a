//! In-process channel calling an `ItemService` directly.
//!
//! Deadlines are enforced the same way as on the network channel, so the
//! resilience layer behaves identically on top of either.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::model::{Item, ItemRequest, ServingStatus};
use crate::resilience::timeouts::{deadline_stream, with_deadline};
use crate::rpc::channel::{Connector, ItemChannel};
use crate::rpc::Status;
use crate::service::{ItemService, ItemStream};

pub struct LocalChannel {
    service: Arc<ItemService>,
}

impl LocalChannel {
    pub fn new(service: Arc<ItemService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl ItemChannel for LocalChannel {
    fn target(&self) -> &str {
        "in-process"
    }

    async fn get_item_by_id(&self, id: i64, timeout: Duration) -> Result<Item, Status> {
        with_deadline(timeout, self.service.get_item_by_id(id)).await?
    }

    async fn list_all_items(&self, timeout: Duration) -> Result<ItemStream, Status> {
        let deadline = tokio::time::Instant::now() + timeout;
        let stream = with_deadline(timeout, self.service.list_all_items()).await??;
        Ok(deadline_stream(stream, deadline))
    }

    async fn add_item(&self, request: ItemRequest, timeout: Duration) -> Result<Item, Status> {
        with_deadline(timeout, self.service.add_item(request)).await?
    }

    async fn health_check(&self, timeout: Duration) -> Result<ServingStatus, Status> {
        with_deadline(timeout, self.service.health_check()).await
    }
}

/// Connects `LocalChannel`s to a shared service.
pub struct LocalConnector {
    service: Arc<ItemService>,
}

impl LocalConnector {
    pub fn new(service: Arc<ItemService>) -> Self {
        Self { service }
    }
}

impl Connector for LocalConnector {
    fn connect(&self) -> Result<Arc<dyn ItemChannel>, Status> {
        Ok(Arc::new(LocalChannel::new(self.service.clone())))
    }
}
