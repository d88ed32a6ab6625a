//! Guarded item operations.
//!
//! Every operation snapshots the current channel, runs the call through the
//! circuit breaker, and wraps that in the retry policy:
//!
//! ```text
//! execute(retry) → breaker.call → channel snapshot → RPC with deadline
//! ```

use std::future::Future;
use std::sync::Arc;

use futures_util::TryStreamExt;

use crate::config::RpcConfig;
use crate::error::{Error, Result};
use crate::model::{Item, ItemRequest};
use crate::observability::metrics;
use crate::resilience::{execute, CircuitBreaker, RetryOn, RetryPolicy};
use crate::rpc::{methods, ChannelRef, ItemChannel, Status};

pub struct ItemGateway {
    channel: Arc<ChannelRef>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
    rpc: RpcConfig,
}

impl ItemGateway {
    pub fn new(
        channel: Arc<ChannelRef>,
        breaker: Arc<CircuitBreaker>,
        retry: RetryPolicy,
        rpc: RpcConfig,
    ) -> Self {
        Self {
            channel,
            breaker,
            retry,
            rpc,
        }
    }

    pub async fn get_item(&self, id: i64) -> Result<Item> {
        let this = self;
        let timeout = self.rpc.get_timeout();
        execute(&self.retry, "get_item", RetryOn::Transport, || async move {
            this.guarded(methods::GET_ITEM_BY_ID, move |channel| async move {
                channel.get_item_by_id(id, timeout).await
            })
            .await
        })
        .await
    }

    /// All items. The stream is drained inside the breaker call, so a
    /// mid-stream failure counts against the breaker like any other.
    pub async fn list_items(&self) -> Result<Vec<Item>> {
        let this = self;
        let timeout = self.rpc.list_timeout();
        execute(&self.retry, "list_items", RetryOn::Transport, || async move {
            this.guarded(methods::LIST_ALL_ITEMS, move |channel| async move {
                match channel.list_all_items(timeout).await {
                    Ok(stream) => stream.try_collect().await,
                    Err(status) => Err(status),
                }
            })
            .await
        })
        .await
    }

    /// Create an item. `id` of `None` or `<= 0` lets the service allocate.
    pub async fn create_item(&self, name: String, id: Option<i64>) -> Result<Item> {
        if name.trim().is_empty() {
            return Err(Error::InvalidArgument("name must not be empty".to_string()));
        }

        let this = self;
        let timeout = self.rpc.add_timeout();
        let request = &ItemRequest::new(id.unwrap_or(0), name);
        execute(&self.retry, "create_item", RetryOn::Unreachable, || async move {
            let request = request.clone();
            this.guarded(methods::ADD_ITEM, move |channel| async move {
                channel.add_item(request, timeout).await
            })
            .await
        })
        .await
    }

    pub fn reset_breaker(&self) {
        self.breaker.reset();
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn channel(&self) -> &Arc<ChannelRef> {
        &self.channel
    }

    pub fn rpc_config(&self) -> &RpcConfig {
        &self.rpc
    }

    async fn guarded<T, F, Fut>(&self, method: &'static str, call: F) -> Result<T>
    where
        F: FnOnce(Arc<dyn ItemChannel>) -> Fut,
        Fut: Future<Output = std::result::Result<T, Status>>,
    {
        let channel = self.channel.current().channel.clone();
        let result = self.breaker.call(move || call(channel)).await;
        let outcome = match &result {
            Ok(_) => "OK",
            Err(e) => e.code(),
        };
        metrics::record_rpc_call(method, outcome);
        result
    }
}
