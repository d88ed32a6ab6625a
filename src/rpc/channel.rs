//! Channel abstraction, connectors and the swappable channel reference.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use futures_util::TryStreamExt;

use crate::model::{Item, ItemRequest, ServingStatus};
use crate::rpc::Status;
use crate::service::ItemStream;

/// A connection to the item service.
///
/// Every call carries its own deadline; elapsed deadlines surface as
/// DEADLINE_EXCEEDED and unreachable peers as UNAVAILABLE.
#[async_trait]
pub trait ItemChannel: Send + Sync {
    /// Human-readable peer address.
    fn target(&self) -> &str;

    async fn get_item_by_id(&self, id: i64, timeout: Duration) -> Result<Item, Status>;

    /// Server-streaming list. `timeout` bounds the whole stream.
    async fn list_all_items(&self, timeout: Duration) -> Result<ItemStream, Status>;

    async fn add_item(&self, request: ItemRequest, timeout: Duration) -> Result<Item, Status>;

    async fn health_check(&self, timeout: Duration) -> Result<ServingStatus, Status>;
}

/// Builds fresh channels with a fixed configuration.
pub trait Connector: Send + Sync {
    fn connect(&self) -> Result<Arc<dyn ItemChannel>, Status>;
}

/// One binding of the channel reference.
pub struct ChannelSlot {
    pub channel: Arc<dyn ItemChannel>,
    /// Increments on every replacement.
    pub generation: u64,
}

impl fmt::Debug for ChannelSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelSlot")
            .field("target", &self.channel.target())
            .field("generation", &self.generation)
            .finish()
    }
}

/// The current channel, shared between request handlers and the monitor.
///
/// Callers take a snapshot per call; a replacement never affects a call
/// that already holds its snapshot.
pub struct ChannelRef {
    current: ArcSwap<ChannelSlot>,
}

impl ChannelRef {
    pub fn new(channel: Arc<dyn ItemChannel>) -> Self {
        Self {
            current: ArcSwap::from_pointee(ChannelSlot {
                channel,
                generation: 0,
            }),
        }
    }

    /// Snapshot of the current binding.
    pub fn current(&self) -> Arc<ChannelSlot> {
        self.current.load_full()
    }

    pub fn generation(&self) -> u64 {
        self.current.load().generation
    }

    /// Atomically bind a new channel. Returns the new generation.
    pub fn replace(&self, channel: Arc<dyn ItemChannel>) -> u64 {
        let previous = self.current.rcu(|old| ChannelSlot {
            channel: channel.clone(),
            generation: old.generation + 1,
        });
        previous.generation + 1
    }
}

impl fmt::Debug for ChannelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelRef")
            .field("current", &*self.current.load())
            .finish()
    }
}

/// Cheap liveness probe: a full list pass bounded by `timeout`.
///
/// NOT_FOUND counts as reachable; the peer answered.
pub async fn probe(channel: &dyn ItemChannel, timeout: Duration) -> Result<(), Status> {
    let pass = async {
        let stream = channel.list_all_items(timeout).await?;
        stream.try_for_each(|_| futures_util::future::ready(Ok(()))).await?;
        Ok::<(), Status>(())
    };

    match tokio::time::timeout(timeout, pass).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(status)) if status.code == crate::rpc::Code::NotFound => Ok(()),
        Ok(Err(status)) => Err(status),
        Err(_) => Err(Status::deadline_exceeded("probe deadline exceeded")),
    }
}
