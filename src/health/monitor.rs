//! Connection monitoring.
//!
//! # Responsibilities
//! - Periodically probe the current channel
//! - Replace the channel when a probe fails

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::config::MonitorConfig;
use crate::observability::metrics;
use crate::rpc::{probe, ChannelRef, Connector};

/// Result of one monitor tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Healthy,
    /// The probe failed and a fresh channel is now current.
    Reconnected { generation: u64 },
    /// The probe failed and no new channel could be built.
    ReconnectFailed,
}

pub struct ConnectionMonitor {
    channel: Arc<ChannelRef>,
    connector: Arc<dyn Connector>,
    config: MonitorConfig,
    probe_timeout: Duration,
}

impl ConnectionMonitor {
    pub fn new(
        channel: Arc<ChannelRef>,
        connector: Arc<dyn Connector>,
        config: MonitorConfig,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            channel,
            connector,
            config,
            probe_timeout,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Connection monitor disabled");
            return;
        }

        tracing::info!(
            interval_secs = self.config.interval_secs,
            probe_timeout_ms = self.probe_timeout.as_millis() as u64,
            "Connection monitor starting"
        );

        // First probe one full interval after startup.
        let interval = self.config.interval();
        let mut ticker = time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Connection monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Probe once and reconnect on failure.
    pub async fn check(&self) -> ProbeOutcome {
        let slot = self.channel.current();
        let status = match probe(slot.channel.as_ref(), self.probe_timeout).await {
            Ok(()) => {
                tracing::debug!(
                    peer = %slot.channel.target(),
                    generation = slot.generation,
                    "Channel probe succeeded"
                );
                return ProbeOutcome::Healthy;
            }
            Err(status) => status,
        };

        tracing::warn!(
            peer = %slot.channel.target(),
            generation = slot.generation,
            code = %status.code,
            error = %status.message,
            "Channel probe failed, reconnecting"
        );

        match self.connector.connect() {
            Ok(channel) => {
                let generation = self.channel.replace(channel);
                metrics::record_reconnect("success");
                tracing::info!(generation, "Channel replaced");
                ProbeOutcome::Reconnected { generation }
            }
            Err(e) => {
                metrics::record_reconnect("failure");
                tracing::error!(error = %e, "Failed to build replacement channel");
                ProbeOutcome::ReconnectFailed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Item, ItemRequest, ServingStatus};
    use crate::rpc::{ItemChannel, LocalChannel, LocalConnector, Status};
    use crate::service::{ItemService, ItemStream};
    use crate::store::MemoryStore;
    use async_trait::async_trait;

    /// A channel whose peer is gone.
    struct Dead;

    #[async_trait]
    impl ItemChannel for Dead {
        fn target(&self) -> &str {
            "dead"
        }

        async fn get_item_by_id(&self, _id: i64, _timeout: Duration) -> Result<Item, Status> {
            Err(Status::unavailable("connection refused"))
        }

        async fn list_all_items(&self, _timeout: Duration) -> Result<ItemStream, Status> {
            Err(Status::unavailable("connection refused"))
        }

        async fn add_item(
            &self,
            _request: ItemRequest,
            _timeout: Duration,
        ) -> Result<Item, Status> {
            Err(Status::unavailable("connection refused"))
        }

        async fn health_check(&self, _timeout: Duration) -> Result<ServingStatus, Status> {
            Err(Status::unavailable("connection refused"))
        }
    }

    struct Refusing;

    impl Connector for Refusing {
        fn connect(&self) -> Result<Arc<dyn ItemChannel>, Status> {
            Err(Status::unavailable("no route"))
        }
    }

    fn service() -> Arc<ItemService> {
        Arc::new(ItemService::new(Arc::new(MemoryStore::with_items([Item::new(1, "a")]))))
    }

    fn config(interval_secs: u64) -> MonitorConfig {
        MonitorConfig {
            enabled: true,
            interval_secs,
        }
    }

    #[tokio::test]
    async fn healthy_channel_is_kept() {
        let service = service();
        let channel = Arc::new(ChannelRef::new(Arc::new(LocalChannel::new(service.clone()))));
        let monitor = ConnectionMonitor::new(
            channel.clone(),
            Arc::new(LocalConnector::new(service)),
            config(10),
            Duration::from_secs(1),
        );

        assert_eq!(monitor.check().await, ProbeOutcome::Healthy);
        assert_eq!(channel.generation(), 0);
    }

    #[tokio::test]
    async fn dead_channel_is_replaced() {
        let service = service();
        let channel = Arc::new(ChannelRef::new(Arc::new(Dead)));
        let in_flight = channel.current();
        let monitor = ConnectionMonitor::new(
            channel.clone(),
            Arc::new(LocalConnector::new(service)),
            config(10),
            Duration::from_secs(1),
        );

        assert_eq!(monitor.check().await, ProbeOutcome::Reconnected { generation: 1 });

        let current = channel.current();
        assert_eq!(current.channel.target(), "in-process");
        assert_eq!(
            current.channel.get_item_by_id(1, Duration::from_secs(1)).await.unwrap(),
            Item::new(1, "a")
        );
        // A caller holding the old snapshot still sees the old channel.
        assert_eq!(in_flight.channel.target(), "dead");
    }

    #[tokio::test]
    async fn failed_reconnect_keeps_the_old_channel() {
        let channel = Arc::new(ChannelRef::new(Arc::new(Dead)));
        let monitor = ConnectionMonitor::new(
            channel.clone(),
            Arc::new(Refusing),
            config(10),
            Duration::from_secs(1),
        );

        assert_eq!(monitor.check().await, ProbeOutcome::ReconnectFailed);
        assert_eq!(channel.generation(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn run_probes_on_interval_and_stops_on_shutdown() {
        let service = service();
        let channel = Arc::new(ChannelRef::new(Arc::new(Dead)));
        let monitor = ConnectionMonitor::new(
            channel.clone(),
            Arc::new(LocalConnector::new(service)),
            config(10),
            Duration::from_secs(1),
        );
        let (tx, rx) = broadcast::channel(1);
        let task = tokio::spawn(monitor.run(rx));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(channel.generation(), 0);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(channel.generation(), 1);

        tx.send(()).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn disabled_monitor_returns_immediately() {
        let channel = Arc::new(ChannelRef::new(Arc::new(Dead)));
        let monitor = ConnectionMonitor::new(
            channel,
            Arc::new(Refusing),
            MonitorConfig {
                enabled: false,
                interval_secs: 10,
            },
            Duration::from_secs(1),
        );
        let (_tx, rx) = broadcast::channel(1);
        monitor.run(rx).await;
    }
}
