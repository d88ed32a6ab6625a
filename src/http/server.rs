//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the guarded gateway from configuration
//! - Create the Axum router with all handlers
//! - Wire up middleware (request ID, tracing, limits, timeout, panics, metrics)
//! - Verify the backend once at startup and run the connection monitor
//! - Serve until shutdown

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    error_handling::HandleErrorLayer,
    extract::{MatchedPath, Request},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::{limit::GlobalConcurrencyLimitLayer, ServiceBuilder};
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::{BackendConfig, GatewayConfig};
use crate::gateway::ItemGateway;
use crate::health::ConnectionMonitor;
use crate::http::handlers;
use crate::http::request::MakeRequestUuid;
use crate::http::response::{panic_response, timeout_response};
use crate::observability::metrics;
use crate::resilience::{CircuitBreaker, RetryPolicy};
use crate::rpc::{probe, ChannelRef, Connector, HttpConnector, Status};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<ItemGateway>,
    pub backend: BackendConfig,
}

/// The gateway's REST server.
pub struct HttpServer {
    router: Router,
    config: GatewayConfig,
    gateway: Arc<ItemGateway>,
    connector: Arc<dyn Connector>,
}

impl HttpServer {
    /// Create a server talking to the configured backend over HTTP.
    pub fn new(config: GatewayConfig) -> Result<Self, Status> {
        let connector = Arc::new(HttpConnector::new(config.backend.target(), config.rpc.clone()));
        Self::with_connector(config, connector)
    }

    /// Create a server whose channels come from `connector`.
    pub fn with_connector(
        config: GatewayConfig,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, Status> {
        let channel = Arc::new(ChannelRef::new(connector.connect()?));
        let breaker = Arc::new(CircuitBreaker::new(config.backend.target(), &config.breaker));
        let gateway = Arc::new(ItemGateway::new(
            channel,
            breaker,
            RetryPolicy::new(&config.retry),
            config.rpc.clone(),
        ));

        let state = AppState {
            gateway: gateway.clone(),
            backend: config.backend.clone(),
        };
        let router = Self::build_router(&config, state);

        Ok(Self {
            router,
            config,
            gateway,
            connector,
        })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        Router::new()
            .route("/items", post(handlers::create_item).get(handlers::list_items))
            .route("/items/{id}", get(handlers::get_item))
            .route("/health", get(handlers::health))
            .route("/reset-breaker", post(handlers::reset_breaker))
            .route_layer(middleware::from_fn(track_metrics))
            .with_state(state)
            .layer(CatchPanicLayer::custom(panic_response))
            .layer(
                ServiceBuilder::new()
                    .layer(HandleErrorLayer::new(timeout_response))
                    .timeout(Duration::from_secs(config.timeouts.request_secs)),
            )
            .layer(GlobalConcurrencyLimitLayer::new(config.listener.max_concurrent_requests))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The router, for embedding or driving in tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn gateway(&self) -> &Arc<ItemGateway> {
        &self.gateway
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            backend = %self.config.backend.target(),
            "HTTP server starting"
        );

        self.verify_backend().await;

        let monitor = ConnectionMonitor::new(
            self.gateway.channel().clone(),
            self.connector.clone(),
            self.config.monitor.clone(),
            self.config.rpc.probe_timeout(),
        );
        let monitor_shutdown = shutdown.resubscribe();
        let monitor_task = tokio::spawn(monitor.run(monitor_shutdown));

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server received shutdown signal");
            })
            .await?;

        if let Err(e) = monitor_task.await {
            tracing::error!(error = %e, "Connection monitor task failed");
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// One probe at startup; an unreachable backend is logged, not fatal.
    async fn verify_backend(&self) {
        let slot = self.gateway.channel().current();
        match probe(slot.channel.as_ref(), self.config.rpc.probe_timeout()).await {
            Ok(()) => tracing::info!(
                backend = %slot.channel.target(),
                "Backend connection verified"
            ),
            Err(status) => tracing::error!(
                backend = %slot.channel.target(),
                code = %status.code,
                error = %status.message,
                "Backend unreachable at startup"
            ),
        }
    }
}

async fn track_metrics(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let response = next.run(request).await;
    metrics::record_http_request(&route, response.status().as_u16(), start);
    response
}
