//! Item service RPC server.
//!
//! # Responsibilities
//! - Expose `ItemService` and the health check as RPC methods
//! - Encode failures as JSON `Status` bodies
//! - Stream `ListAllItems` as newline-delimited frames
//! - Bound concurrency and request size

use std::any::Any;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use futures_util::{future, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

use crate::config::ServiceConfig;
use crate::model::{Empty, HealthCheckResponse, ItemRequest};
use crate::rpc::{methods, Code, Status, StreamFrame, STREAM_CONTENT_TYPE};
use crate::service::ItemService;

/// HTTP status used to carry an RPC status code.
pub fn http_status(code: Code) -> StatusCode {
    match code {
        Code::NotFound => StatusCode::NOT_FOUND,
        Code::AlreadyExists => StatusCode::CONFLICT,
        Code::InvalidArgument => StatusCode::BAD_REQUEST,
        Code::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        Code::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        Code::ResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
        Code::Internal | Code::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for Status {
    fn into_response(self) -> Response {
        (http_status(self.code), Json(self)).into_response()
    }
}

/// RPC server for the item service.
pub struct RpcServer {
    router: Router,
    config: ServiceConfig,
}

impl RpcServer {
    pub fn new(service: Arc<ItemService>, config: ServiceConfig) -> Self {
        let router = Self::build_router(&config, service);
        Self { router, config }
    }

    fn build_router(config: &ServiceConfig, service: Arc<ItemService>) -> Router {
        Router::new()
            .route(methods::GET_ITEM_BY_ID, post(get_item_by_id))
            .route(methods::LIST_ALL_ITEMS, post(list_all_items))
            .route(methods::ADD_ITEM, post(add_item))
            .route(methods::HEALTH_CHECK, post(health_check))
            .with_state(service)
            .layer(DefaultBodyLimit::max(config.max_receive_message_bytes))
            .layer(CatchPanicLayer::custom(panic_status))
            .layer(GlobalConcurrencyLimitLayer::new(config.listener.max_workers))
            .layer(TraceLayer::new_for_http())
    }

    /// The router, for embedding or driving in tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until the shutdown signal fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            max_workers = self.config.listener.max_workers,
            "Item service RPC server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Item service received shutdown signal");
            })
            .await?;

        tracing::info!("Item service RPC server stopped");
        Ok(())
    }
}

/// A handler panic becomes INTERNAL so the caller never sees a reset.
fn panic_status(err: Box<dyn Any + Send + 'static>) -> Response {
    let details = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!(panic = %details, "RPC handler panicked");
    Status::internal("internal server error").into_response()
}

fn decode<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, Status> {
    match payload {
        Ok(Json(message)) => Ok(message),
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            Err(Status::resource_exhausted(rejection.body_text()))
        }
        Err(rejection) => Err(Status::invalid_argument(rejection.body_text())),
    }
}

async fn get_item_by_id(
    State(service): State<Arc<ItemService>>,
    payload: Result<Json<ItemRequest>, JsonRejection>,
) -> Response {
    let request = match decode(payload) {
        Ok(request) => request,
        Err(status) => return status.into_response(),
    };
    match service.get_item_by_id(request.id).await {
        Ok(item) => Json(item).into_response(),
        Err(status) => status.into_response(),
    }
}

async fn add_item(
    State(service): State<Arc<ItemService>>,
    payload: Result<Json<ItemRequest>, JsonRejection>,
) -> Response {
    let request = match decode(payload) {
        Ok(request) => request,
        Err(status) => return status.into_response(),
    };
    match service.add_item(request).await {
        Ok(item) => Json(item).into_response(),
        Err(status) => status.into_response(),
    }
}

async fn list_all_items(
    State(service): State<Arc<ItemService>>,
    payload: Result<Json<Empty>, JsonRejection>,
) -> Response {
    if let Err(status) = decode(payload) {
        return status.into_response();
    }

    let items = match service.list_all_items().await {
        Ok(items) => items,
        Err(status) => return status.into_response(),
    };

    let frames = items
        .scan(false, |ended, result| {
            if *ended {
                return future::ready(None);
            }
            let frame = match result {
                Ok(item) => StreamFrame::Item(item),
                Err(status) => {
                    *ended = true;
                    StreamFrame::Error(status)
                }
            };
            future::ready(Some(frame))
        })
        .map(|frame| {
            serde_json::to_vec(&frame).map(|mut line| {
                line.push(b'\n');
                line
            })
        });

    (
        [(header::CONTENT_TYPE, STREAM_CONTENT_TYPE)],
        Body::from_stream(frames),
    )
        .into_response()
}

async fn health_check(State(service): State<Arc<ItemService>>) -> Json<HealthCheckResponse> {
    Json(HealthCheckResponse {
        status: service.health_check().await,
    })
}

/// Serve `service` on an already-bound listener in the background.
///
/// Used by tests and embedders; returns once the task is spawned.
pub fn spawn(
    service: Arc<ItemService>,
    config: ServiceConfig,
    listener: TcpListener,
    shutdown: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    let server = RpcServer::new(service, config);
    tokio::spawn(async move {
        if let Err(e) = server.run(listener, shutdown).await {
            tracing::error!(error = %e, "Item service RPC server failed");
        }
    })
}
