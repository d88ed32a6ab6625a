//! Network channel: JSON over HTTP via `reqwest`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, Stream, StreamExt};
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use crate::config::RpcConfig;
use crate::model::{Empty, HealthCheckResponse, Item, ItemRequest, ServingStatus};
use crate::rpc::channel::{Connector, ItemChannel};
use crate::rpc::{methods, Code, Status, StreamFrame};
use crate::service::ItemStream;

/// A lazily connected channel to a remote item service.
#[derive(Debug, Clone)]
pub struct HttpChannel {
    client: reqwest::Client,
    base: Url,
    target: String,
    max_send_message_bytes: usize,
    max_receive_message_bytes: usize,
}

impl HttpChannel {
    /// Build a channel to `target` (`host:port`). No connection is made yet.
    pub fn connect(target: &str, config: &RpcConfig) -> Result<Self, Status> {
        let base = Url::parse(&format!("http://{}", target))
            .map_err(|e| Status::invalid_argument(format!("invalid target '{}': {}", target, e)))?;

        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .tcp_keepalive(config.keepalive())
            .pool_idle_timeout(config.keepalive())
            .no_proxy()
            .build()
            .map_err(|e| Status::internal(format!("failed to build channel: {}", e)))?;

        Ok(Self {
            client,
            base,
            target: target.to_string(),
            max_send_message_bytes: config.max_send_message_bytes,
            max_receive_message_bytes: config.max_receive_message_bytes,
        })
    }

    async fn send<Req: Serialize>(
        &self,
        method: &str,
        request: &Req,
        timeout: Duration,
    ) -> Result<reqwest::Response, Status> {
        let body = serde_json::to_vec(request)
            .map_err(|e| Status::internal(format!("failed to encode request: {}", e)))?;
        if body.len() > self.max_send_message_bytes {
            return Err(Status::resource_exhausted(format!(
                "request of {} bytes exceeds send limit of {}",
                body.len(),
                self.max_send_message_bytes
            )));
        }

        let url = self
            .base
            .join(method)
            .map_err(|e| Status::internal(format!("invalid method path '{}': {}", method, e)))?;

        let response = self
            .client
            .post(url)
            .timeout(timeout)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| transport_status(&e))?;

        self.check_length(response.content_length())?;

        if response.status().is_success() {
            return Ok(response);
        }

        let http_status = response.status();
        let bytes = response.bytes().await.map_err(|e| transport_status(&e))?;
        Err(decode_status(http_status, &bytes))
    }

    async fn unary<Req, Resp>(
        &self,
        method: &str,
        request: &Req,
        timeout: Duration,
    ) -> Result<Resp, Status>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let response = self.send(method, request, timeout).await?;
        let bytes = response.bytes().await.map_err(|e| transport_status(&e))?;
        self.check_length(Some(bytes.len() as u64))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| Status::internal(format!("malformed response from {}: {}", method, e)))
    }

    fn check_length(&self, length: Option<u64>) -> Result<(), Status> {
        match length {
            Some(len) if len > self.max_receive_message_bytes as u64 => {
                Err(Status::resource_exhausted(format!(
                    "response of {} bytes exceeds receive limit of {}",
                    len, self.max_receive_message_bytes
                )))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl ItemChannel for HttpChannel {
    fn target(&self) -> &str {
        &self.target
    }

    async fn get_item_by_id(&self, id: i64, timeout: Duration) -> Result<Item, Status> {
        self.unary(methods::GET_ITEM_BY_ID, &ItemRequest::by_id(id), timeout)
            .await
    }

    async fn list_all_items(&self, timeout: Duration) -> Result<ItemStream, Status> {
        let response = self.send(methods::LIST_ALL_ITEMS, &Empty {}, timeout).await?;
        Ok(decode_frames(
            Box::pin(response.bytes_stream()),
            self.max_receive_message_bytes,
        ))
    }

    async fn add_item(&self, request: ItemRequest, timeout: Duration) -> Result<Item, Status> {
        self.unary(methods::ADD_ITEM, &request, timeout).await
    }

    async fn health_check(&self, timeout: Duration) -> Result<ServingStatus, Status> {
        let response: HealthCheckResponse =
            self.unary(methods::HEALTH_CHECK, &Empty {}, timeout).await?;
        Ok(response.status)
    }
}

/// Builds `HttpChannel`s with a fixed target and configuration.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    target: String,
    config: RpcConfig,
}

impl HttpConnector {
    pub fn new(target: impl Into<String>, config: RpcConfig) -> Self {
        Self {
            target: target.into(),
            config,
        }
    }
}

impl Connector for HttpConnector {
    fn connect(&self) -> Result<Arc<dyn ItemChannel>, Status> {
        Ok(Arc::new(HttpChannel::connect(&self.target, &self.config)?))
    }
}

fn transport_status(err: &reqwest::Error) -> Status {
    if err.is_timeout() {
        Status::deadline_exceeded(format!("deadline exceeded: {}", err))
    } else if err.is_connect() {
        Status::unavailable(format!("failed to connect: {}", err))
    } else {
        Status::unavailable(format!("transport error: {}", err))
    }
}

fn decode_status(http_status: StatusCode, body: &[u8]) -> Status {
    serde_json::from_slice::<Status>(body).unwrap_or_else(|_| {
        let code = match http_status {
            StatusCode::SERVICE_UNAVAILABLE | StatusCode::BAD_GATEWAY => Code::Unavailable,
            StatusCode::GATEWAY_TIMEOUT => Code::DeadlineExceeded,
            StatusCode::PAYLOAD_TOO_LARGE => Code::ResourceExhausted,
            _ => Code::Unknown,
        };
        Status::new(code, format!("unexpected HTTP status {}", http_status))
    })
}

/// Incremental decoder for newline-delimited stream frames.
struct FrameReader<S> {
    body: S,
    buffer: Vec<u8>,
    max_frame: usize,
    finished: bool,
}

impl<S, B> FrameReader<S>
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + Unpin,
    B: AsRef<[u8]>,
{
    async fn next_frame(&mut self) -> Option<Result<Item, Status>> {
        if self.finished {
            return None;
        }
        loop {
            if let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = self.buffer.drain(..=pos).collect();
                let line = &line[..pos];
                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                return Some(match serde_json::from_slice::<StreamFrame>(line) {
                    Ok(StreamFrame::Item(item)) => Ok(item),
                    Ok(StreamFrame::Error(status)) => Err(self.finish(status)),
                    Err(e) => {
                        let status = Status::internal(format!("malformed stream frame: {}", e));
                        Err(self.finish(status))
                    }
                });
            }

            if self.buffer.len() > self.max_frame {
                let status = Status::resource_exhausted(format!(
                    "stream frame exceeds receive limit of {}",
                    self.max_frame
                ));
                return Some(Err(self.finish(status)));
            }

            match self.body.next().await {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(chunk.as_ref()),
                Some(Err(e)) => return Some(Err(self.finish(transport_status(&e)))),
                None => {
                    self.finished = true;
                    if self.buffer.iter().all(u8::is_ascii_whitespace) {
                        return None;
                    }
                    return Some(Err(Status::unavailable("stream ended mid-frame")));
                }
            }
        }
    }

    fn finish(&mut self, status: Status) -> Status {
        self.finished = true;
        status
    }
}

fn decode_frames<S, B>(body: S, max_frame: usize) -> ItemStream
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let reader = FrameReader {
        body,
        buffer: Vec::new(),
        max_frame,
        finished: false,
    };
    stream::unfold(reader, |mut reader| async move {
        let frame = reader.next_frame().await?;
        Some((frame, reader))
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::TryStreamExt;

    fn chunks(
        parts: &[&'static str],
    ) -> impl Stream<Item = Result<&'static [u8], reqwest::Error>> + Send + Unpin {
        stream::iter(parts.iter().map(|p| Ok(p.as_bytes())).collect::<Vec<_>>())
    }

    #[tokio::test]
    async fn frames_split_across_chunks_are_reassembled() {
        let body = chunks(&[
            "{\"item\":{\"id\":1,\"na",
            "me\":\"a\"}}\n{\"item\":{\"id\":2,\"name\":\"b\"}}\n",
        ]);
        let items: Vec<Item> = decode_frames(body, 1024).try_collect().await.unwrap();
        assert_eq!(items, vec![Item::new(1, "a"), Item::new(2, "b")]);
    }

    #[tokio::test]
    async fn error_frame_terminates_stream() {
        let body = chunks(&[
            "{\"item\":{\"id\":1,\"name\":\"a\"}}\n",
            "{\"error\":{\"code\":\"INTERNAL\",\"message\":\"Database error\"}}\n",
            "{\"item\":{\"id\":2,\"name\":\"b\"}}\n",
        ]);
        let results: Vec<Result<Item, Status>> = decode_frames(body, 1024).collect().await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[1], Err(Status::internal("Database error")));
    }

    #[tokio::test]
    async fn oversized_frame_is_resource_exhausted() {
        let body = chunks(&["{\"item\":{\"id\":1,\"name\":\"a-very-long-name\"}}"]);
        let results: Vec<Result<Item, Status>> = decode_frames(body, 8).collect().await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].as_ref().unwrap_err().code, Code::ResourceExhausted);
    }

    #[tokio::test]
    async fn truncated_stream_is_unavailable() {
        let body = chunks(&["{\"item\":{\"id\":1"]);
        let results: Vec<Result<Item, Status>> = decode_frames(body, 1024).collect().await;
        assert_eq!(results[0].as_ref().unwrap_err().code, Code::Unavailable);
    }

    #[test]
    fn non_json_error_bodies_map_by_http_status() {
        assert_eq!(decode_status(StatusCode::BAD_GATEWAY, b"oops").code, Code::Unavailable);
        assert_eq!(
            decode_status(
                StatusCode::CONFLICT,
                br#"{"code":"ALREADY_EXISTS","message":"Item exists"}"#
            ),
            Status::already_exists("Item exists")
        );
    }

    #[test]
    fn invalid_target_is_rejected() {
        let err = HttpChannel::connect("not a host:port", &RpcConfig::default()).unwrap_err();
        assert_eq!(err.code, Code::InvalidArgument);
    }

    #[tokio::test]
    async fn unreachable_peer_is_unavailable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let channel = HttpChannel::connect(&addr.to_string(), &RpcConfig::default()).unwrap();
        let err = channel
            .get_item_by_id(1, Duration::from_millis(500))
            .await
            .unwrap_err();
        assert!(err.code.is_transport());
    }

    #[tokio::test]
    async fn oversized_request_fails_locally() {
        let config = RpcConfig {
            max_send_message_bytes: 16,
            ..RpcConfig::default()
        };
        let channel = HttpChannel::connect("127.0.0.1:9", &config).unwrap();
        let err = channel
            .add_item(ItemRequest::new(0, "x".repeat(64)), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert_eq!(err.code, Code::ResourceExhausted);
    }
}
