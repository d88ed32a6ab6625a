//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap calls with a deadline
//! - Bound streaming calls end to end, not per element
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - An elapsed deadline is DEADLINE_EXCEEDED, a transport-class failure

use std::future::Future;
use std::time::Duration;

use futures_util::stream::{self, BoxStream, StreamExt};
use tokio::time::{timeout, timeout_at, Instant};

use crate::rpc::Status;

/// Run `future` with a deadline of `limit`.
pub async fn with_deadline<F, T>(limit: Duration, future: F) -> Result<T, Status>
where
    F: Future<Output = T>,
{
    timeout(limit, future)
        .await
        .map_err(|_| Status::deadline_exceeded(format!("deadline of {:?} exceeded", limit)))
}

/// Terminate `inner` with DEADLINE_EXCEEDED once `deadline` passes.
pub fn deadline_stream<T>(
    inner: BoxStream<'static, Result<T, Status>>,
    deadline: Instant,
) -> BoxStream<'static, Result<T, Status>>
where
    T: Send + 'static,
{
    stream::unfold(Some(inner), move |state| async move {
        let mut inner = state?;
        match timeout_at(deadline, inner.next()).await {
            Ok(Some(Ok(item))) => Some((Ok(item), Some(inner))),
            Ok(Some(Err(status))) => Some((Err(status), None)),
            Ok(None) => None,
            Err(_) => Some((Err(Status::deadline_exceeded("stream deadline exceeded")), None)),
        }
    })
    .boxed()
}
