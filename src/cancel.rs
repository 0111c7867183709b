//! Cancellation utilities
//!
//! A single [`CancellationToken`] threads through a whole call. Single-shot
//! calls observe it at the network await; streams observe it before every
//! line read and before every yielded element.

use crate::error::{Result, TransportError};
use futures::Stream;
use std::future::Future;
pub use tokio_util::sync::CancellationToken;

/// Race `future` against the token. Cancellation wins ties so that an
/// already-cancelled token never starts network work.
pub async fn run_cancellable<T, F>(token: &CancellationToken, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if token.is_cancelled() {
        return Err(TransportError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(TransportError::Cancelled),
        res = future => res,
    }
}

/// Stop a stream as soon as the token fires, waking a pending `next()`.
pub fn make_cancellable_stream<S>(
    stream: S,
    token: CancellationToken,
) -> impl Stream<Item = S::Item> + Send
where
    S: Stream + Send + Unpin,
    S::Item: Send,
{
    let mut inner = stream;
    async_stream::stream! {
        use futures::StreamExt;
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                item = inner.next() => {
                    let Some(item) = item else { break };
                    if token.is_cancelled() {
                        break;
                    }
                    yield item;
                }
            }
        }
    }
}
