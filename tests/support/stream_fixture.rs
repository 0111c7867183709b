//! Test fixture utilities: load SSE fixtures, re-chunk them and drive the
//! event reader

use bytes::Bytes;
use futures_util::stream;
use siumai_transport::dispatcher::{SseEventReader, SseState};
use siumai_transport::{ApiResponse, AsyncEvent, CancellationToken, OperationResult};
use std::io;
use tokio_util::io::StreamReader;

pub fn fixture_path(name: &str) -> String {
    format!("{}/tests/fixtures/{name}", env!("CARGO_MANIFEST_DIR"))
}

/// Load an `.sse` fixture with normalized line endings.
pub fn load_sse_fixture(name: &str) -> io::Result<String> {
    let raw = std::fs::read_to_string(fixture_path(name))?;
    Ok(raw.replace("\r\n", "\n"))
}

/// Split raw SSE text into fixed-size byte chunks, ignoring line boundaries.
pub fn chunked(raw: &str, size: usize) -> Vec<io::Result<Bytes>> {
    raw.as_bytes()
        .chunks(size.max(1))
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect()
}

/// Decode chunks through the reader, returning every element and the final
/// state.
pub async fn collect_events<T: ApiResponse>(
    chunks: Vec<io::Result<Bytes>>,
) -> (Vec<OperationResult<AsyncEvent<T>>>, SseState) {
    let reader = StreamReader::new(stream::iter(chunks));
    let mut events = SseEventReader::<T, _>::new(
        reader,
        reqwest::header::HeaderMap::new(),
        200,
        CancellationToken::new(),
    );
    let mut out = Vec::new();
    while let Some(item) = events.next_event().await {
        out.push(item);
    }
    (out, events.state())
}
