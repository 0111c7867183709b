//! SSE stream dispatch
//!
//! Both adapters share [`SseEventReader`], so for the same wire bytes the
//! pull stream and the push callback observe the same sequence of elements.

use super::sse::{AsyncEvent, LineOutcome, SseLineDecoder, SseState};
use super::{CallOptions, TransportCore, log_request};
use crate::cancel::{CancellationToken, make_cancellable_stream};
use crate::content::{RequestBody, json_body};
use crate::correlation::{LogContext, TypeTag, log_optional};
use crate::error::{Result, TransportError};
use crate::interceptor::{HttpInterceptor, HttpRequestContext};
use crate::metadata::ApiResponse;
use crate::result::OperationResult;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::Method;
use reqwest::header::HeaderMap;
use serde::Serialize;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tokio_util::io::StreamReader;

/// Pull-based stream of decoded events.
pub type EventStream<T> = Pin<Box<dyn Stream<Item = OperationResult<AsyncEvent<T>>> + Send>>;

type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;
type ResponseReader = StreamReader<ByteStream, Bytes>;

/// How a push-style stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// `[DONE]` was seen or the body ended.
    Completed,
    /// The call or a line failed; the error was delivered to the callback.
    Errored,
    Cancelled,
}

impl From<SseState> for StreamOutcome {
    fn from(state: SseState) -> Self {
        match state {
            SseState::AwaitingLine | SseState::Completed => StreamOutcome::Completed,
            SseState::Errored => StreamOutcome::Errored,
            SseState::Cancelled => StreamOutcome::Cancelled,
        }
    }
}

/// Longest SSE line accepted before the stream fails.
pub const DEFAULT_MAX_LINE_BYTES: usize = 4 * 1024 * 1024;

/// Reads lines from a response body and decodes them into events.
///
/// Lines are buffered whole; one longer than the configured maximum ends the
/// stream with a transport error.
pub struct SseEventReader<T, R> {
    lines: FramedRead<R, LinesCodec>,
    max_line_bytes: usize,
    decoder: SseLineDecoder,
    headers: HeaderMap,
    status: u16,
    cancel: CancellationToken,
    observer: Option<(HttpRequestContext, Vec<Arc<dyn HttpInterceptor>>)>,
    log: Option<LogContext>,
    tag: TypeTag,
    _marker: PhantomData<fn() -> T>,
}

impl<T, R> SseEventReader<T, R>
where
    T: ApiResponse,
    R: AsyncRead + Unpin,
{
    /// `headers` feed metadata enrichment of every event; `status` is
    /// reported on each successful element.
    pub fn new(reader: R, headers: HeaderMap, status: u16, cancel: CancellationToken) -> Self {
        Self {
            lines: FramedRead::new(reader, LinesCodec::new_with_max_length(DEFAULT_MAX_LINE_BYTES)),
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            decoder: SseLineDecoder::new(),
            headers,
            status,
            cancel,
            observer: None,
            log: None,
            tag: TypeTag::of::<AsyncEvent<T>>(),
            _marker: PhantomData,
        }
    }

    pub fn with_max_line_bytes(mut self, max: usize) -> Self {
        let codec = LinesCodec::new_with_max_length(max);
        self.lines = FramedRead::new(self.lines.into_inner(), codec);
        self.max_line_bytes = max;
        self
    }

    pub(crate) fn with_observer(
        mut self,
        ctx: HttpRequestContext,
        interceptors: Vec<Arc<dyn HttpInterceptor>>,
    ) -> Self {
        if !interceptors.is_empty() {
            self.observer = Some((ctx, interceptors));
        }
        self
    }

    pub(crate) fn with_log(mut self, log: Option<LogContext>) -> Self {
        self.log = log;
        self
    }

    pub fn state(&self) -> SseState {
        self.decoder.state()
    }

    /// Next element, or `None` once the stream is finished. After a decode
    /// or I/O error has been returned, the stream is finished.
    pub async fn next_event(&mut self) -> Option<OperationResult<AsyncEvent<T>>> {
        loop {
            if self.decoder.state().is_terminal() {
                return None;
            }

            let cancel = self.cancel.clone();
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                line = self.lines.next() => Some(line),
            };
            let line = match next {
                None => {
                    self.decoder.finish(SseState::Cancelled);
                    return None;
                }
                Some(Some(Ok(line))) => line,
                Some(None) => {
                    self.decoder.finish(SseState::Completed);
                    return None;
                }
                Some(Some(Err(e))) => {
                    self.decoder.finish(SseState::Errored);
                    let err = match e {
                        LinesCodecError::MaxLineLengthExceeded => TransportError::Parse(format!(
                            "SSE line exceeds {} bytes",
                            self.max_line_bytes
                        )),
                        LinesCodecError::Io(e) => TransportError::from(e),
                    };
                    return Some(err.into());
                }
            };

            if let Some((ctx, interceptors)) = &self.observer {
                for interceptor in interceptors {
                    interceptor.on_sse_line(ctx, &line);
                }
            }

            match self.decoder.decode::<T>(&line, &self.headers) {
                LineOutcome::Skip => continue,
                LineOutcome::Done => return None,
                LineOutcome::Event(event) => {
                    log_optional(self.log.as_ref(), &self.tag, &line).await;
                    return Some(OperationResult::ok(event, self.status));
                }
                LineOutcome::Error(e) => {
                    tracing::debug!(target: "siumai_transport::http", error = %e, "SSE line rejected");
                    return Some(e.into());
                }
            }
        }
    }
}

/// Opens SSE streams over a shared [`TransportCore`].
#[derive(Clone)]
pub struct SseStreamDispatcher {
    core: Arc<TransportCore>,
}

impl SseStreamDispatcher {
    pub fn new(core: Arc<TransportCore>) -> Self {
        Self { core }
    }

    pub fn core(&self) -> &TransportCore {
        &self.core
    }

    /// Pull adapter. The payload is encoded eagerly; the request is sent on
    /// the first poll. Cancelling `options.cancel` ends the stream without a
    /// further element.
    pub fn stream<P, T>(
        &self,
        method: Method,
        uri: &str,
        payload: Option<&P>,
        options: &CallOptions,
    ) -> EventStream<T>
    where
        P: Serialize + ?Sized,
        T: ApiResponse,
    {
        match encode(payload) {
            Ok(body) => self.open_stream(method, uri, body, TypeTag::of::<P>(), options),
            Err(e) => {
                let ctx = self.core.context(uri, true);
                self.core.notify_error(&ctx, &e);
                let failed: OperationResult<AsyncEvent<T>> = e.into();
                Box::pin(futures::stream::iter([failed]))
            }
        }
    }

    /// Pull adapter over a pre-built body.
    pub fn stream_request<T: ApiResponse>(
        &self,
        method: Method,
        uri: &str,
        body: RequestBody,
        options: &CallOptions,
    ) -> EventStream<T> {
        self.open_stream(method, uri, body, TypeTag::new("RequestBody"), options)
    }

    /// Push adapter: `on_event` is invoked for every element, in order, and
    /// never after cancellation has been observed.
    pub async fn stream_with_callback<P, T, F>(
        &self,
        method: Method,
        uri: &str,
        payload: Option<&P>,
        options: &CallOptions,
        mut on_event: F,
    ) -> StreamOutcome
    where
        P: Serialize + ?Sized + Sync,
        T: ApiResponse,
        F: FnMut(OperationResult<AsyncEvent<T>>) + Send,
    {
        let ctx = self.core.context(uri, true);
        let log = self.core.create_log();
        let opened = match encode(payload) {
            Ok(body) => {
                open_reader::<T>(&self.core, &ctx, log, method, uri, body, TypeTag::of::<P>(), options)
                    .await
            }
            Err(e) => Err(e),
        };
        let mut reader = match opened {
            Ok(reader) => reader,
            Err(TransportError::Cancelled) => return StreamOutcome::Cancelled,
            Err(e) => {
                self.core.notify_error(&ctx, &e);
                on_event(e.into());
                return StreamOutcome::Errored;
            }
        };

        while let Some(item) = reader.next_event().await {
            if options.cancel.is_cancelled() {
                return StreamOutcome::Cancelled;
            }
            on_event(item);
        }
        reader.state().into()
    }

    fn open_stream<T: ApiResponse>(
        &self,
        method: Method,
        uri: &str,
        body: RequestBody,
        request_tag: TypeTag,
        options: &CallOptions,
    ) -> EventStream<T> {
        let core = self.core.clone();
        let uri = uri.to_string();
        let options = options.clone();
        let cancel = options.cancel.clone();

        let events = async_stream::stream! {
            let ctx = core.context(&uri, true);
            let log = core.create_log();
            match open_reader::<T>(&core, &ctx, log, method, &uri, body, request_tag, &options).await {
                Ok(mut reader) => {
                    while let Some(item) = reader.next_event().await {
                        yield item;
                    }
                }
                Err(TransportError::Cancelled) => {}
                Err(e) => {
                    core.notify_error(&ctx, &e);
                    yield OperationResult::from(e);
                }
            }
        };
        Box::pin(make_cancellable_stream(Box::pin(events), cancel))
    }
}

fn encode<P: Serialize + ?Sized>(payload: Option<&P>) -> Result<RequestBody> {
    payload.map(json_body).transpose().map(Option::unwrap_or_default)
}

#[allow(clippy::too_many_arguments)]
async fn open_reader<T: ApiResponse>(
    core: &TransportCore,
    ctx: &HttpRequestContext,
    log: Option<LogContext>,
    method: Method,
    uri: &str,
    body: RequestBody,
    request_tag: TypeTag,
    options: &CallOptions,
) -> Result<SseEventReader<T, ResponseReader>> {
    let cancel = &options.cancel;
    let spec = core.prepare(ctx, method, uri, body, options)?;
    log_request(log.as_ref(), &request_tag, spec.json_body()).await;

    tracing::debug!(
        target: "siumai_transport::http",
        request_id = %ctx.request_id,
        url = %spec.url,
        "opening SSE stream"
    );
    let resp = core.send(ctx, spec, cancel).await?;
    if !resp.status().is_success() {
        return Err(TransportCore::protocol_error(resp, cancel).await);
    }

    let status = resp.status().as_u16();
    let headers = resp.headers().clone();
    let bytes: ByteStream = Box::pin(
        resp.bytes_stream()
            .map(|chunk| chunk.map_err(std::io::Error::other)),
    );
    Ok(
        SseEventReader::new(StreamReader::new(bytes), headers, status, cancel.clone())
            .with_observer(ctx.clone(), core.interceptors().to_vec())
            .with_log(log),
    )
}
