use super::{CallOptions, TransportCore, log_request};
use crate::cancel::run_cancellable;
use crate::content::{ContentFactory, build_body};
use crate::correlation::{LogContext, TypeTag, log_optional};
use crate::error::{Result, TransportError};
use crate::interceptor::HttpRequestContext;
use crate::metadata::{ApiResponse, enrich};
use crate::result::{OperationResult, Outcome};
use crate::retry::DeleteRetryPolicy;
use futures_util::StreamExt;
use reqwest::Method;
use reqwest::header::HeaderMap;
use serde::Serialize;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::io::StreamReader;

/// Single request, single response.
///
/// Every method returns an [`OperationResult`]; transport, protocol, decoding
/// and argument failures all surface as failed results, never as panics or
/// `Err` values.
#[derive(Clone)]
pub struct RequestDispatcher {
    core: Arc<TransportCore>,
}

impl RequestDispatcher {
    pub fn new(core: Arc<TransportCore>) -> Self {
        Self { core }
    }

    pub fn core(&self) -> &TransportCore {
        &self.core
    }

    /// Send a request and decode the JSON response into `T`.
    ///
    /// The body comes from `content` when given, otherwise from the JSON
    /// encoding of `payload`, otherwise it is empty.
    pub async fn call<P, T>(
        &self,
        method: Method,
        uri: &str,
        payload: Option<&P>,
        content: Option<&dyn ContentFactory<P>>,
        options: &CallOptions,
    ) -> OperationResult<T>
    where
        P: Serialize + ?Sized + Sync,
        T: ApiResponse,
    {
        self.execute(
            method,
            uri,
            payload,
            content,
            options,
            TypeTag::of::<T>(),
            |text, headers| {
                let mut value: T = serde_json::from_str(&text).map_err(|e| {
                    TransportError::Parse(format!("Failed to parse response JSON: {e}"))
                })?;
                enrich(&mut value, headers);
                Ok(value)
            },
        )
        .await
    }

    /// Like [`call`](Self::call) but returns the raw response text.
    pub async fn call_text<P>(
        &self,
        method: Method,
        uri: &str,
        payload: Option<&P>,
        content: Option<&dyn ContentFactory<P>>,
        options: &CallOptions,
    ) -> OperationResult<String>
    where
        P: Serialize + ?Sized + Sync,
    {
        self.execute(
            method,
            uri,
            payload,
            content,
            options,
            TypeTag::new("String"),
            |text, _| Ok(text),
        )
        .await
    }

    pub async fn get<T: ApiResponse>(&self, uri: &str, options: &CallOptions) -> OperationResult<T> {
        self.call::<(), T>(Method::GET, uri, None, None, options).await
    }

    pub async fn post<P, T>(&self, uri: &str, payload: &P, options: &CallOptions) -> OperationResult<T>
    where
        P: Serialize + ?Sized + Sync,
        T: ApiResponse,
    {
        self.call(Method::POST, uri, Some(payload), None, options)
            .await
    }

    /// POST with a custom body, e.g. a multipart upload.
    pub async fn post_with<P, T>(
        &self,
        uri: &str,
        payload: Option<&P>,
        content: &dyn ContentFactory<P>,
        options: &CallOptions,
    ) -> OperationResult<T>
    where
        P: Serialize + ?Sized + Sync,
        T: ApiResponse,
    {
        self.call(Method::POST, uri, payload, Some(content), options)
            .await
    }

    pub async fn delete<T: ApiResponse>(&self, uri: &str, options: &CallOptions) -> OperationResult<T> {
        self.call::<(), T>(Method::DELETE, uri, None, None, options)
            .await
    }

    /// DELETE that ignores the response body.
    pub async fn delete_outcome(&self, uri: &str, options: &CallOptions) -> Outcome {
        self.call_text::<()>(Method::DELETE, uri, None, None, options)
            .await
            .map(|_| ())
    }

    /// DELETE, retried while the server reports the resource as still
    /// processing. Uses the transport's configured policy.
    pub async fn delete_with_retry<T: ApiResponse>(
        &self,
        uri: &str,
        options: &CallOptions,
    ) -> OperationResult<T> {
        self.delete_with_retry_policy(uri, options, self.core.delete_retry())
            .await
    }

    pub async fn delete_with_retry_policy<T: ApiResponse>(
        &self,
        uri: &str,
        options: &CallOptions,
        policy: DeleteRetryPolicy,
    ) -> OperationResult<T> {
        let this = self;
        policy
            .run(&options.cancel, move || this.delete::<T>(uri, options))
            .await
    }

    /// Stream the response body into `sink`; the value is the number of bytes
    /// written. On failure the sink may hold a partial body.
    pub async fn download<P, W>(
        &self,
        method: Method,
        uri: &str,
        payload: Option<&P>,
        sink: &mut W,
        options: &CallOptions,
    ) -> OperationResult<u64>
    where
        P: Serialize + ?Sized + Sync,
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let ctx = self.core.context(uri, false);
        let log = self.core.create_log();
        let res = self
            .try_download(&ctx, log.as_ref(), method, uri, payload, sink, options)
            .await;
        self.finish(&ctx, res)
    }

    #[allow(clippy::too_many_arguments)]
    async fn execute<P, R>(
        &self,
        method: Method,
        uri: &str,
        payload: Option<&P>,
        content: Option<&dyn ContentFactory<P>>,
        options: &CallOptions,
        response_tag: TypeTag,
        decode: impl FnOnce(String, &HeaderMap) -> Result<R> + Send,
    ) -> OperationResult<R>
    where
        P: Serialize + ?Sized + Sync,
    {
        let ctx = self.core.context(uri, false);
        let log = self.core.create_log();
        let res = async {
            let resp = self
                .open(&ctx, log.as_ref(), method, uri, payload, content, options)
                .await?;
            let status = resp.status().as_u16();
            let headers = resp.headers().clone();
            let text = run_cancellable(&options.cancel, async {
                resp.text().await.map_err(TransportError::from)
            })
            .await?;
            log_optional(log.as_ref(), &response_tag, &text).await;
            let value = decode(text, &headers)?;
            Ok::<_, TransportError>(OperationResult::ok(value, status))
        }
        .await;
        self.finish(&ctx, res)
    }

    #[allow(clippy::too_many_arguments)]
    async fn try_download<P, W>(
        &self,
        ctx: &HttpRequestContext,
        log: Option<&LogContext>,
        method: Method,
        uri: &str,
        payload: Option<&P>,
        sink: &mut W,
        options: &CallOptions,
    ) -> Result<OperationResult<u64>>
    where
        P: Serialize + ?Sized + Sync,
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let resp = self
            .open(ctx, log, method, uri, payload, None, options)
            .await?;
        let status = resp.status().as_u16();
        let body = resp.bytes_stream().map(|chunk| chunk.map_err(std::io::Error::other));
        let mut reader = StreamReader::new(Box::pin(body));
        let written = run_cancellable(&options.cancel, async {
            let n = tokio::io::copy(&mut reader, &mut *sink).await?;
            sink.flush().await?;
            Ok::<_, TransportError>(n)
        })
        .await?;
        tracing::debug!(target: "siumai_transport::http", url = %uri, bytes = written, "download complete");
        Ok(OperationResult::ok(written, status))
    }

    /// Build the body, assemble headers, run interceptors and send. Only a
    /// 2xx response is returned; anything else becomes a protocol error.
    #[allow(clippy::too_many_arguments)]
    async fn open<P>(
        &self,
        ctx: &HttpRequestContext,
        log: Option<&LogContext>,
        method: Method,
        uri: &str,
        payload: Option<&P>,
        content: Option<&dyn ContentFactory<P>>,
        options: &CallOptions,
    ) -> Result<reqwest::Response>
    where
        P: Serialize + ?Sized + Sync,
    {
        let cancel = &options.cancel;
        let body = run_cancellable(cancel, build_body(payload, content, cancel)).await?;
        let spec = self.core.prepare(ctx, method, uri, body, options)?;
        log_request(log, &TypeTag::of::<P>(), spec.json_body()).await;

        tracing::debug!(
            target: "siumai_transport::http",
            request_id = %ctx.request_id,
            method = %spec.method,
            url = %spec.url,
            "sending request"
        );
        let resp = self.core.send(ctx, spec, cancel).await?;
        if !resp.status().is_success() {
            return Err(TransportCore::protocol_error(resp, cancel).await);
        }
        Ok(resp)
    }

    fn finish<R>(&self, ctx: &HttpRequestContext, res: Result<OperationResult<R>>) -> OperationResult<R> {
        match res {
            Ok(result) => result,
            Err(e) => {
                tracing::debug!(
                    target: "siumai_transport::http",
                    request_id = %ctx.request_id,
                    url = %ctx.url,
                    error = %e,
                    "request failed"
                );
                self.core.notify_error(ctx, &e);
                e.into()
            }
        }
    }
}
