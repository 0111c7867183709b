//! Request dispatch
//!
//! [`TransportCore`] owns everything shared between calls: the HTTP client,
//! the provider endpoint, default headers, the interceptor list and the
//! correlation logger. [`RequestDispatcher`] (single request, single
//! response) and [`SseStreamDispatcher`] (line-decoded SSE streams) are thin
//! views over a shared core.
//!
//! Default headers can only be changed through `&mut TransportCore`, i.e.
//! before the core is wrapped in an `Arc` and handed to dispatchers.

use crate::cancel::{CancellationToken, run_cancellable};
use crate::config::TransportConfig;
use crate::content::RequestBody;
use crate::correlation::{
    CorrelationLogger, DisabledCorrelationLogger, FileCorrelationLogger, LogContext, TypeTag,
};
use crate::endpoint::ProviderEndpoint;
use crate::error::{Result, TransportError};
use crate::headers::{HttpHeaderBuilder, headers_from_map, overlay_headers};
use crate::interceptor::{HttpInterceptor, HttpRequestContext};
use crate::request::RequestSpec;
use crate::retry::DeleteRetryPolicy;
use reqwest::header::{ACCEPT, ACCEPT_ENCODING, CACHE_CONTROL, HeaderMap, HeaderValue};
use reqwest::{Method, Url};
use std::sync::Arc;

mod request;
pub mod sse;
mod stream;

pub use request::RequestDispatcher;
pub use sse::{AsyncEvent, LineOutcome, SseLineDecoder, SseState};
pub use stream::{EventStream, SseEventReader, SseStreamDispatcher, StreamOutcome};

/// Per-call options: extra headers and the cancellation signal.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub headers: HeaderMap,
    pub cancel: CancellationToken,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self> {
        let extra = HttpHeaderBuilder::new().with_header(name, value)?.build();
        overlay_headers(&mut self.headers, &extra);
        Ok(self)
    }
}

/// State shared by all dispatchers built on the same transport.
pub struct TransportCore {
    http_client: reqwest::Client,
    endpoint: Arc<dyn ProviderEndpoint>,
    default_headers: HeaderMap,
    interceptors: Vec<Arc<dyn HttpInterceptor>>,
    correlation: Arc<dyn CorrelationLogger>,
    stream_disable_compression: bool,
    delete_retry: DeleteRetryPolicy,
}

impl TransportCore {
    pub fn builder(endpoint: Arc<dyn ProviderEndpoint>) -> TransportCoreBuilder {
        TransportCoreBuilder::new(endpoint)
    }

    /// Mutable access to the headers sent with every request.
    pub fn default_headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.default_headers
    }

    pub fn default_headers(&self) -> &HeaderMap {
        &self.default_headers
    }

    pub fn endpoint(&self) -> &dyn ProviderEndpoint {
        self.endpoint.as_ref()
    }

    pub fn delete_retry(&self) -> DeleteRetryPolicy {
        self.delete_retry
    }

    pub(crate) fn context(&self, uri: &str, stream: bool) -> HttpRequestContext {
        HttpRequestContext::new(self.endpoint.id(), uri, stream)
    }

    pub(crate) fn create_log(&self) -> Option<LogContext> {
        self.correlation.create()
    }

    pub(crate) fn interceptors(&self) -> &[Arc<dyn HttpInterceptor>] {
        &self.interceptors
    }

    /// Assemble the request: endpoint headers, then default headers, then
    /// per-call headers, then interceptors in order.
    pub(crate) fn prepare(
        &self,
        ctx: &HttpRequestContext,
        method: Method,
        uri: &str,
        body: RequestBody,
        options: &CallOptions,
    ) -> Result<RequestSpec> {
        if uri.trim().is_empty() {
            return Err(TransportError::InvalidArgument("request URI is empty".into()));
        }
        Url::parse(uri)
            .map_err(|e| TransportError::InvalidArgument(format!("invalid URI '{uri}': {e}")))?;

        let mut headers = self.endpoint.build_headers()?;
        overlay_headers(&mut headers, &self.default_headers);
        overlay_headers(&mut headers, &options.headers);
        if ctx.stream {
            headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
            headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
            if self.stream_disable_compression {
                headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
            }
        }

        let mut spec = RequestSpec {
            method,
            url: uri.to_string(),
            headers,
            body,
        };
        for interceptor in &self.interceptors {
            interceptor.on_before_send(ctx, &mut spec)?;
        }
        Ok(spec)
    }

    /// Send a prepared request, observing cancellation at the network await.
    pub(crate) async fn send(
        &self,
        ctx: &HttpRequestContext,
        spec: RequestSpec,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response> {
        let rb = spec.into_builder(&self.http_client);
        let resp = run_cancellable(cancel, async { rb.send().await.map_err(TransportError::from) })
            .await?;
        for interceptor in &self.interceptors {
            interceptor.on_response(ctx, resp.status(), resp.headers())?;
        }
        Ok(resp)
    }

    /// Turn a non-success response into a protocol error carrying the raw body.
    pub(crate) async fn protocol_error(
        resp: reqwest::Response,
        cancel: &CancellationToken,
    ) -> TransportError {
        let status = resp.status().as_u16();
        let body = run_cancellable(cancel, async {
            resp.text().await.map_err(TransportError::from)
        })
        .await;
        match body {
            Ok(body) => TransportError::Protocol { status, body },
            Err(e) => e,
        }
    }

    pub(crate) fn notify_error(&self, ctx: &HttpRequestContext, error: &TransportError) {
        for interceptor in &self.interceptors {
            interceptor.on_error(ctx, error);
        }
    }
}

/// Log the outgoing JSON body, if any.
pub(crate) async fn log_request(
    log: Option<&LogContext>,
    tag: &TypeTag,
    body: Option<&serde_json::Value>,
) {
    if let (Some(log), Some(body)) = (log, body) {
        log.log(tag, body).await;
    }
}

/// Builder for [`TransportCore`].
pub struct TransportCoreBuilder {
    endpoint: Arc<dyn ProviderEndpoint>,
    config: TransportConfig,
    http_client: Option<reqwest::Client>,
    interceptors: Vec<Arc<dyn HttpInterceptor>>,
    correlation: Option<Arc<dyn CorrelationLogger>>,
}

impl TransportCoreBuilder {
    pub fn new(endpoint: Arc<dyn ProviderEndpoint>) -> Self {
        Self {
            endpoint,
            config: TransportConfig::default(),
            http_client: None,
            interceptors: Vec::new(),
            correlation: None,
        }
    }

    pub fn config(mut self, config: TransportConfig) -> Self {
        self.config = config;
        self
    }

    /// Use an existing client instead of building one from the config.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Append an interceptor; interceptors run in insertion order.
    pub fn interceptor(mut self, interceptor: Arc<dyn HttpInterceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn interceptors(mut self, interceptors: Vec<Arc<dyn HttpInterceptor>>) -> Self {
        self.interceptors.extend(interceptors);
        self
    }

    pub fn correlation_logger(mut self, logger: Arc<dyn CorrelationLogger>) -> Self {
        self.correlation = Some(logger);
        self
    }

    pub fn build(self) -> Result<TransportCore> {
        let http_client = match self.http_client {
            Some(c) => c,
            None => self.config.build_http_client()?,
        };
        let correlation = match (self.correlation, &self.config.log_dir) {
            (Some(logger), _) => logger,
            (None, Some(dir)) => Arc::new(FileCorrelationLogger::new(dir.clone())),
            (None, None) => Arc::new(DisabledCorrelationLogger),
        };
        Ok(TransportCore {
            http_client,
            endpoint: self.endpoint,
            default_headers: headers_from_map(&self.config.default_headers)?,
            interceptors: self.interceptors,
            correlation,
            stream_disable_compression: self.config.stream_disable_compression,
            delete_retry: self.config.delete_retry,
        })
    }
}

static_assertions::assert_impl_all!(TransportCore: Send, Sync);
