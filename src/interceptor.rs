//! HTTP Interceptor interfaces
//!
//! Interceptors are supplied as an ordered list when a transport is built.
//! They run after the request is fully assembled and may mutate it (headers,
//! URL, body) as the last step before it is sent. They are also notified of
//! responses, errors and raw SSE lines. Hooks are best-effort and should avoid
//! expensive work.

use crate::error::TransportError;
use crate::request::RequestSpec;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;

/// Context passed to interceptors describing the request.
#[derive(Clone, Debug)]
pub struct HttpRequestContext {
    pub request_id: String,
    pub provider_id: String,
    pub url: String,
    pub stream: bool,
}

impl HttpRequestContext {
    pub fn new(provider_id: impl Into<String>, url: impl Into<String>, stream: bool) -> Self {
        Self {
            request_id: generate_request_id(),
            provider_id: provider_id.into(),
            url: url.into(),
            stream,
        }
    }
}

/// Client-side id used to correlate interceptor callbacks for one call.
pub fn generate_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// HTTP interceptor trait
pub trait HttpInterceptor: Send + Sync {
    /// Called before sending a request. Return an error to short-circuit the
    /// call; the error is surfaced as a failed result.
    fn on_before_send(
        &self,
        _ctx: &HttpRequestContext,
        _request: &mut RequestSpec,
    ) -> Result<(), TransportError> {
        Ok(())
    }

    /// Called once the response status and headers are known.
    fn on_response(
        &self,
        _ctx: &HttpRequestContext,
        _status: StatusCode,
        _headers: &HeaderMap,
    ) -> Result<(), TransportError> {
        Ok(())
    }

    /// Called when the call fails for any reason.
    fn on_error(&self, _ctx: &HttpRequestContext, _error: &TransportError) {}

    /// Called for every raw line read from an SSE stream.
    fn on_sse_line(&self, _ctx: &HttpRequestContext, _line: &str) {}
}

/// Adapts a plain function into a pre-send interceptor.
pub struct FnInterceptor<F>(pub F);

impl<F> HttpInterceptor for FnInterceptor<F>
where
    F: Fn(&HttpRequestContext, &mut RequestSpec) -> Result<(), TransportError> + Send + Sync,
{
    fn on_before_send(
        &self,
        ctx: &HttpRequestContext,
        request: &mut RequestSpec,
    ) -> Result<(), TransportError> {
        (self.0)(ctx, request)
    }
}

/// A simple logging interceptor backed by `tracing` (no sensitive data).
#[derive(Clone, Default)]
pub struct LoggingInterceptor;

impl HttpInterceptor for LoggingInterceptor {
    fn on_before_send(
        &self,
        ctx: &HttpRequestContext,
        request: &mut RequestSpec,
    ) -> Result<(), TransportError> {
        tracing::debug!(target: "siumai_transport::http", provider=%ctx.provider_id, request_id=%ctx.request_id, method=%request.method, url=%ctx.url, stream=%ctx.stream, "sending request");
        Ok(())
    }

    fn on_response(
        &self,
        ctx: &HttpRequestContext,
        status: StatusCode,
        _headers: &HeaderMap,
    ) -> Result<(), TransportError> {
        tracing::debug!(target: "siumai_transport::http", provider=%ctx.provider_id, request_id=%ctx.request_id, status=%status.as_u16(), "response received");
        Ok(())
    }

    fn on_error(&self, ctx: &HttpRequestContext, error: &TransportError) {
        tracing::debug!(target: "siumai_transport::http", provider=%ctx.provider_id, request_id=%ctx.request_id, stream=%ctx.stream, err=%error, "request error");
    }

    fn on_sse_line(&self, ctx: &HttpRequestContext, line: &str) {
        tracing::trace!(target: "siumai_transport::http", provider=%ctx.provider_id, request_id=%ctx.request_id, len=line.len(), "sse line");
    }
}
