//! Request content
//!
//! A request body is produced either by a caller-supplied [`ContentFactory`]
//! (multipart uploads and other non-JSON bodies) or by default JSON
//! serialization of the payload. The factory wins when both are available.

use crate::error::{Result, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderValue;
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;

/// Chunk size used when copying a reader into a multipart part.
pub const STREAM_CHUNK_SIZE: usize = 8 * 1024;

const OCTET_STREAM: &str = "application/octet-stream";

/// Wire body of an outgoing request.
#[derive(Debug, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    /// Sent as UTF-8 JSON with `Content-Type: application/json`.
    Json(serde_json::Value),
    /// Raw bytes with an optional content type.
    Bytes {
        data: Bytes,
        content_type: Option<HeaderValue>,
    },
    /// `multipart/form-data`
    Multipart(Form),
}

/// Builds a request body from a payload.
#[async_trait]
pub trait ContentFactory<P: ?Sized + Sync>: Send + Sync {
    async fn build(&self, payload: Option<&P>, cancel: &CancellationToken) -> Result<RequestBody>;
}

/// Default JSON encoding of a payload.
pub fn json_body<P: Serialize + ?Sized>(payload: &P) -> Result<RequestBody> {
    serde_json::to_value(payload)
        .map(RequestBody::Json)
        .map_err(|e| TransportError::Serialization(e.to_string()))
}

/// Resolve the body for a call: factory first, then JSON, then empty.
pub async fn build_body<P>(
    payload: Option<&P>,
    factory: Option<&dyn ContentFactory<P>>,
    cancel: &CancellationToken,
) -> Result<RequestBody>
where
    P: Serialize + ?Sized + Sync,
{
    match (factory, payload) {
        (Some(factory), payload) => factory.build(payload, cancel).await,
        (None, Some(payload)) => json_body(payload),
        (None, None) => Ok(RequestBody::Empty),
    }
}

fn guess_mime(file_name: &str, head: Option<&[u8]>) -> String {
    if let Some(m) = mime_guess::from_path(file_name).first() {
        return m.essence_str().to_string();
    }
    head.and_then(infer::get)
        .map(|t| t.mime_type().to_string())
        .unwrap_or_else(|| OCTET_STREAM.to_string())
}

/// Assembles `multipart/form-data` bodies with named parts.
#[derive(Debug)]
pub struct MultipartBuilder {
    form: Form,
}

impl Default for MultipartBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MultipartBuilder {
    pub fn new() -> Self {
        Self { form: Form::new() }
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.form = self.form.text(name.into(), value.into());
        self
    }

    /// File part from in-memory content.
    pub fn bytes(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> Result<Self> {
        let file_name = file_name.into();
        let data = data.into();
        let mime = guess_mime(&file_name, Some(&data));
        let part = Part::bytes(data)
            .file_name(file_name)
            .mime_str(&mime)
            .map_err(|e| TransportError::InvalidArgument(format!("Invalid MIME type: {e}")))?;
        self.form = self.form.part(name.into(), part);
        Ok(self)
    }

    /// File part streamed from a reader in fixed-size chunks.
    ///
    /// Pass `length` when known; some endpoints reject chunked parts.
    pub fn reader<R>(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        reader: R,
        length: Option<u64>,
    ) -> Result<Self>
    where
        R: AsyncRead + Send + Sync + Unpin + 'static,
    {
        let file_name = file_name.into();
        let mime = guess_mime(&file_name, None);
        let body = reqwest::Body::wrap_stream(ReaderStream::with_capacity(reader, STREAM_CHUNK_SIZE));
        let part = match length {
            Some(len) => Part::stream_with_length(body, len),
            None => Part::stream(body),
        }
        .file_name(file_name)
        .mime_str(&mime)
        .map_err(|e| TransportError::InvalidArgument(format!("Invalid MIME type: {e}")))?;
        self.form = self.form.part(name.into(), part);
        Ok(self)
    }

    pub fn build(self) -> RequestBody {
        RequestBody::Multipart(self.form)
    }
}

/// Content factory backed by a function producing a multipart form.
pub struct MultipartFactory<F>(pub F);

#[async_trait]
impl<P, F> ContentFactory<P> for MultipartFactory<F>
where
    P: ?Sized + Sync,
    F: Fn(&P) -> Result<MultipartBuilder> + Send + Sync,
{
    async fn build(&self, payload: Option<&P>, cancel: &CancellationToken) -> Result<RequestBody> {
        if cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }
        let payload = payload.ok_or_else(|| {
            TransportError::InvalidArgument("multipart content requires a payload".into())
        })?;
        Ok((self.0)(payload)?.build())
    }
}
