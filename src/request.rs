//! Outgoing request description
//!
//! A [`RequestSpec`] is fully assembled (body, endpoint headers, default
//! headers, per-request headers) before interceptors see it, so an
//! interceptor always gets the last word on what goes over the wire.

use crate::content::RequestBody;
use reqwest::Method;
use reqwest::header::HeaderMap;

#[derive(Debug)]
pub struct RequestSpec {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: RequestBody,
}

impl RequestSpec {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
        }
    }

    /// JSON body, if this request carries one.
    pub fn json_body(&self) -> Option<&serde_json::Value> {
        match &self.body {
            RequestBody::Json(v) => Some(v),
            _ => None,
        }
    }

    pub(crate) fn into_builder(self, client: &reqwest::Client) -> reqwest::RequestBuilder {
        let mut headers = self.headers;
        let rb = client.request(self.method, &self.url);
        match self.body {
            RequestBody::Empty => rb.headers(headers),
            RequestBody::Json(value) => rb.headers(headers).json(&value),
            RequestBody::Bytes { data, content_type } => {
                if let Some(ct) = content_type {
                    headers.insert(reqwest::header::CONTENT_TYPE, ct);
                }
                rb.headers(headers).body(data)
            }
            RequestBody::Multipart(form) => {
                // The form owns its boundary-based Content-Type.
                headers.remove(reqwest::header::CONTENT_TYPE);
                rb.headers(headers).multipart(form)
            }
        }
    }
}
