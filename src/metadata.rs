//! Response metadata enrichment
//!
//! Decoded payloads may opt into receiving transport-level metadata taken
//! from response headers. Opting in is a capability: implement
//! [`ResponseMetadataTarget`] and return it from
//! [`ApiResponse::metadata_target`].

use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const ORGANIZATION_HEADER: &str = "openai-organization";
pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const PROCESSING_MS_HEADER: &str = "openai-processing-ms";
pub const API_VERSION_HEADER: &str = "openai-version";
pub const MODEL_HEADER: &str = "openai-model";

/// Settable metadata fields exposed by a response payload.
pub trait ResponseMetadataTarget {
    fn set_organization(&mut self, organization: String);
    fn set_request_id(&mut self, request_id: String);
    fn set_processing_time(&mut self, processing_time: Duration);
    fn set_api_version(&mut self, api_version: String);
    /// Current model value, if the payload already carries one.
    fn model(&self) -> Option<&str>;
    fn set_model(&mut self, model: String);
}

/// A type that can be decoded from a response body.
///
/// The default implementation exposes no metadata capability, so plain DTOs
/// only need an empty `impl ApiResponse for MyType {}`.
pub trait ApiResponse: DeserializeOwned + Send + 'static {
    fn metadata_target(&mut self) -> Option<&mut dyn ResponseMetadataTarget> {
        None
    }
}

impl ApiResponse for serde_json::Value {}

/// Metadata block that payload types can embed (usually `#[serde(skip)]`
/// next to their own `model` field, or standalone).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl ResponseMetadata {
    /// Collect metadata from headers into a fresh block.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut meta = Self::default();
        apply_response_metadata(headers, &mut meta);
        meta
    }
}

impl ResponseMetadataTarget for ResponseMetadata {
    fn set_organization(&mut self, organization: String) {
        self.organization = Some(organization);
    }
    fn set_request_id(&mut self, request_id: String) {
        self.request_id = Some(request_id);
    }
    fn set_processing_time(&mut self, processing_time: Duration) {
        self.processing_time = Some(processing_time);
    }
    fn set_api_version(&mut self, api_version: String) {
        self.api_version = Some(api_version);
    }
    fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }
    fn set_model(&mut self, model: String) {
        self.model = Some(model);
    }
}

impl ApiResponse for ResponseMetadata {
    fn metadata_target(&mut self) -> Option<&mut dyn ResponseMetadataTarget> {
        Some(self)
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Copy metadata headers into `target`.
///
/// Missing or unparsable headers leave the corresponding field untouched.
/// The model is only written when the payload did not already carry one.
pub fn apply_response_metadata(headers: &HeaderMap, target: &mut dyn ResponseMetadataTarget) {
    if let Some(v) = header_str(headers, ORGANIZATION_HEADER) {
        target.set_organization(v.to_string());
    }
    if let Some(v) = header_str(headers, REQUEST_ID_HEADER) {
        target.set_request_id(v.to_string());
    }
    if let Some(ms) = header_str(headers, PROCESSING_MS_HEADER).and_then(|v| v.parse::<u64>().ok())
    {
        target.set_processing_time(Duration::from_millis(ms));
    }
    if let Some(v) = header_str(headers, API_VERSION_HEADER) {
        target.set_api_version(v.to_string());
    }
    let has_model = target.model().is_some_and(|m| !m.is_empty());
    if !has_model && let Some(v) = header_str(headers, MODEL_HEADER) {
        target.set_model(v.to_string());
    }
}

/// Enrich a decoded payload if its type exposes the metadata capability.
pub fn enrich<T: ApiResponse>(value: &mut T, headers: &HeaderMap) {
    if let Some(target) = value.metadata_target() {
        apply_response_metadata(headers, target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[derive(Debug, Deserialize)]
    struct Completion {
        id: String,
        model: Option<String>,
        #[serde(skip)]
        meta: ResponseMetadata,
    }

    impl ResponseMetadataTarget for Completion {
        fn set_organization(&mut self, v: String) {
            self.meta.organization = Some(v);
        }
        fn set_request_id(&mut self, v: String) {
            self.meta.request_id = Some(v);
        }
        fn set_processing_time(&mut self, v: Duration) {
            self.meta.processing_time = Some(v);
        }
        fn set_api_version(&mut self, v: String) {
            self.meta.api_version = Some(v);
        }
        fn model(&self) -> Option<&str> {
            self.model.as_deref()
        }
        fn set_model(&mut self, v: String) {
            self.model = Some(v);
        }
    }

    impl ApiResponse for Completion {
        fn metadata_target(&mut self) -> Option<&mut dyn ResponseMetadataTarget> {
            Some(self)
        }
    }

    fn headers() -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(ORGANIZATION_HEADER, HeaderValue::from_static("org-1"));
        h.insert(REQUEST_ID_HEADER, HeaderValue::from_static("req-9"));
        h.insert(PROCESSING_MS_HEADER, HeaderValue::from_static("250"));
        h.insert(API_VERSION_HEADER, HeaderValue::from_static("2020-10-01"));
        h.insert(MODEL_HEADER, HeaderValue::from_static("gpt-4o"));
        h
    }

    #[test]
    fn copies_all_headers_into_metadata() {
        let meta = ResponseMetadata::from_headers(&headers());
        assert_eq!(meta.organization.as_deref(), Some("org-1"));
        assert_eq!(meta.request_id.as_deref(), Some("req-9"));
        assert_eq!(meta.processing_time, Some(Duration::from_millis(250)));
        assert_eq!(meta.api_version.as_deref(), Some("2020-10-01"));
        assert_eq!(meta.model.as_deref(), Some("gpt-4o"));
    }

    #[test]
    fn existing_model_is_never_overwritten() {
        let mut c: Completion =
            serde_json::from_str(r#"{"id":"c1","model":"gpt-3.5-turbo"}"#).unwrap();
        enrich(&mut c, &headers());
        assert_eq!(c.model.as_deref(), Some("gpt-3.5-turbo"));
        assert_eq!(c.meta.request_id.as_deref(), Some("req-9"));
        assert_eq!(c.id, "c1");
    }

    #[test]
    fn empty_model_is_filled_from_header() {
        let mut c: Completion = serde_json::from_str(r#"{"id":"c1","model":""}"#).unwrap();
        enrich(&mut c, &headers());
        assert_eq!(c.model.as_deref(), Some("gpt-4o"));
    }

    #[test]
    fn missing_or_bad_headers_leave_defaults() {
        let mut h = HeaderMap::new();
        h.insert(PROCESSING_MS_HEADER, HeaderValue::from_static("fast"));
        let meta = ResponseMetadata::from_headers(&h);
        assert_eq!(meta, ResponseMetadata::default());
    }

    #[test]
    fn plain_values_are_not_enriched() {
        let mut v = serde_json::json!({"model": null});
        enrich(&mut v, &headers());
        assert!(v["model"].is_null());
    }
}
