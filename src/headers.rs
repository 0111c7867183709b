//! HTTP header helpers
//!
//! Header construction shared by provider endpoints and the dispatchers.

use crate::error::TransportError;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use std::collections::HashMap;

fn header_name(name: &str) -> Result<HeaderName, TransportError> {
    HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| TransportError::Configuration(format!("Invalid header name '{name}': {e}")))
}

fn header_value(value: &str) -> Result<HeaderValue, TransportError> {
    HeaderValue::from_str(value)
        .map_err(|e| TransportError::Configuration(format!("Invalid header value: {e}")))
}

/// HTTP header builder for API requests
#[derive(Debug, Clone, Default)]
pub struct HttpHeaderBuilder {
    headers: HeaderMap,
}

impl HttpHeaderBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add Bearer token authorization
    pub fn with_bearer_auth(mut self, token: &str) -> Result<Self, TransportError> {
        let mut value = header_value(&format!("Bearer {token}"))
            .map_err(|e| TransportError::Configuration(format!("Invalid API key format: {e}")))?;
        value.set_sensitive(true);
        self.headers.insert(AUTHORIZATION, value);
        Ok(self)
    }

    /// Add a sensitive custom auth header (e.g. `api-key` for Azure)
    pub fn with_custom_auth(mut self, name: &str, value: &str) -> Result<Self, TransportError> {
        let mut value = header_value(value)?;
        value.set_sensitive(true);
        self.headers.insert(header_name(name)?, value);
        Ok(self)
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, TransportError> {
        self.headers.insert(header_name(name)?, header_value(value)?);
        Ok(self)
    }

    /// Add a header only when a value is present
    pub fn with_optional_header(
        self,
        name: &str,
        value: Option<&str>,
    ) -> Result<Self, TransportError> {
        match value {
            Some(v) if !v.is_empty() => self.with_header(name, v),
            _ => Ok(self),
        }
    }

    pub fn with_custom_headers(
        mut self,
        custom_headers: &HashMap<String, String>,
    ) -> Result<Self, TransportError> {
        for (key, value) in custom_headers {
            self.headers.insert(header_name(key)?, header_value(value)?);
        }
        Ok(self)
    }

    pub fn build(self) -> HeaderMap {
        self.headers
    }
}

/// Overlay `extra` onto `base`; entries in `extra` replace same-named ones.
pub fn overlay_headers(base: &mut HeaderMap, extra: &HeaderMap) {
    for name in extra.keys() {
        base.remove(name);
        for value in extra.get_all(name) {
            base.append(name.clone(), value.clone());
        }
    }
}

/// Convert a string map into a `HeaderMap`, rejecting invalid entries.
pub fn headers_from_map(map: &HashMap<String, String>) -> Result<HeaderMap, TransportError> {
    Ok(HttpHeaderBuilder::new().with_custom_headers(map)?.build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_builder() {
        let headers = HttpHeaderBuilder::new()
            .with_bearer_auth("test-token")
            .unwrap()
            .with_optional_header("openai-organization", None)
            .unwrap()
            .build();

        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer test-token");
        assert!(headers.get(AUTHORIZATION).unwrap().is_sensitive());
        assert!(headers.get("openai-organization").is_none());
    }

    #[test]
    fn overlay_replaces_existing_values() {
        let mut base = HttpHeaderBuilder::new()
            .with_header("OpenAI-Beta", "assistants=v1")
            .unwrap()
            .with_header("x-keep", "1")
            .unwrap()
            .build();
        let extra = HttpHeaderBuilder::new()
            .with_header("openai-beta", "assistants=v2")
            .unwrap()
            .build();

        overlay_headers(&mut base, &extra);
        assert_eq!(base.get("openai-beta").unwrap(), "assistants=v2");
        assert_eq!(base.get_all("openai-beta").iter().count(), 1);
        assert_eq!(base.get("x-keep").unwrap(), "1");
    }

    #[test]
    fn invalid_header_names_are_configuration_errors() {
        let mut map = HashMap::new();
        map.insert("bad header".to_string(), "v".to_string());
        let err = headers_from_map(&map).unwrap_err();
        assert!(matches!(err, TransportError::Configuration(_)));
    }
}
