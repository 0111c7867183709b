//! Transport configuration
//!
//! `TransportConfig` carries everything the dispatchers need that is not
//! request-specific: HTTP client settings, default headers, streaming
//! behaviour, correlation logging and the delete retry policy.

use crate::error::TransportError;
use crate::retry::DeleteRetryPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_USER_AGENT: &str = concat!("siumai-transport/", env!("CARGO_PKG_VERSION"));

pub const STREAM_DISABLE_COMPRESSION_ENV: &str = "SIUMAI_STREAM_DISABLE_COMPRESSION";
pub const LOG_DIR_ENV: &str = "SIUMAI_TRANSPORT_LOG_DIR";

/// Transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Request timeout enforced by the HTTP client
    #[serde(with = "duration_option_serde")]
    pub timeout: Option<Duration>,
    /// Connection timeout
    #[serde(with = "duration_option_serde")]
    pub connect_timeout: Option<Duration>,
    /// User agent
    pub user_agent: Option<String>,
    /// Headers sent with every request (after endpoint headers)
    pub default_headers: HashMap<String, String>,
    /// Send `Accept-Encoding: identity` on SSE requests so intermediaries do
    /// not buffer compressed streams. Default is `true`.
    pub stream_disable_compression: bool,
    /// Directory for correlation artifacts; logging is disabled when unset
    pub log_dir: Option<PathBuf>,
    /// Delete retry for still-processing files
    #[serde(skip)]
    pub delete_retry: DeleteRetryPolicy,
}

fn env_flag(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(val) => {
            let v = val.trim().to_lowercase();
            !(v == "false" || v == "0" || v == "off" || v == "no")
        }
        Err(_) => default,
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Some(DEFAULT_REQUEST_TIMEOUT),
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
            user_agent: Some(DEFAULT_USER_AGENT.to_string()),
            default_headers: HashMap::new(),
            stream_disable_compression: env_flag(STREAM_DISABLE_COMPRESSION_ENV, true),
            log_dir: std::env::var_os(LOG_DIR_ENV)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            delete_retry: DeleteRetryPolicy::default(),
        }
    }
}

impl TransportConfig {
    pub fn builder() -> TransportConfigBuilder {
        TransportConfigBuilder::new()
    }

    /// Build a `reqwest::Client` honouring timeouts and user agent.
    pub fn build_http_client(&self) -> Result<reqwest::Client, TransportError> {
        let mut builder = reqwest::Client::builder();
        if let Some(t) = self.timeout {
            builder = builder.timeout(t);
        }
        if let Some(t) = self.connect_timeout {
            builder = builder.connect_timeout(t);
        }
        if let Some(ua) = &self.user_agent {
            builder = builder.user_agent(ua.clone());
        }
        builder
            .build()
            .map_err(|e| TransportError::Configuration(format!("Failed to build HTTP client: {e}")))
    }
}

/// Builder for `TransportConfig`
#[derive(Debug, Clone, Default)]
pub struct TransportConfigBuilder {
    timeout: Option<Option<Duration>>,
    connect_timeout: Option<Option<Duration>>,
    user_agent: Option<Option<String>>,
    default_headers: HashMap<String, String>,
    stream_disable_compression: Option<bool>,
    log_dir: Option<PathBuf>,
    delete_retry: Option<DeleteRetryPolicy>,
}

impl TransportConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = Some(timeout);
        self
    }
    pub fn connect_timeout(mut self, connect_timeout: Option<Duration>) -> Self {
        self.connect_timeout = Some(connect_timeout);
        self
    }
    pub fn user_agent<S: Into<String>>(mut self, user_agent: Option<S>) -> Self {
        self.user_agent = Some(user_agent.map(Into::into));
        self
    }
    pub fn header<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.default_headers.insert(key.into(), value.into());
        self
    }
    pub fn headers(mut self, headers: HashMap<String, String>) -> Self {
        self.default_headers.extend(headers);
        self
    }
    pub fn stream_disable_compression(mut self, val: bool) -> Self {
        self.stream_disable_compression = Some(val);
        self
    }
    pub fn log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }
    pub fn delete_retry(mut self, policy: DeleteRetryPolicy) -> Self {
        self.delete_retry = Some(policy);
        self
    }

    pub fn build(self) -> TransportConfig {
        let defaults = TransportConfig::default();
        TransportConfig {
            timeout: self.timeout.unwrap_or(defaults.timeout),
            connect_timeout: self.connect_timeout.unwrap_or(defaults.connect_timeout),
            user_agent: self.user_agent.unwrap_or(defaults.user_agent),
            default_headers: self.default_headers,
            stream_disable_compression: self
                .stream_disable_compression
                .unwrap_or(defaults.stream_disable_compression),
            log_dir: self.log_dir.or(defaults.log_dir),
            delete_retry: self.delete_retry.unwrap_or(defaults.delete_retry),
        }
    }
}

// Helper module for Duration serialization
mod duration_option_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => d.as_secs().serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs: Option<u64> = Option::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let cfg = TransportConfig::builder()
            .timeout(Some(Duration::from_secs(5)))
            .user_agent(None::<String>)
            .header("OpenAI-Beta", "assistants=v2")
            .stream_disable_compression(false)
            .delete_retry(DeleteRetryPolicy::new().with_max_attempts(5))
            .build();

        assert_eq!(cfg.timeout, Some(Duration::from_secs(5)));
        assert_eq!(cfg.connect_timeout, Some(DEFAULT_CONNECT_TIMEOUT));
        assert!(cfg.user_agent.is_none());
        assert_eq!(cfg.default_headers["OpenAI-Beta"], "assistants=v2");
        assert!(!cfg.stream_disable_compression);
        assert_eq!(cfg.delete_retry.max_attempts, 5);
        assert!(cfg.build_http_client().is_ok());
    }

    #[test]
    fn serializes_timeouts_as_seconds() {
        let cfg = TransportConfig::builder()
            .timeout(Some(Duration::from_secs(30)))
            .connect_timeout(None)
            .build();
        let v = serde_json::to_value(&cfg).unwrap();
        assert_eq!(v["timeout"], 30);
        assert!(v["connect_timeout"].is_null());

        let back: TransportConfig = serde_json::from_value(v).unwrap();
        assert_eq!(back.timeout, Some(Duration::from_secs(30)));
    }
}
