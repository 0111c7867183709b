//! Provider endpoints
//!
//! A provider endpoint knows where requests go and how to authenticate them.
//! The dispatchers only call [`ProviderEndpoint::build_headers`]; façades use
//! [`ProviderEndpoint::url_for`] to turn a resource path into a request URI.

use crate::error::TransportError;
use crate::headers::HttpHeaderBuilder;
use reqwest::header::HeaderMap;
use secrecy::{ExposeSecret, SecretString};

pub const OPENAI_DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const AZURE_API_KEY_ENV: &str = "AZURE_OPENAI_API_KEY";
pub const AZURE_DEFAULT_API_VERSION: &str = "2024-10-21";

/// Source of authentication headers and base URIs.
pub trait ProviderEndpoint: Send + Sync {
    /// Identifier used in logs and interceptor contexts.
    fn id(&self) -> &str;

    /// Authentication and provider-specific headers for every request.
    fn build_headers(&self) -> Result<HeaderMap, TransportError>;

    /// Absolute URI for a resource path such as `chat/completions`.
    fn url_for(&self, path: &str) -> String;
}

fn api_key_from(explicit: Option<String>, env_key: &str) -> Result<SecretString, TransportError> {
    if let Some(key) = explicit.filter(|k| !k.is_empty()) {
        return Ok(SecretString::from(key));
    }
    match std::env::var(env_key) {
        Ok(v) if !v.is_empty() => Ok(SecretString::from(v)),
        _ => Err(TransportError::Configuration(format!(
            "API key is required (missing {env_key} or explicit api key)"
        ))),
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// OpenAI-style endpoint: bearer auth plus optional organization/project.
#[derive(Debug, Clone)]
pub struct OpenAiEndpoint {
    api_key: SecretString,
    base_url: String,
    organization: Option<String>,
    project: Option<String>,
}

impl OpenAiEndpoint {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::from(api_key.into()),
            base_url: OPENAI_DEFAULT_BASE_URL.to_string(),
            organization: None,
            project: None,
        }
    }

    /// Read the API key from `OPENAI_API_KEY`.
    pub fn from_env() -> Result<Self, TransportError> {
        let api_key = api_key_from(None, OPENAI_API_KEY_ENV)?;
        Ok(Self {
            api_key,
            base_url: OPENAI_DEFAULT_BASE_URL.to_string(),
            organization: None,
            project: None,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }
}

impl ProviderEndpoint for OpenAiEndpoint {
    fn id(&self) -> &str {
        "openai"
    }

    fn build_headers(&self) -> Result<HeaderMap, TransportError> {
        Ok(HttpHeaderBuilder::new()
            .with_bearer_auth(self.api_key.expose_secret())?
            .with_optional_header("openai-organization", self.organization.as_deref())?
            .with_optional_header("openai-project", self.project.as_deref())?
            .build())
    }

    fn url_for(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }
}

/// Azure OpenAI endpoint: `api-key` header and deployment-scoped URIs.
#[derive(Debug, Clone)]
pub struct AzureEndpoint {
    api_key: SecretString,
    resource_url: String,
    deployment: String,
    api_version: String,
}

impl AzureEndpoint {
    pub fn new(
        resource_url: impl Into<String>,
        deployment: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self, TransportError> {
        Ok(Self {
            api_key: api_key_from(api_key, AZURE_API_KEY_ENV)?,
            resource_url: resource_url.into(),
            deployment: deployment.into(),
            api_version: AZURE_DEFAULT_API_VERSION.to_string(),
        })
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }
}

impl ProviderEndpoint for AzureEndpoint {
    fn id(&self) -> &str {
        "azure"
    }

    fn build_headers(&self) -> Result<HeaderMap, TransportError> {
        Ok(HttpHeaderBuilder::new()
            .with_custom_auth("api-key", self.api_key.expose_secret())?
            .build())
    }

    fn url_for(&self, path: &str) -> String {
        let base = join_url(
            &self.resource_url,
            &format!(
                "openai/deployments/{}",
                urlencoding::encode(&self.deployment)
            ),
        );
        let url = join_url(&base, path);
        let sep = if url.contains('?') { '&' } else { '?' };
        format!(
            "{url}{sep}api-version={}",
            urlencoding::encode(&self.api_version)
        )
    }
}
