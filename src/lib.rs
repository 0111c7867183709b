//! siumai-transport
//!
//! Typed HTTP and SSE dispatch for OpenAI-style APIs. Every call resolves to
//! an [`OperationResult`]; streams decode `data:`/`event:` lines into
//! [`AsyncEvent`]s through either a pull [`EventStream`] or a push callback.
#![deny(unsafe_code)]

pub mod cancel;
pub mod config;
pub mod content;
pub mod correlation;
pub mod dispatcher;
pub mod endpoint;
pub mod error;
pub mod headers;
pub mod interceptor;
pub mod metadata;
pub mod request;
pub mod result;
pub mod retry;

pub use cancel::CancellationToken;
pub use config::TransportConfig;
pub use content::{ContentFactory, MultipartBuilder, MultipartFactory, RequestBody};
pub use correlation::{CorrelationLogger, FileCorrelationLogger, LogContext, TypeTag};
pub use dispatcher::{
    AsyncEvent, CallOptions, EventStream, RequestDispatcher, SseStreamDispatcher, StreamOutcome,
    TransportCore,
};
pub use endpoint::{AzureEndpoint, OpenAiEndpoint, ProviderEndpoint};
pub use error::{ErrorKind, TransportError};
pub use metadata::{ApiResponse, ResponseMetadata, ResponseMetadataTarget};
pub use request::RequestSpec;
pub use result::{OperationError, OperationResult, Outcome};
pub use retry::DeleteRetryPolicy;

/// Common imports for façade crates built on the transport.
pub mod prelude {
    pub use crate::{
        ApiResponse, AsyncEvent, CallOptions, CancellationToken, ContentFactory, ErrorKind,
        EventStream, MultipartBuilder, MultipartFactory, OperationResult, Outcome,
        ProviderEndpoint, RequestDispatcher, ResponseMetadata, SseStreamDispatcher,
        StreamOutcome, TransportConfig, TransportCore,
    };
}

static_assertions::assert_impl_all!(RequestDispatcher: Send, Sync, Clone);
static_assertions::assert_impl_all!(SseStreamDispatcher: Send, Sync, Clone);
static_assertions::assert_impl_all!(OperationResult<serde_json::Value>: Send, Sync);
