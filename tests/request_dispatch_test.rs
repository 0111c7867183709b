//! Request dispatch tests against a mock server.

use serde::{Deserialize, Serialize};
use siumai_transport::content::MultipartBuilder;
use siumai_transport::correlation::{ArtifactSink, FileCorrelationLogger};
use siumai_transport::retry::STILL_PROCESSING_MESSAGE;
use siumai_transport::{
    ApiResponse, AzureEndpoint, CallOptions, ContentFactory, DeleteRetryPolicy, ErrorKind,
    MultipartFactory, OpenAiEndpoint, OperationResult, ProviderEndpoint, RequestDispatcher,
    TransportConfig, TransportCore,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

#[derive(Debug, Deserialize)]
struct FileObject {
    id: String,
    bytes: u64,
}

impl ApiResponse for FileObject {}

#[derive(Debug, Deserialize)]
struct DeletionStatus {
    id: String,
    deleted: bool,
}

impl ApiResponse for DeletionStatus {}

#[derive(Serialize)]
struct FileUpload {
    purpose: &'static str,
    file_name: &'static str,
}

fn openai(server: &MockServer) -> (RequestDispatcher, OpenAiEndpoint) {
    let endpoint = OpenAiEndpoint::new("test-key")
        .with_base_url(format!("{}/v1", server.uri()))
        .with_organization("org-123");
    let config = TransportConfig::builder()
        .delete_retry(DeleteRetryPolicy::new().with_delay(Duration::from_millis(5)))
        .build();
    let core = TransportCore::builder(Arc::new(endpoint.clone()))
        .config(config)
        .build()
        .expect("transport");
    (RequestDispatcher::new(Arc::new(core)), endpoint)
}

#[tokio::test]
async fn delete_succeeds_once_processing_finishes() {
    let server = MockServer::start().await;
    let processing = serde_json::json!({
        "error": {"message": STILL_PROCESSING_MESSAGE, "type": "invalid_request_error"}
    });
    Mock::given(method("DELETE"))
        .and(path("/v1/files/file-abc"))
        .respond_with(ResponseTemplate::new(400).set_body_json(processing))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/v1/files/file-abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "file-abc", "object": "file", "deleted": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (dispatcher, endpoint) = openai(&server);
    let res: OperationResult<DeletionStatus> = dispatcher
        .delete_with_retry(&endpoint.url_for("files/file-abc"), &CallOptions::new())
        .await;

    let status = res.into_result().expect("deleted after retries");
    assert_eq!(status.id, "file-abc");
    assert!(status.deleted);
}

#[tokio::test]
async fn delete_does_not_retry_other_failures() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/v1/files/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("No such File object"))
        .expect(1)
        .mount(&server)
        .await;

    let (dispatcher, endpoint) = openai(&server);
    let res: OperationResult<DeletionStatus> = dispatcher
        .delete_with_retry(&endpoint.url_for("files/missing"), &CallOptions::new())
        .await;

    let err = res.into_result().unwrap_err();
    assert_eq!(err.kind, ErrorKind::Protocol);
    assert_eq!(err.status_code, 404);
    assert_eq!(err.message, "No such File object");
}

#[tokio::test]
async fn azure_requests_use_api_key_and_deployment_urls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/openai/deployments/gpt-4o/chat/completions"))
        .and(query_param("api-version", "2024-06-01"))
        .and(header("api-key", "azure-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "chatcmpl-1", "model": "gpt-4o"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let endpoint = AzureEndpoint::new(server.uri(), "gpt-4o", Some("azure-key".into()))
        .unwrap()
        .with_api_version("2024-06-01");
    let url = endpoint.url_for("chat/completions");
    let core = TransportCore::builder(Arc::new(endpoint)).build().unwrap();
    let dispatcher = RequestDispatcher::new(Arc::new(core));

    let res: OperationResult<serde_json::Value> = dispatcher
        .post(&url, &serde_json::json!({"messages": []}), &CallOptions::new())
        .await;
    assert_eq!(res.value().unwrap()["id"], "chatcmpl-1");
}

#[tokio::test]
async fn streamed_file_upload_is_sent_as_multipart() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/files"))
        .and(header("openai-organization", "org-123"))
        .and(|req: &Request| {
            let ct = req
                .headers
                .get("content-type")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            let body = String::from_utf8_lossy(&req.body);
            ct.starts_with("multipart/form-data; boundary=")
                && body.contains("name=\"purpose\"")
                && body.contains("fine-tune")
                && body.contains("filename=\"train.jsonl\"")
                && body.contains("{\"prompt\":\"a\"}")
        })
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "file-xyz", "object": "file", "bytes": 15
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let file_path = dir.path().join("train.jsonl");
    std::fs::write(&file_path, "{\"prompt\":\"a\"}\n").unwrap();
    let len = std::fs::metadata(&file_path).unwrap().len();

    let factory = MultipartFactory(
        move |req: &FileUpload| -> siumai_transport::error::Result<MultipartBuilder> {
            let file = std::fs::File::open(&file_path)
                .map(tokio::fs::File::from_std)
                .map_err(siumai_transport::TransportError::from)?;
            MultipartBuilder::new()
                .text("purpose", req.purpose)
                .reader("file", req.file_name, file, Some(len))
        },
    );
    let factory: &dyn ContentFactory<FileUpload> = &factory;

    let (dispatcher, endpoint) = openai(&server);
    let upload = FileUpload {
        purpose: "fine-tune",
        file_name: "train.jsonl",
    };
    let res: OperationResult<FileObject> = dispatcher
        .post_with(&endpoint.url_for("files"), Some(&upload), factory, &CallOptions::new())
        .await;

    let file = res.into_result().expect("uploaded");
    assert_eq!(file.id, "file-xyz");
    assert_eq!(file.bytes, 15);
}

#[tokio::test]
async fn concurrent_calls_share_one_dispatcher() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"object": "list", "data": []}))
                .set_delay(Duration::from_millis(20)),
        )
        .expect(8)
        .mount(&server)
        .await;

    let (dispatcher, endpoint) = openai(&server);
    let url = endpoint.url_for("models");
    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let dispatcher = dispatcher.clone();
            let url = url.clone();
            tokio::spawn(async move {
                dispatcher
                    .get::<serde_json::Value>(&url, &CallOptions::new())
                    .await
            })
        })
        .collect();

    for task in tasks {
        let res = task.await.unwrap();
        assert_eq!(res.value().unwrap()["object"], "list");
    }
}

#[derive(Default)]
struct MemorySink(Mutex<Vec<(String, String)>>);

#[async_trait::async_trait]
impl ArtifactSink for MemorySink {
    async fn write_artifact(&self, name: &str, contents: &str) -> std::io::Result<()> {
        self.0
            .lock()
            .unwrap()
            .push((name.to_string(), contents.to_string()));
        Ok(())
    }
}

#[tokio::test]
async fn request_and_response_bodies_are_logged_in_sequence() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"object":"list"}"#))
        .mount(&server)
        .await;

    let sink = Arc::new(MemorySink::default());
    let endpoint = OpenAiEndpoint::new("test-key").with_base_url(format!("{}/v1", server.uri()));
    let url = endpoint.url_for("embeddings");
    let core = TransportCore::builder(Arc::new(endpoint))
        .correlation_logger(Arc::new(FileCorrelationLogger::with_sink(sink.clone())))
        .build()
        .unwrap();
    let dispatcher = RequestDispatcher::new(Arc::new(core));

    let res: OperationResult<serde_json::Value> = dispatcher
        .post(&url, &serde_json::json!({"input": "hi"}), &CallOptions::new())
        .await;
    assert!(res.is_success());

    let written = sink.0.lock().unwrap().clone();
    assert_eq!(written.len(), 2);
    let ctx = written[0].0.split('_').next().unwrap().to_string();
    assert_eq!(written[0].0, format!("{ctx}_0_Value"));
    assert_eq!(written[0].1, r#"{"input":"hi"}"#);
    assert_eq!(written[1].0, format!("{ctx}_1_Value"));
    assert_eq!(written[1].1, r#"{"object":"list"}"#);
}
