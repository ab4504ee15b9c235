use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, Url};
use serde::Deserialize;
use snafu::ResultExt;

use super::gateway::{
    AskRequest, AskResponse, BoxFuture, BuildClientSnafu, DecodeResponseSnafu, Gateway,
    GatewayConfig, GatewayError, GatewayResult, InvalidBaseUrlSnafu, TransportSnafu, UploadFile,
    UploadReceipt,
};

pub const UPLOAD_PATH: &str = "upload";
pub const ASK_PATH: &str = "ask";
/// Multipart field name repeated once per uploaded file.
pub const UPLOAD_FIELD: &str = "files";

#[derive(Debug, Deserialize)]
struct UploadAck {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HttpGateway {
    config: GatewayConfig,
    base_url: Url,
    client: Client,
}

impl HttpGateway {
    pub fn new(config: GatewayConfig) -> GatewayResult<Self> {
        let base_url = Self::normalize_base_url(&config.base_url)?;
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context(BuildClientSnafu {
                stage: "http-gateway-new",
            })?;

        Ok(Self {
            config,
            base_url,
            client,
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    fn normalize_base_url(raw: &str) -> GatewayResult<Url> {
        // `Url::join` replaces the last path segment unless the base ends in a slash.
        let with_slash = if raw.ends_with('/') {
            raw.to_string()
        } else {
            format!("{raw}/")
        };

        Url::parse(&with_slash).context(InvalidBaseUrlSnafu {
            stage: "parse-base-url",
            base_url: raw.to_string(),
        })
    }

    fn endpoint(&self, path: &'static str) -> GatewayResult<Url> {
        self.base_url.join(path).context(InvalidBaseUrlSnafu {
            stage: "join-endpoint",
            base_url: self.config.base_url.clone(),
        })
    }

    async fn send_upload(&self, files: Vec<UploadFile>) -> GatewayResult<UploadReceipt> {
        let url = self.endpoint(UPLOAD_PATH)?;
        let file_count = files.len();

        let form = files.into_iter().fold(Form::new(), |form, file| {
            form.part(
                UPLOAD_FIELD,
                Part::stream(file.payload).file_name(file.name),
            )
        });

        let response = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .await
            .context(TransportSnafu {
                stage: "send-upload-request",
            })?;

        let response = Self::ensure_success(response, "upload-http-status").await?;
        let body = response.text().await.context(TransportSnafu {
            stage: "read-upload-response",
        })?;

        let message = serde_json::from_str::<UploadAck>(&body)
            .ok()
            .and_then(|ack| ack.message);

        tracing::debug!(file_count, ?message, "gateway accepted upload");
        Ok(UploadReceipt { message })
    }

    async fn send_ask(&self, request: AskRequest) -> GatewayResult<AskResponse> {
        let url = self.endpoint(ASK_PATH)?;

        let response = self
            .client
            .post(url)
            .json(&request)
            .send()
            .await
            .context(TransportSnafu {
                stage: "send-ask-request",
            })?;

        let response = Self::ensure_success(response, "ask-http-status").await?;
        let answer = response
            .json::<AskResponse>()
            .await
            .context(DecodeResponseSnafu {
                stage: "decode-ask-response",
            })?;

        tracing::debug!(answer_len = answer.answer.len(), "gateway answered question");
        Ok(answer)
    }

    async fn ensure_success(response: Response, stage: &'static str) -> GatewayResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        // An unreadable error body still counts as a rejection; only the detail is lost.
        let detail = match response.text().await {
            Ok(body) => Self::extract_detail(&body),
            Err(error) => {
                tracing::warn!(status = status.as_u16(), %error, "failed to read rejection body");
                None
            }
        };

        tracing::warn!(status = status.as_u16(), ?detail, stage, "gateway rejected request");
        Err(GatewayError::Rejected {
            stage,
            status: status.as_u16(),
            detail,
        })
    }

    fn extract_detail(body: &str) -> Option<String> {
        let value = serde_json::from_str::<serde_json::Value>(body).ok()?;
        match value.get("detail")? {
            serde_json::Value::Null => None,
            serde_json::Value::String(detail) => Some(detail.clone()),
            other => Some(other.to_string()),
        }
    }
}

impl Gateway for HttpGateway {
    fn upload<'a>(&'a self, files: Vec<UploadFile>) -> BoxFuture<'a, GatewayResult<UploadReceipt>> {
        Box::pin(self.send_upload(files))
    }

    fn ask<'a>(&'a self, request: AskRequest) -> BoxFuture<'a, GatewayResult<AskResponse>> {
        Box::pin(self.send_ask(request))
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;
    use crate::gateway::FailureKind;

    fn gateway_for(server: &MockServer) -> HttpGateway {
        HttpGateway::new(GatewayConfig::new(server.base_url())).expect("valid base url")
    }

    #[test]
    fn extract_detail_reads_string_and_structured_details() {
        assert_eq!(
            HttpGateway::extract_detail(r#"{"detail":"bad format"}"#).as_deref(),
            Some("bad format")
        );
        assert_eq!(
            HttpGateway::extract_detail(r#"{"detail":[{"msg":"field required"}]}"#).as_deref(),
            Some(r#"[{"msg":"field required"}]"#)
        );
        assert_eq!(HttpGateway::extract_detail(r#"{"detail":null}"#), None);
        assert_eq!(HttpGateway::extract_detail("Internal Server Error"), None);
    }

    #[test]
    fn invalid_base_url_is_rejected_at_construction() {
        let error = HttpGateway::new(GatewayConfig::new("not a url")).expect_err("invalid url");
        assert!(matches!(error, GatewayError::InvalidBaseUrl { .. }));
        assert_eq!(error.kind(), FailureKind::Transport);
    }

    #[test]
    fn base_url_path_prefix_is_kept() {
        let gateway =
            HttpGateway::new(GatewayConfig::new("http://localhost:8000/api")).expect("valid url");
        let url = gateway.endpoint(ASK_PATH).expect("joinable");
        assert_eq!(url.as_str(), "http://localhost:8000/api/ask");
    }

    #[tokio::test]
    async fn ask_posts_question_json_and_decodes_answer() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/ask")
                    .json_body(json!({ "question": "What is the refund policy?" }));
                then.status(200)
                    .json_body(json!({ "answer": "You have 30 days." }));
            })
            .await;

        let response = gateway_for(&server)
            .ask(AskRequest::new("What is the refund policy?"))
            .await
            .expect("answer");

        mock.assert_async().await;
        assert_eq!(response.answer, "You have 30 days.");
    }

    #[tokio::test]
    async fn ask_rejection_carries_server_detail() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/ask");
                then.status(500).json_body(json!({ "detail": "index not built" }));
            })
            .await;

        let error = gateway_for(&server)
            .ask(AskRequest::new("anything"))
            .await
            .expect_err("rejected");

        assert!(matches!(error, GatewayError::Rejected { status: 500, .. }));
        assert_eq!(error.detail(), Some("index not built"));
    }

    #[tokio::test]
    async fn ask_with_malformed_success_body_is_a_transport_failure() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/ask");
                then.status(200).body("not json");
            })
            .await;

        let error = gateway_for(&server)
            .ask(AskRequest::new("anything"))
            .await
            .expect_err("undecodable");

        assert!(matches!(error, GatewayError::DecodeResponse { .. }));
        assert_eq!(error.kind(), FailureKind::Transport);
    }

    #[tokio::test]
    async fn upload_sends_every_file_under_the_files_field() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/upload")
                    .body_contains("name=\"files\"")
                    .body_contains("filename=\"a.pdf\"")
                    .body_contains("filename=\"b.pdf\"")
                    .body_contains("first payload");
                then.status(200)
                    .json_body(json!({ "message": "Files processed successfully" }));
            })
            .await;

        let receipt = gateway_for(&server)
            .upload(vec![
                UploadFile::new("a.pdf", "first payload"),
                UploadFile::new("b.pdf", "second payload"),
            ])
            .await
            .expect("accepted");

        mock.assert_async().await;
        assert_eq!(
            receipt.message.as_deref(),
            Some("Files processed successfully")
        );
    }

    #[tokio::test]
    async fn upload_rejection_without_json_body_has_no_detail() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/upload");
                then.status(502).body("Bad Gateway");
            })
            .await;

        let error = gateway_for(&server)
            .upload(vec![UploadFile::new("a.pdf", "x")])
            .await
            .expect_err("rejected");

        assert_eq!(error.kind(), FailureKind::Rejection);
        assert_eq!(error.detail(), None);
    }

    #[tokio::test]
    async fn unreachable_gateway_is_a_transport_failure() {
        // Port 9 (discard) is not expected to accept HTTP connections in test environments.
        let gateway = HttpGateway::new(GatewayConfig::new("http://127.0.0.1:9")).expect("valid");
        let error = gateway
            .ask(AskRequest::new("anyone there?"))
            .await
            .expect_err("connection refused");

        assert!(matches!(error, GatewayError::Transport { .. }));
        assert_eq!(error.kind(), FailureKind::Transport);
    }
}
