use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use snafu::Snafu;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Generic failure text for uploads that produced no server detail.
pub const GENERIC_UPLOAD_FAILURE: &str = "Error uploading files.";
/// Generic failure text for questions that produced no server detail.
pub const GENERIC_ASK_FAILURE: &str = "Error fetching answer.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub base_url: String,
    pub request_timeout: Duration,
}

impl GatewayConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim().to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

/// One named payload in an upload batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub name: String,
    pub payload: Bytes,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            payload: payload.into(),
        }
    }
}

/// Acknowledgement of an accepted upload; the server message is informational only.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UploadReceipt {
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AskRequest {
    pub question: String,
}

impl AskRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AskResponse {
    pub answer: String,
}

impl AskResponse {
    pub fn new(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
        }
    }
}

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
pub type GatewayResult<T> = Result<T, GatewayError>;

/// How a failed gateway call should be presented to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The call never produced a usable response.
    Transport,
    /// The server answered with a non-success status.
    Rejection,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum GatewayError {
    #[snafu(display("gateway base url '{base_url}' is invalid on `{stage}`: {source}"))]
    InvalidBaseUrl {
        stage: &'static str,
        base_url: String,
        source: url::ParseError,
    },
    #[snafu(display("failed to build http client on `{stage}`: {source}"))]
    BuildClient {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("gateway request failed on `{stage}`: {source}"))]
    Transport {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display(
        "gateway rejected request on `{stage}` with status {status}: {}",
        detail.as_deref().unwrap_or("no detail")
    ))]
    Rejected {
        stage: &'static str,
        status: u16,
        detail: Option<String>,
    },
    #[snafu(display("failed to decode gateway response on `{stage}`: {source}"))]
    DecodeResponse {
        stage: &'static str,
        source: reqwest::Error,
    },
}

impl GatewayError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Rejected { .. } => FailureKind::Rejection,
            Self::InvalidBaseUrl { .. }
            | Self::BuildClient { .. }
            | Self::Transport { .. }
            | Self::DecodeResponse { .. } => FailureKind::Transport,
        }
    }

    /// Server-provided detail, if the server sent a non-blank one.
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Rejected {
                detail: Some(detail),
                ..
            } if !detail.trim().is_empty() => Some(detail.as_str()),
            _ => None,
        }
    }

    /// Text shown to the user: the server detail verbatim, otherwise `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        self.detail().unwrap_or(fallback).to_string()
    }
}

/// Request/response boundary used for document ingestion and questions.
pub trait Gateway: Send + Sync {
    fn upload<'a>(&'a self, files: Vec<UploadFile>) -> BoxFuture<'a, GatewayResult<UploadReceipt>>;
    fn ask<'a>(&'a self, request: AskRequest) -> BoxFuture<'a, GatewayResult<AskResponse>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(detail: Option<&str>) -> GatewayError {
        GatewayError::Rejected {
            stage: "test",
            status: 500,
            detail: detail.map(str::to_string),
        }
    }

    #[test]
    fn rejection_detail_is_surfaced_verbatim() {
        let error = rejected(Some("bad format"));
        assert_eq!(error.kind(), FailureKind::Rejection);
        assert_eq!(error.user_message(GENERIC_UPLOAD_FAILURE), "bad format");
    }

    #[test]
    fn missing_or_blank_detail_falls_back_to_generic_text() {
        assert_eq!(
            rejected(None).user_message(GENERIC_ASK_FAILURE),
            GENERIC_ASK_FAILURE
        );
        assert_eq!(
            rejected(Some("  ")).user_message(GENERIC_ASK_FAILURE),
            GENERIC_ASK_FAILURE
        );
    }

    #[test]
    fn config_trims_base_url() {
        let config = GatewayConfig::new("  http://localhost:9000 ");
        assert_eq!(config.base_url, "http://localhost:9000");
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
    }
}
