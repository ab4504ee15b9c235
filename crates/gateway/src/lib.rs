use std::sync::Arc;

mod gateway;
mod http;

pub use gateway::{
    AskRequest, AskResponse, BoxFuture, DEFAULT_BASE_URL, DEFAULT_REQUEST_TIMEOUT, FailureKind,
    GENERIC_ASK_FAILURE, GENERIC_UPLOAD_FAILURE, Gateway, GatewayConfig, GatewayError,
    GatewayResult, UploadFile, UploadReceipt,
};
pub use http::{ASK_PATH, HttpGateway, UPLOAD_FIELD, UPLOAD_PATH};

/// Builds the HTTP gateway for `config`, type-erased for sharing across sessions.
pub fn create_gateway(config: GatewayConfig) -> GatewayResult<Arc<dyn Gateway>> {
    tracing::info!(base_url = %config.base_url, "initializing document gateway");
    Ok(Arc::new(HttpGateway::new(config)?))
}
