//! HTTP路由
//!
//! ```text
//! GET  /               健康检查
//! GET  /health         健康检查
//! POST /chat           医疗问答
//! POST /analyze        上传病历文件（multipart，字段 file）并分析
//! POST /analyze/text   分析文本病历
//! POST /analyze/image  读取图片或PDF
//! GET  /research       检索医学资料（q, lang, max_results）
//! POST /research       检索医学资料
//! ```

use axum::{
    Json,
    extract::multipart::MultipartError,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use medicare_ai::context::AppContext;
use medicare_ai::error::ServiceError;
use serde_json::json;
use std::future::Future;
use std::time::Duration;
use tracing::{error, warn};

pub mod analysis;
pub mod chat;
pub mod health;
pub mod research;

/// 接口错误，响应体为 `{"error": code, "message": text}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request", message)
    }

    pub fn timeout() -> Self {
        Self::new(StatusCode::GATEWAY_TIMEOUT, "timeout", "request timed out")
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        let (status, code) = match ServiceError::find(&err) {
            Some(ServiceError::InvalidRequest(_)) => (StatusCode::BAD_REQUEST, "invalid_request"),
            Some(ServiceError::UnsupportedMedia(_)) => {
                (StatusCode::UNSUPPORTED_MEDIA_TYPE, "unsupported_media")
            }
            Some(ServiceError::NotConfigured(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, "not_configured")
            }
            Some(ServiceError::Upstream(_)) => (StatusCode::BAD_GATEWAY, "upstream_error"),
            Some(ServiceError::MalformedOutput(_)) => (StatusCode::BAD_GATEWAY, "malformed_output"),
            None => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };

        // 只对外暴露分类错误的信息
        let message = match ServiceError::find(&err) {
            Some(service_error) => service_error.to_string(),
            None => "internal server error".to_string(),
        };
        if status.is_server_error() {
            error!(error = ?err, "request failed");
        }
        Self::new(status, code, message)
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        anyhow::Error::from(err).into()
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        let status = err.status();
        warn!(%status, error = %err.body_text(), "multipart upload rejected");
        let code = if status == StatusCode::PAYLOAD_TOO_LARGE {
            "payload_too_large"
        } else {
            "invalid_request"
        };
        Self::new(status, code, err.body_text())
    }
}

/// 请求体不是合法JSON、字段缺失或超出大小限制
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let status = rejection.status();
        warn!(%status, error = %rejection.body_text(), "request body rejected");
        let code = match status {
            StatusCode::PAYLOAD_TOO_LARGE => "payload_too_large",
            StatusCode::UNSUPPORTED_MEDIA_TYPE => "unsupported_media",
            _ => "invalid_request",
        };
        Self::new(status, code, rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({ "error": self.code, "message": self.message })),
        )
            .into_response()
    }
}

/// 按配置的请求超时执行链路调用
pub async fn with_timeout<T, F>(context: &AppContext, future: F) -> Result<T, ApiError>
where
    F: Future<Output = anyhow::Result<T>>,
{
    let limit = Duration::from_secs(context.settings().server.request_timeout_seconds);
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(_) => {
            warn!(timeout_seconds = limit.as_secs(), "request timed out");
            Err(ApiError::timeout())
        }
    }
}
