//! 服务错误分类

use thiserror::Error;

/// Failures a caller has to tell apart. Raised inside `anyhow::Error` and
/// recovered with `downcast_ref` where the distinction matters.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("unsupported media type: {0}")]
    UnsupportedMedia(String),

    #[error("upstream service error: {0}")]
    Upstream(String),

    #[error("model returned malformed output: {0}")]
    MalformedOutput(String),
}

impl ServiceError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// 从anyhow错误链中找出分类
    pub fn find(err: &anyhow::Error) -> Option<&ServiceError> {
        err.chain().find_map(|cause| cause.downcast_ref::<ServiceError>())
    }
}
