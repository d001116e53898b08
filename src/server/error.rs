use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use log::{error, warn};

use super::types::ErrorResponse;
use crate::error::PipelineError;

pub type Result<T, E = AppError> = std::result::Result<T, E>;

/// API错误类型
pub struct AppError {
    status: StatusCode,
    error: anyhow::Error,
    verbose: bool,
}

impl AppError {
    pub fn new(status: StatusCode, message: &'static str) -> Self {
        Self { status, error: anyhow::anyhow!(message), verbose: false }
    }

    /// 是否在响应中返回完整的错误链
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

fn status_of(err: &anyhow::Error) -> StatusCode {
    match err.downcast_ref::<PipelineError>() {
        Some(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
        Some(PipelineError::Upstream(_) | PipelineError::UpstreamContract(_)) => {
            StatusCode::BAD_GATEWAY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = match self.verbose {
            true => format!("{:#}", self.error),
            false => self.error.to_string(),
        };
        if self.status.is_server_error() {
            error!("请求失败: {:#}", self.error);
        } else {
            warn!("请求被拒绝: {:#}", self.error);
        }
        (self.status, Json(ErrorResponse { error: format!("Error: {message}") })).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let error = err.into();
        Self { status: status_of(&error), error, verbose: false }
    }
}
