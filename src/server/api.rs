use std::io::ErrorKind;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum_typed_multipart::TypedMultipart;
use image::ImageFormat;

use super::error::{AppError, Result};
use super::state::AppState;
use super::types::*;
use crate::metrics;
use crate::store::Pool;

/// 分析一张图片是否包含热狗
#[utoipa::path(
    post,
    path = "/analyze",
    request_body(content = AnalyzeForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, body = AnalyzeResponse),
        (status = 400, body = ErrorResponse),
        (status = 502, body = ErrorResponse),
    )
)]
pub async fn analyze_handler(
    State(state): State<Arc<AppState>>,
    TypedMultipart(data): TypedMultipart<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>> {
    let input = data.into_input().map_err(|msg| AppError::new(StatusCode::BAD_REQUEST, msg))?;

    let outcome =
        state.pipeline.run(input).await.map_err(|e| AppError::from(e).verbose(state.debug))?;

    Ok(Json(AnalyzeResponse {
        image: format!("/uploads/{}", outcome.original.file_name()),
        result: outcome.result,
    }))
}

/// 获取上传的原图
#[utoipa::path(get, path = "/uploads/{filename}", params(("filename" = String, Path)))]
pub async fn original_handler(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Result<Response> {
    serve_artifact(&state, Pool::Original, &filename).await
}

/// 获取缩放后的图片
#[utoipa::path(get, path = "/resized/{filename}", params(("filename" = String, Path)))]
pub async fn resized_handler(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Result<Response> {
    serve_artifact(&state, Pool::Resized, &filename).await
}

async fn serve_artifact(state: &AppState, pool: Pool, filename: &str) -> Result<Response> {
    let path = state
        .pipeline
        .store()
        .resolve_path(pool, filename)
        .ok_or_else(|| AppError::new(StatusCode::BAD_REQUEST, "Invalid file name"))?;
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(AppError::new(StatusCode::NOT_FOUND, "File not found"));
        }
        Err(e) => return Err(e.into()),
    };
    let mime = ImageFormat::from_path(&path)
        .map(|format| format.to_mime_type())
        .unwrap_or("application/octet-stream");
    Ok(([(header::CONTENT_TYPE, mime)], bytes).into_response())
}

/// 导出 prometheus 指标
pub async fn metrics_handler() -> Result<String> {
    Ok(metrics::gather_text()?)
}
