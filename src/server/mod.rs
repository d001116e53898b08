mod api;
mod error;
mod state;
mod types;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::limit::RequestBodyLimitLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use self::state::*;

#[derive(OpenApi)]
#[openapi(
    paths(api::analyze_handler, api::original_handler, api::resized_handler),
    components(schemas(types::AnalyzeForm, types::AnalyzeResponse, types::ErrorResponse))
)]
pub struct ApiDoc;

/// 构建API服务器
pub fn create_app(state: Arc<AppState>, max_upload_size: usize) -> Router {
    Router::new()
        .route("/analyze", post(api::analyze_handler))
        .route("/uploads/{filename}", get(api::original_handler))
        .route("/resized/{filename}", get(api::resized_handler))
        .route("/metrics", get(api::metrics_handler))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::disable())
        // 上传限制，超过时直接返回 413，不会进入解码流程
        .layer(RequestBodyLimitLayer::new(max_upload_size))
        .with_state(state)
}
