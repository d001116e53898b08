use std::future::Future;
use std::path::Path;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::ImageFormat;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use utoipa::ToSchema;

use crate::error::{PipelineError, Result, UpstreamError};

/// 默认的分析指令
pub const DEFAULT_QUESTION: &str = "Analyze the given image and determine if it contains a hotdog. \
Be accurate in your assessment. Also provide a confidence score between 0 and 1, where 1 means \
you are 100% confident in your answer and 0 means you have no confidence.";

/// 外部服务中注册的函数名
const CALL_NAME: &str = "analyze_hotdog_image";

/// 向分析服务提出的问题
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisQuestion(String);

impl AnalysisQuestion {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for AnalysisQuestion {
    fn default() -> Self {
        Self::new(DEFAULT_QUESTION)
    }
}

/// 分析服务返回的结构化结论
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AnalysisResult {
    /// 模型分析图片时的思考过程
    pub thoughts: String,
    /// 图片中是否有热狗
    pub contains_hotdog: bool,
    /// 置信度，范围 0 到 1
    pub confidence_score: f64,
    /// 结论的解释
    pub explanation: String,
}

/// 图片分析能力
pub trait Analyzer: Send + Sync {
    /// 在进行任何网络请求之前检查配置是否完整
    fn ensure_ready(&self) -> Result<()> {
        Ok(())
    }

    /// 分析 `image` 处的图片，只尝试一次
    fn analyze(
        &self,
        image: &Path,
        question: &AnalysisQuestion,
    ) -> impl Future<Output = Result<AnalysisResult>> + Send;
}

/// 通过 HTTP 调用的外部分析服务
pub struct HttpAnalyzer {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpAnalyzer {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            timeout,
        }
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            PipelineError::Configuration(
                "API credential not found, set API_CREDENTIAL or pass --api-key".to_string(),
            )
        })
    }
}

impl Analyzer for HttpAnalyzer {
    fn ensure_ready(&self) -> Result<()> {
        self.api_key().map(|_| ())
    }

    async fn analyze(&self, image: &Path, question: &AnalysisQuestion) -> Result<AnalysisResult> {
        let api_key = self.api_key()?;

        let bytes =
            tokio::fs::read(image).await.map_err(|e| PipelineError::storage(image, e))?;
        let body = build_request(&data_url(image, &bytes), question);

        debug!("请求分析服务: {}", self.endpoint);
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| upstream_error(e, self.timeout))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| upstream_error(e, self.timeout))?;
        if !status.is_success() {
            return Err(UpstreamError::Status { status: status.as_u16(), body: text }.into());
        }
        parse_response(&text)
    }
}

fn upstream_error(err: reqwest::Error, timeout: Duration) -> PipelineError {
    match err.is_timeout() {
        true => UpstreamError::Timeout(timeout).into(),
        false => UpstreamError::Http(err).into(),
    }
}

/// 将图片编码为 data URL，MIME 类型由后缀名推断
fn data_url(path: &Path, bytes: &[u8]) -> String {
    let mime = ImageFormat::from_path(path).map(|f| f.to_mime_type()).unwrap_or("image/jpeg");
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

fn build_request(image: &str, question: &AnalysisQuestion) -> Value {
    json!({
        "name": CALL_NAME,
        "instructions": question.as_str(),
        "input_schema": {
            "type": "object",
            "properties": {
                "image": { "type": "string", "description": "Base64 encoded image to analyze" },
            },
            "required": ["image"],
        },
        "output_schema": {
            "type": "object",
            "properties": {
                "thoughts": { "type": "string" },
                "contains_hotdog": { "type": "boolean" },
                "confidence_score": { "type": "number", "minimum": 0, "maximum": 1 },
                "explanation": { "type": "string" },
            },
            "required": ["thoughts", "contains_hotdog", "confidence_score", "explanation"],
        },
        "input": { "image": image },
    })
}

#[derive(Deserialize)]
struct CallResponse {
    json_payload: Value,
}

/// 解析分析服务的响应，字段缺失或置信度越界都视为契约错误
fn parse_response(text: &str) -> Result<AnalysisResult> {
    let contract = |e: serde_json::Error| PipelineError::UpstreamContract(e.to_string());
    let response: CallResponse = serde_json::from_str(text).map_err(contract)?;
    let result: AnalysisResult = serde_json::from_value(response.json_payload).map_err(contract)?;
    if !(0.0..=1.0).contains(&result.confidence_score) {
        return Err(PipelineError::UpstreamContract(format!(
            "confidence score {} out of range [0, 1]",
            result.confidence_score
        )));
    }
    Ok(result)
}
