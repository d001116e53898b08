use axum::body::Bytes;
use axum_typed_multipart::{FieldData, TryFromMultipart};
use serde::Serialize;
use utoipa::ToSchema;

use crate::analysis::AnalysisResult;
use crate::codec::RawImageInput;

/// 分析请求参数
#[derive(TryFromMultipart)]
pub struct AnalyzeRequest {
    pub image_data: Option<String>,
    pub file: Option<FieldData<Bytes>>,
}

impl AnalyzeRequest {
    pub fn into_input(self) -> Result<RawImageInput, &'static str> {
        let file = self.file.map(|file| (file.metadata.file_name, file.contents));
        select_input(self.image_data, file)
    }
}

/// 选择输入方式：非空的 `image_data` 优先于上传文件
fn select_input(
    image_data: Option<String>,
    file: Option<(Option<String>, Bytes)>,
) -> Result<RawImageInput, &'static str> {
    if let Some(payload) = image_data.filter(|data| !data.is_empty()) {
        return Ok(RawImageInput::Base64Payload(payload));
    }
    let (filename, contents) = file.ok_or("No image provided")?;
    let filename = filename.filter(|name| !name.is_empty()).ok_or("No selected file")?;
    Ok(RawImageInput::UploadStream { bytes: contents.to_vec(), filename })
}

/// 分析表单（用于API文档）
#[derive(Debug, ToSchema)]
#[allow(unused)]
pub struct AnalyzeForm {
    /// 相机拍摄的 base64 图片，可以带 data URL 前缀
    pub image_data: Option<String>,
    /// 上传的图片文件，支持 png、jpg、jpeg、gif
    #[schema(format = Binary, content_media_type = "application/octet-stream")]
    pub file: Option<String>,
}

/// 分析响应
#[derive(Debug, Serialize, ToSchema)]
pub struct AnalyzeResponse {
    #[serde(flatten)]
    pub result: AnalysisResult,
    /// 原图地址
    pub image: String,
}

/// 错误响应
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: Option<&str>) -> Option<(Option<String>, Bytes)> {
        Some((name.map(str::to_string), Bytes::from_static(b"abc")))
    }

    #[test]
    fn test_capture_takes_priority() {
        let input = select_input(Some("aGk=".into()), file(Some("a.png")));
        assert!(matches!(input, Ok(RawImageInput::Base64Payload(p)) if p == "aGk="));
    }

    #[test]
    fn test_empty_capture_falls_back_to_file() {
        match select_input(Some(String::new()), file(Some("a.png"))) {
            Ok(RawImageInput::UploadStream { bytes, filename }) => {
                assert_eq!(bytes, b"abc");
                assert_eq!(filename, "a.png");
            }
            other => panic!("unexpected input: {other:?}"),
        }
    }

    #[test]
    fn test_missing_inputs() {
        assert_eq!(select_input(None, None).unwrap_err(), "No image provided");
        assert_eq!(select_input(None, file(Some(""))).unwrap_err(), "No selected file");
        assert_eq!(select_input(None, file(None)).unwrap_err(), "No selected file");
    }
}
