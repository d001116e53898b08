use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader};
use log::{debug, info};

use crate::error::{PipelineError, Result};
use crate::store::{ImageStore, Pool, StoredImage};

/// 允许上传的图片后缀名（不区分大小写）
pub const ALLOWED_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "gif"];

/// 原始图片输入，仅在一次请求内存在
#[derive(Debug, Clone)]
pub enum RawImageInput {
    /// 相机拍摄的 base64 数据，可以带 `data:image/jpeg;base64,` 前缀
    Base64Payload(String),
    /// 表单上传的文件内容与客户端提供的文件名
    UploadStream { bytes: Vec<u8>, filename: String },
}

impl RawImageInput {
    /// 输入方式，用于日志与指标标签
    pub fn modality(&self) -> &'static str {
        match self {
            Self::Base64Payload(_) => "capture",
            Self::UploadStream { .. } => "upload",
        }
    }
}

/// 将输入解码为图片字节
pub fn decode(input: &RawImageInput) -> Result<Vec<u8>> {
    match input {
        RawImageInput::Base64Payload(payload) => {
            let data = match payload.split_once(',') {
                Some((_, data)) => data,
                None => payload.as_str(),
            };
            // 浏览器或客户端可能按行折断 base64 数据
            let data: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
            Ok(STANDARD.decode(data)?)
        }
        RawImageInput::UploadStream { bytes, filename } => {
            if !is_allowed_file(filename) {
                info!("拒绝上传文件 {filename:?}: 不支持的后缀名");
                return Err(PipelineError::UnsupportedFormat(filename.clone()));
            }
            Ok(bytes.clone())
        }
    }
}

/// 文件名是否带有允许的图片后缀
pub fn is_allowed_file(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .is_some_and(|(_, ext)| ALLOWED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// 按较长边等比缩放到 `max_dimension`，结果向下取整且不小于 1
pub fn scaled_dimensions(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    let scale = |side: u32, longest: u32| {
        ((side as u64 * max_dimension as u64) / longest as u64).max(1) as u32
    };
    if width >= height {
        (max_dimension, scale(height, width))
    } else {
        (scale(width, height), max_dimension)
    }
}

/// 缩放 `source` 处的图片，并写入缩放图存储池
///
/// 输出格式与源图片一致，无法识别时使用 JPEG。写出失败时会删除不完整的文件。
pub fn resize(store: &ImageStore, source: &Path, max_dimension: u32) -> Result<StoredImage> {
    let resize_error = |source_err: image::ImageError| PipelineError::Resize {
        path: source.to_path_buf(),
        source: source_err,
    };

    let reader = ImageReader::open(source)
        .map_err(|e| PipelineError::storage(source, e))?
        .with_guessed_format()
        .map_err(|e| PipelineError::storage(source, e))?;
    let format = reader.format().unwrap_or(ImageFormat::Jpeg);
    let img = reader.decode().map_err(resize_error)?;

    let (width, height) = scaled_dimensions(img.width(), img.height(), max_dimension);
    let (src_width, src_height) = (img.width(), img.height());
    debug!("缩放图片 {}: {src_width}x{src_height} -> {width}x{height}", source.display());
    let resized = img.resize_exact(width, height, FilterType::Lanczos3);
    let resized = match format {
        // JPEG 不支持透明通道
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(resized.to_rgb8()),
        _ => resized,
    };

    let extension = format.extensions_str().first().copied().unwrap_or("jpg");
    let target = store.reserve(Pool::Resized, extension);
    if let Err(e) = resized.save_with_format(&target.path, format) {
        store.delete(&target);
        return Err(resize_error(e));
    }
    Ok(target)
}
