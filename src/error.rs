use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

/// 图片处理流水线中可能出现的错误
#[derive(Debug, Error)]
pub enum PipelineError {
    /// base64 数据格式错误
    #[error("invalid base64 image data")]
    Decode(#[from] base64::DecodeError),
    /// 上传文件的后缀名不在允许列表中
    #[error("Invalid file type. Please upload an image (PNG, JPG, JPEG, GIF)")]
    UnsupportedFormat(String),
    /// 无法作为图片打开或写出缩放后的图片
    #[error("cannot process {} as an image", path.display())]
    Resize {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    /// 缺少必要的配置，例如 API 凭据
    #[error("{0}")]
    Configuration(String),
    /// 调用外部分析服务失败
    #[error("analysis service request failed: {0}")]
    Upstream(UpstreamError),
    /// 外部分析服务返回的数据无法解析
    #[error("analysis service returned an unexpected response: {0}")]
    UpstreamContract(String),
    /// 读写图片存储目录失败
    #[error("storage error at {}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// 阻塞任务异常退出
    #[error("background task failed")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl From<UpstreamError> for PipelineError {
    fn from(err: UpstreamError) -> Self {
        Self::Upstream(err)
    }
}

impl PipelineError {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Storage { path: path.into(), source }
    }

    /// 错误类别，用于日志与指标标签
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode",
            Self::UnsupportedFormat(_) => "unsupported_format",
            Self::Resize { .. } => "resize",
            Self::Configuration(_) => "configuration",
            Self::Upstream(_) => "upstream",
            Self::UpstreamContract(_) => "upstream_contract",
            Self::Storage { .. } => "storage",
            Self::Task(_) => "task",
        }
    }

    /// 是否由调用方的输入引起
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Decode(_) | Self::UnsupportedFormat(_) | Self::Resize { .. })
    }
}
