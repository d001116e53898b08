use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser, Subcommand};
use directories::ProjectDirs;

use crate::analysis::{AnalysisQuestion, DEFAULT_QUESTION, HttpAnalyzer};
use crate::cli::*;
use crate::error::Result;
use crate::pipeline::{Pipeline, PipelineConfig};
use crate::store::ImageStore;

static DATA_DIR: LazyLock<PathBuf> = LazyLock::new(|| {
    ProjectDirs::from("", "hotdog", "hotdog")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
});

static UPLOAD_DIR: LazyLock<String> =
    LazyLock::new(|| DATA_DIR.join("uploads").to_string_lossy().into_owned());

static RESIZED_DIR: LazyLock<String> =
    LazyLock::new(|| DATA_DIR.join("resized").to_string_lossy().into_owned());

fn default_upload_dir() -> &'static str {
    UPLOAD_DIR.as_str()
}

fn default_resized_dir() -> &'static str {
    RESIZED_DIR.as_str()
}

#[derive(Parser, Debug, Clone)]
pub struct PipelineOptions {
    /// 分析服务 API 凭据
    #[arg(long, env = "API_CREDENTIAL", hide_env_values = true)]
    pub api_key: Option<String>,
    /// 分析服务地址
    #[arg(long, value_name = "URL", env = "API_URL", default_value = "https://api.opper.ai/v2/call")]
    pub api_url: String,
    /// 分析请求超时时间，单位为秒
    #[arg(long, value_name = "SECONDS", default_value_t = 60)]
    pub analysis_timeout: u64,
    /// 原图保存目录
    #[arg(long, value_name = "DIR", env = "UPLOAD_FOLDER", default_value = default_upload_dir())]
    pub upload_dir: PathBuf,
    /// 缩放图保存目录
    #[arg(long, value_name = "DIR", env = "RESIZED_FOLDER", default_value = default_resized_dir())]
    pub resized_dir: PathBuf,
    /// 缩放后图片较长边的最大尺寸
    #[arg(long, value_name = "PIXELS", default_value_t = 300, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_dimension: u32,
    /// 分析完成后是否删除缩放图
    #[arg(long, value_name = "BOOL", env = "CLEANUP_RESIZED", default_value = "true", action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub cleanup_resized: bool,
    /// 自定义分析指令
    #[arg(long, default_value = DEFAULT_QUESTION, hide_default_value = true)]
    pub question: String,
}

impl PipelineOptions {
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            max_dimension: self.max_dimension,
            cleanup_resized: self.cleanup_resized,
            analysis_timeout: Duration::from_secs(self.analysis_timeout),
            question: AnalysisQuestion::new(self.question.clone()),
        }
    }

    /// 打开存储目录并构建流水线
    pub fn build_pipeline(&self) -> Result<Pipeline<HttpAnalyzer>> {
        let store = ImageStore::open(&self.upload_dir, &self.resized_dir)?;
        let config = self.pipeline_config();
        let analyzer =
            HttpAnalyzer::new(self.api_url.clone(), self.api_key.clone(), config.analysis_timeout);
        Ok(Pipeline::new(store, analyzer, config))
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "hotdog", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// 输出调试日志，并在错误响应中返回完整的错误链
    #[arg(
        long,
        global = true,
        env = "DEBUG",
        value_name = "BOOL",
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new(),
        default_value = "false",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true"
    )]
    pub debug: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 启动 HTTP 服务
    Server(ServerCommand),
    /// 分析本地图片
    Analyze(AnalyzeCommand),
}
