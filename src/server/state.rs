use crate::analysis::HttpAnalyzer;
use crate::pipeline::Pipeline;

/// 应用状态
pub struct AppState {
    /// 图片分析流水线
    pub pipeline: Pipeline<HttpAnalyzer>,
    /// 是否在错误响应中返回完整错误链
    pub debug: bool,
}

impl AppState {
    pub fn new(pipeline: Pipeline<HttpAnalyzer>, debug: bool) -> Self {
        AppState { pipeline, debug }
    }
}
