use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::info;

use crate::analysis::AnalysisResult;
use crate::cli::SubCommandExtend;
use crate::codec::RawImageInput;
use crate::config::{Opts, PipelineOptions};

#[derive(Parser, Debug, Clone)]
pub struct AnalyzeCommand {
    #[command(flatten)]
    pub pipeline: PipelineOptions,
    /// 待分析的图片路径
    pub image: PathBuf,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", value_enum, default_value_t = OutputFormat::Table)]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for AnalyzeCommand {
    async fn run(&self, _opts: &Opts) -> anyhow::Result<()> {
        let bytes = tokio::fs::read(&self.image)
            .await
            .with_context(|| format!("无法读取图片: {}", self.image.display()))?;
        let filename = self
            .image
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let pipeline = self.pipeline.build_pipeline()?;
        let outcome = pipeline.run(RawImageInput::UploadStream { bytes, filename }).await?;
        info!("原图已保存: {}", outcome.original.path.display());

        print_result(&outcome.result, self)
    }
}

fn print_result(result: &AnalysisResult, opts: &AnalyzeCommand) -> Result<()> {
    match opts.output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(result)?)
        }
        OutputFormat::Table => {
            println!("contains_hotdog\t{}", result.contains_hotdog);
            println!("confidence\t{:.2}", result.confidence_score);
            println!("explanation\t{}", result.explanation);
            println!("thoughts\t{}", result.thoughts);
        }
    }
    Ok(())
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum OutputFormat {
    Json,
    Table,
}
