pub mod analysis;
pub mod cli;
pub mod codec;
pub mod config;
pub mod error;
mod metrics;
pub mod pipeline;
mod server;
pub mod store;

pub use analysis::{AnalysisQuestion, AnalysisResult, Analyzer, HttpAnalyzer};
pub use codec::RawImageInput;
pub use config::Opts;
pub use error::{PipelineError, UpstreamError};
pub use pipeline::{Pipeline, PipelineConfig, PipelineOutcome};
pub use store::{ImageStore, Pool, StoredImage};
