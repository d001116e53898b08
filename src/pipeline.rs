use std::time::{Duration, Instant};

use log::{debug, info, warn};
use tokio::task::spawn_blocking;
use tokio::time::timeout;

use crate::analysis::{AnalysisQuestion, AnalysisResult, Analyzer};
use crate::codec::{self, RawImageInput};
use crate::error::{PipelineError, Result, UpstreamError};
use crate::metrics;
use crate::store::{ImageStore, StoredImage};

/// 流水线配置
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// 缩放后图片较长边的最大尺寸
    pub max_dimension: u32,
    /// 分析结束后是否删除缩放图
    pub cleanup_resized: bool,
    /// 单次分析请求的超时时间
    pub analysis_timeout: Duration,
    pub question: AnalysisQuestion,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_dimension: 300,
            cleanup_resized: true,
            analysis_timeout: Duration::from_secs(60),
            question: AnalysisQuestion::default(),
        }
    }
}

/// 一次成功分析的结果
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub result: AnalysisResult,
    /// 保留下来用于展示的原图
    pub original: StoredImage,
}

/// 缩放图的生命周期守卫，离开作用域时按配置删除文件
///
/// 分析成功、失败、超时或 future 被取消时都会执行，且只执行一次。
/// 守卫在阻塞线程中创建，即使等待缩放时请求被取消，缩放图也会随任务结果一起释放。
struct ResizedArtifact {
    store: ImageStore,
    image: StoredImage,
    cleanup: bool,
}

impl Drop for ResizedArtifact {
    fn drop(&mut self) {
        if self.cleanup {
            self.store.delete(&self.image);
        }
    }
}

/// 图片接收与分析流水线：解码 -> 保存 -> 缩放 -> 分析 -> 清理
pub struct Pipeline<A> {
    store: ImageStore,
    analyzer: A,
    config: PipelineConfig,
}

impl<A: Analyzer> Pipeline<A> {
    pub fn new(store: ImageStore, analyzer: A, config: PipelineConfig) -> Self {
        Self { store, analyzer, config }
    }

    pub fn store(&self) -> &ImageStore {
        &self.store
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// 处理一张图片，两种输入方式共用同一流程
    pub async fn run(&self, input: RawImageInput) -> Result<PipelineOutcome> {
        let modality = input.modality();
        let result = self.process(input).await;
        let outcome = match &result {
            Ok(outcome) => {
                info!(
                    "分析完成: {} contains_hotdog={} confidence={:.2}",
                    outcome.original.file_name(),
                    outcome.result.contains_hotdog,
                    outcome.result.confidence_score
                );
                "ok"
            }
            Err(e) => {
                warn!("分析失败 ({}): {}", modality, e);
                e.kind()
            }
        };
        metrics::inc_analyze_count(modality, outcome);
        result
    }

    async fn process(&self, input: RawImageInput) -> Result<PipelineOutcome> {
        let store = self.store.clone();
        let original = blocking(move || {
            let bytes = codec::decode(&input)?;
            match &input {
                RawImageInput::Base64Payload(_) => store.persist_original(&bytes),
                RawImageInput::UploadStream { filename, .. } => {
                    store.persist_upload(&bytes, filename)
                }
            }
        })
        .await?;
        debug!("已保存原图: {}", original.path.display());

        // 在生成缩放图之前确认分析服务可用，避免产生无用的临时文件
        self.analyzer.ensure_ready()?;

        let store = self.store.clone();
        let source = original.path.clone();
        let max_dimension = self.config.max_dimension;
        let cleanup = self.config.cleanup_resized;
        let resized = blocking(move || {
            let image = codec::resize(&store, &source, max_dimension)?;
            Ok(ResizedArtifact { store, image, cleanup })
        })
        .await?;
        debug!("已生成缩放图: {}", resized.image.path.display());

        let result = self.submit(&resized.image).await?;
        Ok(PipelineOutcome { result, original })
    }

    async fn submit(&self, image: &StoredImage) -> Result<AnalysisResult> {
        let limit = self.config.analysis_timeout;
        let start = Instant::now();
        let call = self.analyzer.analyze(&image.path, &self.config.question);
        let result = match timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(UpstreamError::Timeout(limit).into()),
        };
        let label = result.as_ref().map_or_else(PipelineError::kind, |_| "ok");
        metrics::observe_analyze_duration(label, start.elapsed().as_secs_f32());
        result
    }
}

/// 在阻塞线程池中执行文件读写与图片编解码
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    spawn_blocking(f).await?
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use image::{ImageFormat, RgbImage};
    use tempfile::{TempDir, tempdir};

    use super::*;
    use crate::store::Pool;

    #[derive(Clone, Copy)]
    enum Script {
        Verdict(bool),
        Fail,
        Hang,
        NotReady,
    }

    /// 按脚本返回结果的分析器，记录调用次数与收到的图片尺寸
    struct ScriptedAnalyzer {
        script: Script,
        calls: AtomicUsize,
        seen: Mutex<Vec<(u32, u32)>>,
    }

    impl ScriptedAnalyzer {
        fn new(script: Script) -> Self {
            Self { script, calls: AtomicUsize::new(0), seen: Mutex::new(vec![]) }
        }
    }

    impl Analyzer for ScriptedAnalyzer {
        fn ensure_ready(&self) -> Result<()> {
            match self.script {
                Script::NotReady => Err(PipelineError::Configuration("no credential".into())),
                _ => Ok(()),
            }
        }

        async fn analyze(&self, image: &Path, _: &AnalysisQuestion) -> Result<AnalysisResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(image::image_dimensions(image).unwrap());
            match self.script {
                Script::Verdict(contains_hotdog) => Ok(AnalysisResult {
                    thoughts: "looked at it".into(),
                    contains_hotdog,
                    confidence_score: 0.8,
                    explanation: "test".into(),
                }),
                Script::Fail => {
                    Err(UpstreamError::Status { status: 429, body: "slow down".into() }.into())
                }
                Script::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    unreachable!()
                }
                Script::NotReady => unreachable!(),
            }
        }
    }

    fn pipeline(script: Script, cleanup: bool) -> (TempDir, Pipeline<ScriptedAnalyzer>) {
        let dir = tempdir().unwrap();
        let store =
            ImageStore::open(dir.path().join("uploads"), dir.path().join("resized")).unwrap();
        let config = PipelineConfig {
            cleanup_resized: cleanup,
            analysis_timeout: Duration::from_millis(200),
            ..Default::default()
        };
        (dir, Pipeline::new(store, ScriptedAnalyzer::new(script), config))
    }

    fn count(pipeline: &Pipeline<ScriptedAnalyzer>, pool: Pool) -> usize {
        std::fs::read_dir(pipeline.store().dir(pool)).unwrap().count()
    }

    fn encode_image(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
        let mut bytes = std::io::Cursor::new(vec![]);
        RgbImage::new(width, height).write_to(&mut bytes, format).unwrap();
        bytes.into_inner()
    }

    fn upload(width: u32, height: u32) -> RawImageInput {
        RawImageInput::UploadStream {
            bytes: encode_image(width, height, ImageFormat::Jpeg),
            filename: "lunch.jpg".into(),
        }
    }

    #[tokio::test]
    async fn test_upload_success_cleans_resized() {
        let (_dir, pipeline) = pipeline(Script::Verdict(true), true);

        let outcome = pipeline.run(upload(4000, 2000)).await.unwrap();

        assert!(outcome.result.contains_hotdog);
        assert_eq!(pipeline.analyzer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(*pipeline.analyzer.seen.lock().unwrap(), vec![(300, 150)]);
        assert_eq!(image::image_dimensions(&outcome.original.path).unwrap(), (4000, 2000));
        assert_eq!(outcome.original.pool, Pool::Original);
        assert_eq!(count(&pipeline, Pool::Resized), 0);
        assert_eq!(count(&pipeline, Pool::Original), 1);
    }

    #[tokio::test]
    async fn test_capture_success() {
        let (_dir, pipeline) = pipeline(Script::Verdict(false), true);
        let payload = format!(
            "data:image/png;base64,{}",
            STANDARD.encode(encode_image(120, 480, ImageFormat::Png))
        );

        let outcome = pipeline.run(RawImageInput::Base64Payload(payload)).await.unwrap();

        assert!(!outcome.result.contains_hotdog);
        // 相机图片统一保存为 .jpg，缩放时按实际内容识别格式
        assert!(outcome.original.file_name().ends_with(".jpg"));
        assert_eq!(*pipeline.analyzer.seen.lock().unwrap(), vec![(75, 300)]);
        assert_eq!(count(&pipeline, Pool::Resized), 0);
    }

    #[tokio::test]
    async fn test_cleanup_disabled_keeps_resized() {
        let (_dir, pipeline) = pipeline(Script::Verdict(true), false);
        pipeline.run(upload(640, 480)).await.unwrap();
        assert_eq!(count(&pipeline, Pool::Resized), 1);
    }

    #[tokio::test]
    async fn test_analysis_failure_still_cleans_resized() {
        let (_dir, pipeline) = pipeline(Script::Fail, true);

        let err = pipeline.run(upload(640, 480)).await.unwrap_err();

        assert!(matches!(err, PipelineError::Upstream(UpstreamError::Status { status: 429, .. })));
        assert_eq!(pipeline.analyzer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(count(&pipeline, Pool::Resized), 0);
        assert_eq!(count(&pipeline, Pool::Original), 1);
    }

    #[tokio::test]
    async fn test_timeout_still_cleans_resized() {
        let (_dir, pipeline) = pipeline(Script::Hang, true);

        let err = pipeline.run(upload(640, 480)).await.unwrap_err();

        assert!(matches!(err, PipelineError::Upstream(UpstreamError::Timeout(_))));
        assert_eq!(count(&pipeline, Pool::Resized), 0);
    }

    #[tokio::test]
    async fn test_cancelled_request_cleans_resized() {
        let (_dir, pipeline) = pipeline(Script::Hang, true);
        let mut config = pipeline.config().clone();
        config.analysis_timeout = Duration::from_secs(3600);
        let pipeline = Pipeline::new(pipeline.store, pipeline.analyzer, config);

        // 外层先超时，future 被丢弃
        let cancelled = timeout(Duration::from_secs(2), pipeline.run(upload(64, 48))).await;

        assert!(cancelled.is_err());
        assert_eq!(pipeline.analyzer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(count(&pipeline, Pool::Resized), 0);
        assert_eq!(count(&pipeline, Pool::Original), 1);
    }

    #[test]
    fn test_cancelled_during_resize_cleans_resized() {
        let (_dir, pipeline) = pipeline(Script::Hang, true);
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();

        // 请求在阻塞任务进行中被取消，已开始的任务仍会执行完毕
        let input = upload(1600, 1200);
        let cancelled = runtime.block_on(async {
            timeout(Duration::from_millis(1), pipeline.run(input)).await
        });
        // 关闭运行时会等待所有阻塞任务结束
        drop(runtime);

        assert!(cancelled.is_err());
        assert_eq!(count(&pipeline, Pool::Resized), 0);
    }

    #[tokio::test]
    async fn test_invalid_image_skips_analysis() {
        let (_dir, pipeline) = pipeline(Script::Verdict(true), true);
        let input = RawImageInput::UploadStream {
            bytes: b"just some notes".to_vec(),
            filename: "notes.png".into(),
        };

        let err = pipeline.run(input).await.unwrap_err();

        assert!(matches!(err, PipelineError::Resize { .. }));
        assert_eq!(pipeline.analyzer.calls.load(Ordering::SeqCst), 0);
        assert_eq!(count(&pipeline, Pool::Resized), 0);
        assert_eq!(count(&pipeline, Pool::Original), 1);
    }

    #[tokio::test]
    async fn test_rejected_extension_persists_nothing() {
        let (_dir, pipeline) = pipeline(Script::Verdict(true), true);
        let input =
            RawImageInput::UploadStream { bytes: vec![0; 16], filename: "notes.txt".into() };

        let err = pipeline.run(input).await.unwrap_err();

        assert!(matches!(err, PipelineError::UnsupportedFormat(_)));
        assert_eq!(count(&pipeline, Pool::Original), 0);
    }

    #[tokio::test]
    async fn test_malformed_base64_persists_nothing() {
        let (_dir, pipeline) = pipeline(Script::Verdict(true), true);

        let err = pipeline.run(RawImageInput::Base64Payload("data:,@@@".into())).await.unwrap_err();

        assert!(matches!(err, PipelineError::Decode(_)));
        assert_eq!(count(&pipeline, Pool::Original), 0);
    }

    #[tokio::test]
    async fn test_missing_credential_creates_no_resized() {
        let (_dir, pipeline) = pipeline(Script::NotReady, true);

        let err = pipeline.run(upload(640, 480)).await.unwrap_err();

        assert!(matches!(err, PipelineError::Configuration(_)));
        assert_eq!(pipeline.analyzer.calls.load(Ordering::SeqCst), 0);
        assert_eq!(count(&pipeline, Pool::Resized), 0);
        assert_eq!(count(&pipeline, Pool::Original), 1);
    }
}
