use std::sync::LazyLock;

use prometheus::*;

static METRIC_ANALYZE_COUNT: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "hotdog_analyze_count",
        "count of the analyzed images",
        &["modality", "outcome"]
    )
    .unwrap()
});

static METRIC_ANALYZE_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "hotdog_analyze_duration",
        "duration of the analysis service call in seconds",
        &["outcome"],
        vec![0.25, 0.5, 1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0]
    )
    .unwrap()
});

static METRIC_CLEANUP_FAILURE_COUNT: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!("hotdog_cleanup_failure_count", "count of failed artifact deletions")
        .unwrap()
});

/// 增加一次请求计数，`outcome` 为 `ok` 或错误类别
pub fn inc_analyze_count(modality: &str, outcome: &str) {
    METRIC_ANALYZE_COUNT.with_label_values(&[modality, outcome]).inc();
}

pub fn observe_analyze_duration(outcome: &str, duration: f32) {
    METRIC_ANALYZE_DURATION.with_label_values(&[outcome]).observe(duration as f64);
}

pub fn inc_cleanup_failure() {
    METRIC_CLEANUP_FAILURE_COUNT.inc();
}

/// 以文本格式导出所有指标
pub fn gather_text() -> Result<String> {
    TextEncoder::new().encode_to_string(&prometheus::gather())
}
