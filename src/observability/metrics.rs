/// Prometheusメトリクス定義。
use prometheus::{
    Counter, Histogram, Registry, register_counter_with_registry,
    register_histogram_with_registry,
};

/// メトリクスコレクター。
#[derive(Debug, Clone)]
pub struct Metrics {
    // カウンター
    pub diaries_created: Counter,
    pub emotion_requests: Counter,
    pub emotion_timeouts: Counter,
    pub emotion_failures: Counter,
    pub targeting_runs: Counter,
    pub targets_selected: Counter,
    pub notifications_sent: Counter,
    pub notifications_failed: Counter,

    // ヒストグラム
    pub emotion_latency: Histogram,
}

impl Metrics {
    /// メトリクスを生成してレジストリに登録する。
    ///
    /// # Errors
    /// 同名メトリクスの二重登録などで登録に失敗した場合はエラーを返す。
    pub fn new(registry: &Registry) -> anyhow::Result<Self> {
        Ok(Self {
            diaries_created: register_counter_with_registry!(
                "diary_backend_diaries_created_total",
                "Number of diaries created",
                registry
            )?,
            emotion_requests: register_counter_with_registry!(
                "diary_backend_emotion_requests_total",
                "Number of emotion analysis attempts",
                registry
            )?,
            emotion_timeouts: register_counter_with_registry!(
                "diary_backend_emotion_timeouts_total",
                "Emotion analysis calls cancelled at the deadline",
                registry
            )?,
            emotion_failures: register_counter_with_registry!(
                "diary_backend_emotion_failures_total",
                "Emotion analysis calls that returned an error",
                registry
            )?,
            targeting_runs: register_counter_with_registry!(
                "diary_backend_targeting_runs_total",
                "Notification targeting sweeps executed",
                registry
            )?,
            targets_selected: register_counter_with_registry!(
                "diary_backend_targets_selected_total",
                "Users selected as notification targets",
                registry
            )?,
            notifications_sent: register_counter_with_registry!(
                "diary_backend_notifications_sent_total",
                "Notification deliveries reported successful by an adapter",
                registry
            )?,
            notifications_failed: register_counter_with_registry!(
                "diary_backend_notifications_failed_total",
                "Notification deliveries that failed per target",
                registry
            )?,
            emotion_latency: register_histogram_with_registry!(
                "diary_backend_emotion_latency_seconds",
                "Latency of emotion analysis calls that completed in time",
                vec![0.1, 0.25, 0.5, 1.0, 2.0, 4.0, 6.0],
                registry
            )?,
        })
    }
}
