pub(crate) mod diaries;
pub(crate) mod files;
pub(crate) mod health;
pub(crate) mod metrics;
pub(crate) mod notifications;
pub(crate) mod stats;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::app::AppState;

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/health/ready", get(health::ready))
        .route("/health/live", get(health::live))
        .route("/metrics", get(metrics::exporter))
        .route("/v1/diaries", post(diaries::create).get(diaries::list))
        .route(
            "/v1/diaries/{id}",
            get(diaries::fetch)
                .patch(diaries::update)
                .delete(diaries::remove),
        )
        .route("/v1/diaries/stats/summary", get(stats::summary))
        .route("/v1/diaries/stats/daily", get(stats::daily))
        .route("/v1/images", post(files::upload))
        .route(
            "/v1/notifications/definitions",
            get(notifications::definitions),
        )
        .route(
            "/v1/notifications/assignments/{user_id}",
            get(notifications::assignment),
        )
        .route("/v1/notifications/evaluate", post(notifications::evaluate))
        .route("/v1/notifications/send", post(notifications::send_now))
        // 画像バッチが既定の2MiB制限を超えられるように広げる。
        // ファイル単位の上限はMediaStoreClient側で別途効く。
        .layer(DefaultBodyLimit::max(64 * 1024 * 1024))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
