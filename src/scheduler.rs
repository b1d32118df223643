pub mod cadence;
pub mod daemon;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::notifier::dispatch::NotificationDispatcher;
use crate::notifier::targeting::{TargetingEngine, TargetingError};
use crate::store::models::NotificationTarget;

/// 1回分のスイープの結果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SweepOutcome {
    pub(crate) evaluated: usize,
    pub(crate) sent_user_ids: Vec<i64>,
}

/// ターゲティングと配送を束ねる実行単位。
///
/// 日次デーモンと手動トリガーAPIの両方から呼ばれる。
#[derive(Clone)]
pub struct NotificationScheduler {
    engine: Arc<TargetingEngine>,
    dispatcher: Arc<NotificationDispatcher>,
}

impl NotificationScheduler {
    pub(crate) fn new(
        engine: Arc<TargetingEngine>,
        dispatcher: Arc<NotificationDispatcher>,
    ) -> Self {
        Self { engine, dispatcher }
    }

    /// 評価のみ（配送しない）。
    pub(crate) async fn evaluate_only(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<NotificationTarget>, TargetingError> {
        self.engine.evaluate(now).await
    }

    /// 評価して配送まで行う。
    pub(crate) async fn run_sweep(
        &self,
        now: DateTime<Utc>,
    ) -> Result<SweepOutcome, TargetingError> {
        let targets = self.engine.evaluate(now).await?;
        let evaluated = targets.len();
        let sent_user_ids = self.dispatcher.dispatch(targets).await;
        info!(
            evaluated,
            sent = sent_user_ids.len(),
            "notification sweep completed"
        );
        Ok(SweepOutcome {
            evaluated,
            sent_user_ids,
        })
    }
}
