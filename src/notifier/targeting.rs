/// 通知ターゲティングエンジン。
///
/// スケジュール実行毎に、通知を有効にしたユーザーを順に評価する:
/// 週間の否定感情カウントが閾値以上なら、今日の曜日とユーザーの
/// チャネルからメッセージを解決し、単一スロットの割当を上書きする。
/// 対応する定義が無いのはシード不備の設定エラーで、その実行を
/// 失敗として大きく表面化させる。
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::observability::metrics::Metrics;
use crate::store::dao::DiaryDao;
use crate::store::models::NotificationTarget;
use crate::util::time::{kst_date, weekday_index};

#[derive(Debug, Error)]
pub(crate) enum TargetingError {
    #[error("no notification definition for weekday {weekday} channel {channel}; seed is incomplete")]
    MissingDefinition {
        weekday: i16,
        channel: &'static str,
    },
    #[error(transparent)]
    Persistence(#[from] anyhow::Error),
}

pub(crate) struct TargetingEngine {
    dao: Arc<dyn DiaryDao>,
    metrics: Arc<Metrics>,
    weekly_negative_threshold: i64,
}

impl TargetingEngine {
    pub(crate) fn new(
        dao: Arc<dyn DiaryDao>,
        metrics: Arc<Metrics>,
        weekly_negative_threshold: i64,
    ) -> Self {
        Self {
            dao,
            metrics,
            weekly_negative_threshold,
        }
    }

    /// 一回分のスイープを実行し、配送対象を返す。
    ///
    /// スイープは単一タスクで逐次進む。割当は常に上書きで、同日に
    /// 繰り返し実行してもユーザー毎に一行しか残らない。
    pub(crate) async fn evaluate(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<NotificationTarget>, TargetingError> {
        let run_id = Uuid::new_v4();
        self.metrics.targeting_runs.inc();

        let today = kst_date(now);
        let weekday = weekday_index(today);
        let users = self.dao.opted_in_users().await?;
        info!(
            %run_id,
            users = users.len(),
            weekday,
            "starting notification targeting sweep"
        );

        let mut targets = Vec::new();
        for user in users {
            let frequency = self.dao.weekly_negative_count(user.id, today).await?;
            if frequency < self.weekly_negative_threshold {
                debug!(
                    user_id = user.id,
                    frequency,
                    threshold = self.weekly_negative_threshold,
                    "below weekly negative threshold, skipping"
                );
                continue;
            }

            let definition = self
                .dao
                .find_definition(weekday, user.channel)
                .await?
                .ok_or(TargetingError::MissingDefinition {
                    weekday,
                    channel: user.channel.as_str(),
                })?;

            self.dao.upsert_assignment(user.id, definition.id).await?;
            self.metrics.targets_selected.inc();
            targets.push(NotificationTarget {
                user,
                message: definition.message,
            });
        }

        info!(%run_id, targets = targets.len(), "targeting sweep finished");
        Ok(targets)
    }
}
