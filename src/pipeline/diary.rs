/// 日記の作成・更新オーケストレーション。
///
/// 本体と子コレクションの書き込みは単一トランザクションで完結させ、
/// コミット後に時間上限付きのベストエフォート感情分析を行う。
/// 分析のタイムアウト・失敗は作成/更新の成功を覆さない。
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::time::timeout;
use tracing::warn;

use crate::clients::EmotionAnalyzer;
use crate::observability::metrics::Metrics;
use crate::pipeline::emotion::count_labels;
use crate::store::dao::DiaryDao;
use crate::store::models::{
    DiaryFilter, DiaryImage, DiaryPatch, DiaryWithChildren, EmotionLabel, EmotionReport, NewDiary,
};
use crate::util::text::unique_nonempty_trimmed;

pub(crate) const TITLE_MAX_CHARS: usize = 50;
pub(crate) const CONTENT_MAX_CHARS: usize = 5000;
/// 感情分析にかける本文の最低文字数。
pub(crate) const MIN_CONTENT_FOR_ANALYSIS: usize = 10;
pub(crate) const PAGE_SIZE_MAX: i64 = 100;

#[derive(Debug, Error)]
pub(crate) enum DiaryError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("diary {0} not found")]
    NotFound(i64),
    #[error(transparent)]
    Persistence(#[from] anyhow::Error),
}

#[derive(Debug, Clone)]
pub(crate) struct CreateDiaryInput {
    pub(crate) user_id: i64,
    pub(crate) title: String,
    pub(crate) content: String,
    pub(crate) tags: Vec<String>,
    pub(crate) images: Vec<String>,
    pub(crate) emotion_report: Option<EmotionReport>,
}

/// 部分更新。`None`は「変更なし」、タグ・画像の`Some(vec![])`は全削除。
#[derive(Debug, Clone, Default)]
pub(crate) struct UpdateDiaryInput {
    pub(crate) title: Option<String>,
    pub(crate) content: Option<String>,
    pub(crate) tags: Option<Vec<String>>,
    pub(crate) images: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub(crate) struct ListDiariesInput {
    pub(crate) user_id: Option<i64>,
    pub(crate) label: Option<EmotionLabel>,
    pub(crate) date_from: Option<DateTime<Utc>>,
    pub(crate) date_to: Option<DateTime<Utc>>,
    pub(crate) page: i64,
    pub(crate) page_size: i64,
}

pub(crate) struct DiaryPipeline {
    dao: Arc<dyn DiaryDao>,
    analyzer: Arc<dyn EmotionAnalyzer>,
    metrics: Arc<Metrics>,
    analysis_enabled: bool,
    analysis_timeout: Duration,
}

impl DiaryPipeline {
    pub(crate) fn new(
        dao: Arc<dyn DiaryDao>,
        analyzer: Arc<dyn EmotionAnalyzer>,
        metrics: Arc<Metrics>,
        analysis_enabled: bool,
        analysis_timeout: Duration,
    ) -> Self {
        Self {
            dao,
            analyzer,
            metrics,
            analysis_enabled,
            analysis_timeout,
        }
    }

    /// 日記を作成する。
    ///
    /// 本体・タグ・画像は単一トランザクションで書かれ、途中で失敗すれば
    /// 何も残らない。コミット後、上限時間内に分析が返れば別トランザク
    /// ションでレポートを保存し、返却する投影にも必ず織り込む。
    pub(crate) async fn create(
        &self,
        input: CreateDiaryInput,
    ) -> Result<DiaryWithChildren, DiaryError> {
        validate_title(&input.title)?;
        validate_content(&input.content)?;

        let will_analyze = self.analysis_enabled && input.emotion_report.is_none();
        if will_analyze && input.content.chars().count() < MIN_CONTENT_FOR_ANALYSIS {
            return Err(DiaryError::Validation(format!(
                "content must be at least {MIN_CONTENT_FOR_ANALYSIS} characters for emotion analysis"
            )));
        }

        let created = self
            .dao
            .create_diary(NewDiary {
                user_id: input.user_id,
                title: input.title,
                content: input.content.clone(),
                emotion_report: input.emotion_report.as_ref().map(EmotionReport::to_value),
                tags: unique_nonempty_trimmed(&input.tags),
                images: unique_nonempty_trimmed(&input.images),
            })
            .await?;
        self.metrics.diaries_created.inc();
        let id = created.diary.id;

        let fresh = if will_analyze {
            self.analyze_and_persist(id, &input.content).await
        } else {
            None
        };

        // 子コレクションを先読みした投影を読み直す。読み直しが永続化と
        // 競合しても、手元の最新レポートを常に織り込んで返す。
        let mut projection = self.dao.diary_by_id(id).await?.unwrap_or(created);
        if let Some(report) = fresh {
            projection.diary.emotion_report = Some(report.to_value());
        }
        Ok(projection)
    }

    /// 日記を部分更新する。
    pub(crate) async fn update(
        &self,
        id: i64,
        input: UpdateDiaryInput,
    ) -> Result<DiaryWithChildren, DiaryError> {
        if let Some(title) = &input.title {
            validate_title(title)?;
        }
        if let Some(content) = &input.content {
            validate_content(content)?;
            if self.analysis_enabled && content.chars().count() < MIN_CONTENT_FOR_ANALYSIS {
                return Err(DiaryError::Validation(format!(
                    "content must be at least {MIN_CONTENT_FOR_ANALYSIS} characters for emotion analysis"
                )));
            }
        }

        let current = self
            .dao
            .diary_by_id(id)
            .await?
            .ok_or(DiaryError::NotFound(id))?;

        let content_changed = input
            .content
            .as_ref()
            .is_some_and(|content| *content != current.diary.content);

        let patch = DiaryPatch {
            title: input.title.clone(),
            content: input.content.clone(),
            emotion_report: None,
        };
        if !patch.is_empty() && !self.dao.update_diary_fields(id, &patch).await? {
            return Err(DiaryError::NotFound(id));
        }

        let fresh = match (&input.content, content_changed && self.analysis_enabled) {
            (Some(content), true) => self.analyze_and_persist(id, content).await,
            _ => None,
        };

        // 空リストも「全削除」の正当な指示。省略(None)だけが据え置き。
        let tags_override = input.tags.as_ref().map(|t| unique_nonempty_trimmed(t));
        if let Some(tags) = &tags_override {
            self.dao.replace_tags(id, tags).await?;
        }
        let images_override = input.images.as_ref().map(|i| unique_nonempty_trimmed(i));
        if let Some(images) = &images_override {
            self.dao.replace_images(id, images).await?;
        }

        let mut projection = self
            .dao
            .diary_by_id(id)
            .await?
            .ok_or(DiaryError::NotFound(id))?;

        // 返却値は「いま適用した通りのリスト」を映す。並行する置換と
        // 読み直しが重なっても、呼び出し元には要求した姿を見せる。
        if let Some(tags) = tags_override {
            projection.tags = tags;
        }
        if let Some(images) = images_override {
            projection.images = images
                .into_iter()
                .enumerate()
                .map(|(index, url)| DiaryImage {
                    url,
                    display_order: i32::try_from(index + 1).unwrap_or(i32::MAX),
                })
                .collect();
        }
        if let Some(report) = fresh {
            projection.diary.emotion_report = Some(report.to_value());
        }
        Ok(projection)
    }

    pub(crate) async fn get(&self, id: i64) -> Result<DiaryWithChildren, DiaryError> {
        self.dao
            .diary_by_id(id)
            .await?
            .ok_or(DiaryError::NotFound(id))
    }

    pub(crate) async fn list(
        &self,
        input: ListDiariesInput,
    ) -> Result<(Vec<DiaryWithChildren>, i64), DiaryError> {
        if input.page < 1 {
            return Err(DiaryError::Validation(
                "page must be 1 or greater".to_string(),
            ));
        }
        if input.page_size < 1 || input.page_size > PAGE_SIZE_MAX {
            return Err(DiaryError::Validation(format!(
                "page_size must be between 1 and {PAGE_SIZE_MAX}"
            )));
        }

        let filter = DiaryFilter {
            user_id: input.user_id,
            label: input.label,
            date_from: input.date_from,
            date_to: input.date_to,
            page: input.page,
            page_size: input.page_size,
        };
        Ok(self.dao.list_diaries(&filter).await?)
    }

    pub(crate) async fn delete(&self, id: i64) -> Result<(), DiaryError> {
        if self.dao.delete_diary(id).await? {
            Ok(())
        } else {
            Err(DiaryError::NotFound(id))
        }
    }

    /// 条件に合う日記の感情ラベル別カウント。
    pub(crate) async fn emotion_summary(
        &self,
        user_id: Option<i64>,
        date_from: Option<DateTime<Utc>>,
        date_to: Option<DateTime<Utc>>,
    ) -> Result<BTreeMap<EmotionLabel, i64>, DiaryError> {
        let payloads = self.dao.emotion_payloads(user_id, date_from, date_to).await?;
        Ok(count_labels(&payloads))
    }

    /// 上限時間付きで分析を呼び、間に合えば小さな別トランザクションで
    /// 保存する。期限超過は呼び出しを打ち切り、結果なしで先へ進む。
    async fn analyze_and_persist(&self, id: i64, content: &str) -> Option<EmotionReport> {
        self.metrics.emotion_requests.inc();
        let timer = self.metrics.emotion_latency.start_timer();

        match timeout(self.analysis_timeout, self.analyzer.analyze(content)).await {
            Ok(Ok(report)) => {
                timer.observe_duration();
                if let Err(error) = self.dao.update_emotion_report(id, &report.to_value()).await {
                    warn!(diary_id = id, %error, "failed to persist emotion report");
                }
                Some(report)
            }
            Ok(Err(error)) => {
                timer.stop_and_discard();
                self.metrics.emotion_failures.inc();
                warn!(diary_id = id, %error, "emotion analysis failed, leaving diary unenriched");
                None
            }
            Err(_) => {
                timer.stop_and_discard();
                self.metrics.emotion_timeouts.inc();
                warn!(
                    diary_id = id,
                    timeout_secs = self.analysis_timeout.as_secs(),
                    "emotion analysis exceeded its deadline, leaving diary unenriched"
                );
                None
            }
        }
    }
}

fn validate_title(title: &str) -> Result<(), DiaryError> {
    let length = title.chars().count();
    if length == 0 || length > TITLE_MAX_CHARS {
        return Err(DiaryError::Validation(format!(
            "title must be between 1 and {TITLE_MAX_CHARS} characters"
        )));
    }
    Ok(())
}

fn validate_content(content: &str) -> Result<(), DiaryError> {
    let length = content.chars().count();
    if length == 0 || length > CONTENT_MAX_CHARS {
        return Err(DiaryError::Validation(format!(
            "content must be between 1 and {CONTENT_MAX_CHARS} characters"
        )));
    }
    Ok(())
}
