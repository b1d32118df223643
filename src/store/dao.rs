pub(crate) mod pg;

#[cfg(test)]
pub(crate) mod mock;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;

use super::models::{
    Channel, DiaryFilter, DiaryPatch, DiaryWithChildren, NewDiary, NotificationAssignment,
    NotificationDefinition, NotificationUser,
};

pub(crate) use pg::PgDiaryDao;

/// 通知カタログのシード一行分。
#[derive(Debug, Clone, Copy)]
pub(crate) struct SeedDefinition {
    pub(crate) weekday: i16,
    pub(crate) channel: Channel,
    pub(crate) message: &'static str,
}

/// データアクセス層の抽象化。
///
/// パイプラインとターゲティングエンジンはこのトレイト越しにストアへ触れる。
/// テストでは`mock::MemoryDiaryDao`に差し替えられる。
#[async_trait]
pub(crate) trait DiaryDao: Send + Sync {
    // Diary write path

    /// 日記本体と子コレクション（タグ・画像）を単一トランザクションで作成し、
    /// 先読み済みの投影を返す。途中で失敗した場合は全体がロールバックされる。
    async fn create_diary(&self, new: NewDiary) -> anyhow::Result<DiaryWithChildren>;

    async fn diary_by_id(&self, id: i64) -> anyhow::Result<Option<DiaryWithChildren>>;

    async fn list_diaries(
        &self,
        filter: &DiaryFilter,
    ) -> anyhow::Result<(Vec<DiaryWithChildren>, i64)>;

    /// スカラー項目のみを更新する。対象が存在しなければ`false`。
    async fn update_diary_fields(&self, id: i64, patch: &DiaryPatch) -> anyhow::Result<bool>;

    /// 感情レポートだけを書き込む小さな別トランザクション。
    /// 作成コミット後のベストエフォート経路から呼ばれる。
    async fn update_emotion_report(&self, id: i64, report: &Value) -> anyhow::Result<()>;

    /// タグの全置換。入力は正規化（trim・空除去・初出順の重複排除）された上で、
    /// 既存の結合行を全削除し、名前でupsertしたタグへ張り直す。
    async fn replace_tags(&self, diary_id: i64, names: &[String]) -> anyhow::Result<()>;

    /// 画像の全置換。`display_order`は入力順で1..Nを振り直す。
    async fn replace_images(&self, diary_id: i64, urls: &[String]) -> anyhow::Result<()>;

    /// 日記を削除する（タグ結合・画像はカスケード）。存在しなければ`false`。
    async fn delete_diary(&self, id: i64) -> anyhow::Result<bool>;

    // Aggregation inputs

    /// フィルタ条件に合う日記の`emotion_report`列だけを取り出す。
    /// 集計側が3種類の保存形（オブジェクト／JSON文字列／欠損）を吸収する。
    async fn emotion_payloads(
        &self,
        user_id: Option<i64>,
        date_from: Option<chrono::DateTime<chrono::Utc>>,
        date_to: Option<chrono::DateTime<chrono::Utc>>,
    ) -> anyhow::Result<Vec<Option<Value>>>;

    /// 指定日の週間統計から否定感情の頻度を読む。統計行が無ければ0。
    async fn weekly_negative_count(&self, user_id: i64, on: NaiveDate) -> anyhow::Result<i64>;

    // Notification engine

    async fn opted_in_users(&self) -> anyhow::Result<Vec<NotificationUser>>;

    /// カタログを冪等にシードする。既存の(weekday, channel)はスキップし、
    /// 新規挿入した行数を返す。
    async fn seed_notification_definitions(
        &self,
        definitions: &[SeedDefinition],
    ) -> anyhow::Result<u64>;

    async fn list_notification_definitions(
        &self,
    ) -> anyhow::Result<Vec<NotificationDefinition>>;

    async fn find_definition(
        &self,
        weekday: i16,
        channel: Channel,
    ) -> anyhow::Result<Option<NotificationDefinition>>;

    /// ユーザーの割当を単一スロットとして上書きする（追記しない）。
    async fn upsert_assignment(&self, user_id: i64, definition_id: i64) -> anyhow::Result<()>;

    async fn assignment_for_user(
        &self,
        user_id: i64,
    ) -> anyhow::Result<Option<NotificationAssignment>>;
}
