// テスト専用のインメモリDAO。DB接続なしでパイプラインと
// ターゲティングエンジンの単体テストを可能にする。

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;

use crate::store::models::{
    Channel, DiaryFilter, DiaryImage, DiaryPatch, DiaryRecord, DiaryWithChildren, NewDiary,
    NotificationAssignment, NotificationDefinition, NotificationUser,
};
use crate::util::text::unique_nonempty_trimmed;

use super::{DiaryDao, SeedDefinition};

#[derive(Default)]
struct State {
    next_diary_id: i64,
    diaries: BTreeMap<i64, DiaryWithChildren>,
    weekly_negative: HashMap<(i64, NaiveDate), i64>,
    users: Vec<NotificationUser>,
    next_definition_id: i64,
    definitions: Vec<NotificationDefinition>,
    assignments: HashMap<i64, i64>,
}

#[derive(Default)]
pub(crate) struct MemoryDiaryDao {
    state: Mutex<State>,
}

impl MemoryDiaryDao {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_user(&self, user: NotificationUser) {
        self.state.lock().expect("mock state").users.push(user);
    }

    pub(crate) fn set_weekly_negative(&self, user_id: i64, on: NaiveDate, frequency: i64) {
        self.state
            .lock()
            .expect("mock state")
            .weekly_negative
            .insert((user_id, on), frequency);
    }

    /// 不完全なシードをシミュレートするために一組だけ落とす。
    pub(crate) fn remove_definition(&self, weekday: i16, channel: Channel) {
        self.state
            .lock()
            .expect("mock state")
            .definitions
            .retain(|d| !(d.weekday == weekday && d.channel == channel));
    }

    pub(crate) fn assignment_count(&self, user_id: i64) -> usize {
        let state = self.state.lock().expect("mock state");
        usize::from(state.assignments.contains_key(&user_id))
    }
}

fn matches_filter(entry: &DiaryWithChildren, filter: &DiaryFilter) -> bool {
    if let Some(user_id) = filter.user_id {
        if entry.diary.user_id != user_id {
            return false;
        }
    }
    if let Some(label) = filter.label {
        let stored = entry
            .diary
            .emotion_report
            .as_ref()
            .and_then(|report| report.get("main_emotion"))
            .and_then(Value::as_str);
        if stored != Some(label.as_str()) {
            return false;
        }
    }
    if let Some(from) = filter.date_from {
        if entry.diary.created_at < from {
            return false;
        }
    }
    if let Some(to) = filter.date_to {
        if entry.diary.created_at > to {
            return false;
        }
    }
    true
}

#[async_trait]
impl DiaryDao for MemoryDiaryDao {
    async fn create_diary(&self, new: NewDiary) -> Result<DiaryWithChildren> {
        let mut state = self.state.lock().expect("mock state");
        state.next_diary_id += 1;
        let id = state.next_diary_id;
        let now = Utc::now();

        let tags = unique_nonempty_trimmed(&new.tags);
        let images = unique_nonempty_trimmed(&new.images)
            .into_iter()
            .enumerate()
            .map(|(index, url)| DiaryImage {
                url,
                display_order: i32::try_from(index + 1).expect("image count fits i32"),
            })
            .collect();

        let entry = DiaryWithChildren {
            diary: DiaryRecord {
                id,
                user_id: new.user_id,
                title: new.title,
                content: new.content,
                emotion_report: new.emotion_report,
                created_at: now,
                updated_at: now,
            },
            tags,
            images,
        };
        state.diaries.insert(id, entry.clone());
        Ok(entry)
    }

    async fn diary_by_id(&self, id: i64) -> Result<Option<DiaryWithChildren>> {
        Ok(self
            .state
            .lock()
            .expect("mock state")
            .diaries
            .get(&id)
            .cloned())
    }

    async fn list_diaries(
        &self,
        filter: &DiaryFilter,
    ) -> Result<(Vec<DiaryWithChildren>, i64)> {
        let state = self.state.lock().expect("mock state");
        let mut matched: Vec<DiaryWithChildren> = state
            .diaries
            .values()
            .filter(|entry| matches_filter(entry, filter))
            .cloned()
            .collect();
        matched.sort_by(|a, b| {
            b.diary
                .created_at
                .cmp(&a.diary.created_at)
                .then(b.diary.id.cmp(&a.diary.id))
        });

        let total = i64::try_from(matched.len()).context("result set too large")?;
        let offset = usize::try_from((filter.page - 1) * filter.page_size).unwrap_or(0);
        let page_size = usize::try_from(filter.page_size).unwrap_or(0);
        let items = matched.into_iter().skip(offset).take(page_size).collect();
        Ok((items, total))
    }

    async fn update_diary_fields(&self, id: i64, patch: &DiaryPatch) -> Result<bool> {
        let mut state = self.state.lock().expect("mock state");
        let Some(entry) = state.diaries.get_mut(&id) else {
            return Ok(false);
        };
        if let Some(title) = &patch.title {
            entry.diary.title = title.clone();
        }
        if let Some(content) = &patch.content {
            entry.diary.content = content.clone();
        }
        if let Some(report) = &patch.emotion_report {
            entry.diary.emotion_report = Some(report.clone());
        }
        entry.diary.updated_at = Utc::now();
        Ok(true)
    }

    async fn update_emotion_report(&self, id: i64, report: &Value) -> Result<()> {
        let mut state = self.state.lock().expect("mock state");
        let entry = state
            .diaries
            .get_mut(&id)
            .context("diary missing in mock store")?;
        entry.diary.emotion_report = Some(report.clone());
        entry.diary.updated_at = Utc::now();
        Ok(())
    }

    async fn replace_tags(&self, diary_id: i64, names: &[String]) -> Result<()> {
        let mut state = self.state.lock().expect("mock state");
        let entry = state
            .diaries
            .get_mut(&diary_id)
            .context("diary missing in mock store")?;
        entry.tags = unique_nonempty_trimmed(names);
        Ok(())
    }

    async fn replace_images(&self, diary_id: i64, urls: &[String]) -> Result<()> {
        let mut state = self.state.lock().expect("mock state");
        let entry = state
            .diaries
            .get_mut(&diary_id)
            .context("diary missing in mock store")?;
        entry.images = unique_nonempty_trimmed(urls)
            .into_iter()
            .enumerate()
            .map(|(index, url)| DiaryImage {
                url,
                display_order: i32::try_from(index + 1).expect("image count fits i32"),
            })
            .collect();
        Ok(())
    }

    async fn delete_diary(&self, id: i64) -> Result<bool> {
        Ok(self
            .state
            .lock()
            .expect("mock state")
            .diaries
            .remove(&id)
            .is_some())
    }

    async fn emotion_payloads(
        &self,
        user_id: Option<i64>,
        date_from: Option<DateTime<Utc>>,
        date_to: Option<DateTime<Utc>>,
    ) -> Result<Vec<Option<Value>>> {
        let filter = DiaryFilter {
            user_id,
            label: None,
            date_from,
            date_to,
            page: 1,
            page_size: i64::MAX,
        };
        let state = self.state.lock().expect("mock state");
        Ok(state
            .diaries
            .values()
            .filter(|entry| matches_filter(entry, &filter))
            .map(|entry| entry.diary.emotion_report.clone())
            .collect())
    }

    async fn weekly_negative_count(&self, user_id: i64, on: NaiveDate) -> Result<i64> {
        Ok(self
            .state
            .lock()
            .expect("mock state")
            .weekly_negative
            .get(&(user_id, on))
            .copied()
            .unwrap_or(0))
    }

    async fn opted_in_users(&self) -> Result<Vec<NotificationUser>> {
        Ok(self.state.lock().expect("mock state").users.clone())
    }

    async fn seed_notification_definitions(
        &self,
        definitions: &[SeedDefinition],
    ) -> Result<u64> {
        let mut state = self.state.lock().expect("mock state");
        let mut inserted = 0_u64;
        for seed in definitions {
            let exists = state
                .definitions
                .iter()
                .any(|d| d.weekday == seed.weekday && d.channel == seed.channel);
            if exists {
                continue;
            }
            state.next_definition_id += 1;
            let id = state.next_definition_id;
            state.definitions.push(NotificationDefinition {
                id,
                weekday: seed.weekday,
                channel: seed.channel,
                message: seed.message.to_string(),
            });
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn list_notification_definitions(&self) -> Result<Vec<NotificationDefinition>> {
        let mut definitions = self
            .state
            .lock()
            .expect("mock state")
            .definitions
            .clone();
        definitions.sort_by_key(|d| (d.weekday, d.channel.as_str()));
        Ok(definitions)
    }

    async fn find_definition(
        &self,
        weekday: i16,
        channel: Channel,
    ) -> Result<Option<NotificationDefinition>> {
        Ok(self
            .state
            .lock()
            .expect("mock state")
            .definitions
            .iter()
            .find(|d| d.weekday == weekday && d.channel == channel)
            .cloned())
    }

    async fn upsert_assignment(&self, user_id: i64, definition_id: i64) -> Result<()> {
        self.state
            .lock()
            .expect("mock state")
            .assignments
            .insert(user_id, definition_id);
        Ok(())
    }

    async fn assignment_for_user(
        &self,
        user_id: i64,
    ) -> Result<Option<NotificationAssignment>> {
        let state = self.state.lock().expect("mock state");
        let Some(definition_id) = state.assignments.get(&user_id).copied() else {
            return Ok(None);
        };
        let definition = state
            .definitions
            .iter()
            .find(|d| d.id == definition_id)
            .context("assignment points at missing definition")?;
        Ok(Some(NotificationAssignment {
            user_id,
            definition_id,
            weekday: definition.weekday,
            channel: definition.channel,
            message: definition.message.clone(),
        }))
    }
}
