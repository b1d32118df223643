use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use sqlx::{PgPool, Postgres, Row, Transaction};

use crate::store::models::{
    Channel, DiaryFilter, DiaryImage, DiaryPatch, DiaryRecord, DiaryWithChildren, EmotionLabel,
    NewDiary, NotificationAssignment, NotificationDefinition, NotificationUser,
};
use crate::util::text::unique_nonempty_trimmed;

use super::{DiaryDao, SeedDefinition};

/// Postgres実装。コネクションプールを所有し、書き込み系は明示的な
/// トランザクション境界で囲む。
#[derive(Debug, Clone)]
pub(crate) struct PgDiaryDao {
    pool: PgPool,
}

impl PgDiaryDao {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_children(
        &self,
        ids: &[i64],
    ) -> Result<(HashMap<i64, Vec<String>>, HashMap<i64, Vec<DiaryImage>>)> {
        if ids.is_empty() {
            return Ok((HashMap::new(), HashMap::new()));
        }

        let tag_rows = sqlx::query(
            r"
            SELECT dt.diary_id, t.name
            FROM diary_tags dt
            JOIN tags t ON t.id = dt.tag_id
            WHERE dt.diary_id = ANY($1)
            ORDER BY dt.id
            ",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .context("failed to fetch diary tags")?;

        let mut tags: HashMap<i64, Vec<String>> = HashMap::new();
        for row in tag_rows {
            let diary_id: i64 = row.try_get("diary_id")?;
            let name: String = row.try_get("name")?;
            tags.entry(diary_id).or_default().push(name);
        }

        let image_rows = sqlx::query(
            r"
            SELECT diary_id, url, display_order
            FROM diary_images
            WHERE diary_id = ANY($1)
            ORDER BY diary_id, display_order
            ",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .context("failed to fetch diary images")?;

        let mut images: HashMap<i64, Vec<DiaryImage>> = HashMap::new();
        for row in image_rows {
            let diary_id: i64 = row.try_get("diary_id")?;
            images.entry(diary_id).or_default().push(DiaryImage {
                url: row.try_get("url")?,
                display_order: row.try_get("display_order")?,
            });
        }

        Ok((tags, images))
    }

    async fn assemble(&self, records: Vec<DiaryRecord>) -> Result<Vec<DiaryWithChildren>> {
        let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
        let (mut tags, mut images) = self.load_children(&ids).await?;

        Ok(records
            .into_iter()
            .map(|diary| {
                let id = diary.id;
                DiaryWithChildren {
                    diary,
                    tags: tags.remove(&id).unwrap_or_default(),
                    images: images.remove(&id).unwrap_or_default(),
                }
            })
            .collect())
    }
}

fn diary_from_row(row: &sqlx::postgres::PgRow) -> Result<DiaryRecord> {
    Ok(DiaryRecord {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        emotion_report: row.try_get("emotion_report")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// タグ結合を全削除してから張り直す。呼び出し側のトランザクションに相乗りする。
async fn replace_tags_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    diary_id: i64,
    names: &[String],
) -> Result<()> {
    sqlx::query("DELETE FROM diary_tags WHERE diary_id = $1")
        .bind(diary_id)
        .execute(&mut **tx)
        .await
        .context("failed to clear diary tags")?;

    for name in unique_nonempty_trimmed(names) {
        let row = sqlx::query(
            r"
            WITH ins AS (
                INSERT INTO tags (name) VALUES ($1)
                ON CONFLICT (name) DO NOTHING
                RETURNING id
            )
            SELECT id FROM ins
            UNION ALL
            SELECT id FROM tags WHERE name = $1
            LIMIT 1
            ",
        )
        .bind(&name)
        .fetch_one(&mut **tx)
        .await
        .with_context(|| format!("failed to upsert tag {name:?}"))?;
        let tag_id: i64 = row.try_get("id")?;

        sqlx::query(
            r"
            INSERT INTO diary_tags (diary_id, tag_id) VALUES ($1, $2)
            ON CONFLICT (diary_id, tag_id) DO NOTHING
            ",
        )
        .bind(diary_id)
        .bind(tag_id)
        .execute(&mut **tx)
        .await
        .context("failed to link diary tag")?;
    }

    Ok(())
}

/// 画像行を全削除し、入力順に`display_order = 1..N`で挿入し直す。
async fn replace_images_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    diary_id: i64,
    urls: &[String],
) -> Result<()> {
    sqlx::query("DELETE FROM diary_images WHERE diary_id = $1")
        .bind(diary_id)
        .execute(&mut **tx)
        .await
        .context("failed to clear diary images")?;

    for (index, url) in unique_nonempty_trimmed(urls).into_iter().enumerate() {
        let display_order = i32::try_from(index + 1).context("image list too long")?;
        sqlx::query(
            r"
            INSERT INTO diary_images (diary_id, display_order, url)
            VALUES ($1, $2, $3)
            ",
        )
        .bind(diary_id)
        .bind(display_order)
        .bind(&url)
        .execute(&mut **tx)
        .await
        .context("failed to insert diary image")?;
    }

    Ok(())
}

#[async_trait]
impl DiaryDao for PgDiaryDao {
    async fn create_diary(&self, new: NewDiary) -> Result<DiaryWithChildren> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin transaction")?;

        let row = sqlx::query(
            r"
            INSERT INTO diaries (user_id, title, content, emotion_report, created_at, updated_at)
            VALUES ($1, $2, $3, $4, NOW(), NOW())
            RETURNING id
            ",
        )
        .bind(new.user_id)
        .bind(&new.title)
        .bind(&new.content)
        .bind(new.emotion_report.clone())
        .fetch_one(&mut *tx)
        .await
        .context("failed to insert diary")?;
        let id: i64 = row.try_get("id")?;

        if !new.tags.is_empty() {
            replace_tags_in_tx(&mut tx, id, &new.tags).await?;
        }
        if !new.images.is_empty() {
            replace_images_in_tx(&mut tx, id, &new.images).await?;
        }

        tx.commit().await.context("failed to commit diary create")?;

        self.diary_by_id(id)
            .await?
            .context("diary disappeared right after insert")
    }

    async fn diary_by_id(&self, id: i64) -> Result<Option<DiaryWithChildren>> {
        let row = sqlx::query(
            r"
            SELECT id, user_id, title, content, emotion_report, created_at, updated_at
            FROM diaries
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to fetch diary")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let record = diary_from_row(&row)?;
        let mut assembled = self.assemble(vec![record]).await?;
        Ok(assembled.pop())
    }

    async fn list_diaries(
        &self,
        filter: &DiaryFilter,
    ) -> Result<(Vec<DiaryWithChildren>, i64)> {
        let label = filter.label.map(EmotionLabel::as_str);
        let offset = (filter.page - 1) * filter.page_size;

        let count_row = sqlx::query(
            r"
            SELECT COUNT(*) AS total
            FROM diaries
            WHERE ($1::BIGINT IS NULL OR user_id = $1)
              AND ($2::TEXT IS NULL OR emotion_report->>'main_emotion' = $2)
              AND ($3::TIMESTAMPTZ IS NULL OR created_at >= $3)
              AND ($4::TIMESTAMPTZ IS NULL OR created_at <= $4)
            ",
        )
        .bind(filter.user_id)
        .bind(label)
        .bind(filter.date_from)
        .bind(filter.date_to)
        .fetch_one(&self.pool)
        .await
        .context("failed to count diaries")?;
        let total: i64 = count_row.try_get("total")?;

        let rows = sqlx::query(
            r"
            SELECT id, user_id, title, content, emotion_report, created_at, updated_at
            FROM diaries
            WHERE ($1::BIGINT IS NULL OR user_id = $1)
              AND ($2::TEXT IS NULL OR emotion_report->>'main_emotion' = $2)
              AND ($3::TIMESTAMPTZ IS NULL OR created_at >= $3)
              AND ($4::TIMESTAMPTZ IS NULL OR created_at <= $4)
            ORDER BY created_at DESC, id DESC
            LIMIT $5 OFFSET $6
            ",
        )
        .bind(filter.user_id)
        .bind(label)
        .bind(filter.date_from)
        .bind(filter.date_to)
        .bind(filter.page_size)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .context("failed to list diaries")?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            records.push(diary_from_row(row)?);
        }

        let items = self.assemble(records).await?;
        Ok((items, total))
    }

    async fn update_diary_fields(&self, id: i64, patch: &DiaryPatch) -> Result<bool> {
        if patch.is_empty() {
            // Nothing to write; report whether the row exists.
            return Ok(self.diary_by_id(id).await?.is_some());
        }

        let result = sqlx::query(
            r"
            UPDATE diaries SET
                title = COALESCE($2, title),
                content = COALESCE($3, content),
                emotion_report = COALESCE($4, emotion_report),
                updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(patch.title.as_deref())
        .bind(patch.content.as_deref())
        .bind(patch.emotion_report.clone())
        .execute(&self.pool)
        .await
        .context("failed to update diary fields")?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_emotion_report(&self, id: i64, report: &Value) -> Result<()> {
        sqlx::query(
            r"
            UPDATE diaries SET emotion_report = $2, updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(report.clone())
        .execute(&self.pool)
        .await
        .context("failed to persist emotion report")?;
        Ok(())
    }

    async fn replace_tags(&self, diary_id: i64, names: &[String]) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin transaction")?;
        replace_tags_in_tx(&mut tx, diary_id, names).await?;
        tx.commit().await.context("failed to commit tag replace")?;
        Ok(())
    }

    async fn replace_images(&self, diary_id: i64, urls: &[String]) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin transaction")?;
        replace_images_in_tx(&mut tx, diary_id, urls).await?;
        tx.commit()
            .await
            .context("failed to commit image replace")?;
        Ok(())
    }

    async fn delete_diary(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM diaries WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("failed to delete diary")?;
        Ok(result.rows_affected() > 0)
    }

    async fn emotion_payloads(
        &self,
        user_id: Option<i64>,
        date_from: Option<DateTime<Utc>>,
        date_to: Option<DateTime<Utc>>,
    ) -> Result<Vec<Option<Value>>> {
        let rows = sqlx::query(
            r"
            SELECT emotion_report
            FROM diaries
            WHERE ($1::BIGINT IS NULL OR user_id = $1)
              AND ($2::TIMESTAMPTZ IS NULL OR created_at >= $2)
              AND ($3::TIMESTAMPTZ IS NULL OR created_at <= $3)
            ",
        )
        .bind(user_id)
        .bind(date_from)
        .bind(date_to)
        .fetch_all(&self.pool)
        .await
        .context("failed to fetch emotion payloads")?;

        let mut payloads = Vec::with_capacity(rows.len());
        for row in rows {
            payloads.push(row.try_get("emotion_report")?);
        }
        Ok(payloads)
    }

    async fn weekly_negative_count(&self, user_id: i64, on: NaiveDate) -> Result<i64> {
        let row = sqlx::query(
            r"
            SELECT frequency
            FROM emotion_stats
            WHERE user_id = $1
              AND period_type = 'weekly'
              AND label = $2
              AND created_at = $3
            ORDER BY id DESC
            LIMIT 1
            ",
        )
        .bind(user_id)
        .bind(EmotionLabel::Negative.as_str())
        .bind(on)
        .fetch_optional(&self.pool)
        .await
        .context("failed to fetch weekly negative stat")?;

        match row {
            Some(row) => {
                let frequency: i32 = row.try_get("frequency")?;
                Ok(i64::from(frequency))
            }
            None => Ok(0),
        }
    }

    async fn opted_in_users(&self) -> Result<Vec<NotificationUser>> {
        let rows = sqlx::query(
            r"
            SELECT id, nickname, channel, push_token, email, phone_number
            FROM users
            WHERE receive_notifications = TRUE
            ORDER BY id
            ",
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to fetch opted-in users")?;

        let mut users = Vec::with_capacity(rows.len());
        for row in rows {
            let raw_channel: String = row.try_get("channel")?;
            let channel = Channel::parse(&raw_channel)
                .with_context(|| format!("user has unknown channel {raw_channel:?}"))?;
            users.push(NotificationUser {
                id: row.try_get("id")?,
                nickname: row.try_get("nickname")?,
                channel,
                push_token: row.try_get("push_token")?,
                email: row.try_get("email")?,
                phone_number: row.try_get("phone_number")?,
            });
        }
        Ok(users)
    }

    async fn seed_notification_definitions(
        &self,
        definitions: &[SeedDefinition],
    ) -> Result<u64> {
        let mut inserted = 0_u64;
        for definition in definitions {
            let result = sqlx::query(
                r"
                INSERT INTO notification_definitions (weekday, channel, message)
                VALUES ($1, $2, $3)
                ON CONFLICT (weekday, channel) DO NOTHING
                ",
            )
            .bind(definition.weekday)
            .bind(definition.channel.as_str())
            .bind(definition.message)
            .execute(&self.pool)
            .await
            .context("failed to seed notification definition")?;
            inserted += result.rows_affected();
        }
        Ok(inserted)
    }

    async fn list_notification_definitions(&self) -> Result<Vec<NotificationDefinition>> {
        let rows = sqlx::query(
            r"
            SELECT id, weekday, channel, message
            FROM notification_definitions
            ORDER BY weekday, channel
            ",
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to list notification definitions")?;

        let mut definitions = Vec::with_capacity(rows.len());
        for row in rows {
            definitions.push(definition_from_row(&row)?);
        }
        Ok(definitions)
    }

    async fn find_definition(
        &self,
        weekday: i16,
        channel: Channel,
    ) -> Result<Option<NotificationDefinition>> {
        let row = sqlx::query(
            r"
            SELECT id, weekday, channel, message
            FROM notification_definitions
            WHERE weekday = $1 AND channel = $2
            ",
        )
        .bind(weekday)
        .bind(channel.as_str())
        .fetch_optional(&self.pool)
        .await
        .context("failed to fetch notification definition")?;

        row.as_ref().map(definition_from_row).transpose()
    }

    async fn upsert_assignment(&self, user_id: i64, definition_id: i64) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO user_notification_assignments (user_id, definition_id, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (user_id)
            DO UPDATE SET definition_id = EXCLUDED.definition_id, updated_at = NOW()
            ",
        )
        .bind(user_id)
        .bind(definition_id)
        .execute(&self.pool)
        .await
        .context("failed to upsert notification assignment")?;
        Ok(())
    }

    async fn assignment_for_user(
        &self,
        user_id: i64,
    ) -> Result<Option<NotificationAssignment>> {
        let row = sqlx::query(
            r"
            SELECT a.user_id, a.definition_id, d.weekday, d.channel, d.message
            FROM user_notification_assignments a
            JOIN notification_definitions d ON d.id = a.definition_id
            WHERE a.user_id = $1
            ",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to fetch notification assignment")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let raw_channel: String = row.try_get("channel")?;
        let channel = Channel::parse(&raw_channel)
            .with_context(|| format!("assignment has unknown channel {raw_channel:?}"))?;

        Ok(Some(NotificationAssignment {
            user_id: row.try_get("user_id")?,
            definition_id: row.try_get("definition_id")?,
            weekday: row.try_get("weekday")?,
            channel,
            message: row.try_get("message")?,
        }))
    }
}

fn definition_from_row(row: &sqlx::postgres::PgRow) -> Result<NotificationDefinition> {
    let raw_channel: String = row.try_get("channel")?;
    let channel = Channel::parse(&raw_channel)
        .with_context(|| format!("definition has unknown channel {raw_channel:?}"))?;
    Ok(NotificationDefinition {
        id: row.try_get("id")?,
        weekday: row.try_get("weekday")?,
        channel,
        message: row.try_get("message")?,
    })
}
