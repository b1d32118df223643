use std::collections::BTreeMap;

use axum::{
    Json,
    extract::{Query, State},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Days, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::app::AppState;
use crate::pipeline::diary::DiaryError;
use crate::store::models::EmotionLabel;
use crate::util::time::{kst, kst_date};

use super::diaries::error_response;

const DAYS_MAX: i64 = 365;
const DAYS_DEFAULT: i64 = 7;

#[derive(Debug, Deserialize)]
pub(crate) struct SummaryQuery {
    user_id: Option<i64>,
    date_from: Option<DateTime<Utc>>,
    date_to: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SummaryResponse {
    items: BTreeMap<String, i64>,
}

/// 期間内の日記を主要感情ラベル別に集計する。
pub(crate) async fn summary(
    State(state): State<AppState>,
    Query(query): Query<SummaryQuery>,
) -> Response {
    match state
        .pipeline()
        .emotion_summary(query.user_id, query.date_from, query.date_to)
        .await
    {
        Ok(counts) => Json(SummaryResponse {
            items: to_labeled_items(&counts),
        })
        .into_response(),
        Err(error) => error_response(&error),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct DailyQuery {
    user_id: Option<i64>,
    date_to: Option<NaiveDate>,
    #[serde(default = "default_days")]
    days: i64,
}

fn default_days() -> i64 {
    DAYS_DEFAULT
}

#[derive(Debug, Serialize)]
pub(crate) struct DailyResponse {
    period: &'static str,
    from: NaiveDate,
    to: NaiveDate,
    items: BTreeMap<String, i64>,
}

/// 基準日（省略時はKSTの今日）から直近N日間の集計。
///
/// 窓は両端含み [date_to-(days-1), date_to]。KSTの0時境界に変換して
/// ストアへ渡す。
pub(crate) async fn daily(
    State(state): State<AppState>,
    Query(query): Query<DailyQuery>,
) -> Response {
    if query.days < 1 || query.days > DAYS_MAX {
        return error_response(&DiaryError::Validation(format!(
            "days must be between 1 and {DAYS_MAX}"
        )));
    }

    let to = query.date_to.unwrap_or_else(|| kst_date(Utc::now()));
    let span = u64::try_from(query.days - 1).unwrap_or(0);
    let Some(from) = to.checked_sub_days(Days::new(span)) else {
        return error_response(&DiaryError::Validation(
            "date range is out of bounds".to_string(),
        ));
    };
    let Some(upper) = to.checked_add_days(Days::new(1)) else {
        return error_response(&DiaryError::Validation(
            "date range is out of bounds".to_string(),
        ));
    };

    let date_from = kst_midnight(from);
    let date_to = kst_midnight(upper);

    match state
        .pipeline()
        .emotion_summary(query.user_id, Some(date_from), Some(date_to))
        .await
    {
        Ok(counts) => Json(DailyResponse {
            period: "daily",
            from,
            to,
            items: to_labeled_items(&counts),
        })
        .into_response(),
        Err(error) => error_response(&error),
    }
}

fn to_labeled_items(counts: &BTreeMap<EmotionLabel, i64>) -> BTreeMap<String, i64> {
    counts
        .iter()
        .map(|(label, count)| (label.as_str().to_string(), *count))
        .collect()
}

fn kst_midnight(date: NaiveDate) -> DateTime<Utc> {
    let naive = date.and_time(NaiveTime::MIN);
    match kst().from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(first, _) => first.with_timezone(&Utc),
        LocalResult::None => unreachable!("fixed offset should not produce nonexistent times"),
    }
}
