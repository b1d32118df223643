use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;

use crate::app::AppState;
use crate::pipeline::diary::{CreateDiaryInput, DiaryError, ListDiariesInput, UpdateDiaryInput};
use crate::pipeline::emotion::main_emotion_of;
use crate::store::models::{DiaryWithChildren, EmotionLabel, EmotionReport};

#[derive(Debug, Deserialize)]
pub(crate) struct CreateDiaryRequest {
    user_id: i64,
    title: String,
    content: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    images: Vec<String>,
    #[serde(default)]
    emotion_report: Option<EmotionReport>,
}

/// 部分更新。タグ・画像はフィールド省略で据え置き、空配列で全削除。
#[derive(Debug, Deserialize)]
pub(crate) struct UpdateDiaryRequest {
    title: Option<String>,
    content: Option<String>,
    tags: Option<Vec<String>>,
    images: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListDiariesQuery {
    user_id: Option<i64>,
    label: Option<String>,
    date_from: Option<DateTime<Utc>>,
    date_to: Option<DateTime<Utc>>,
    #[serde(default = "default_page")]
    page: i64,
    #[serde(default = "default_page_size")]
    page_size: i64,
}

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    20
}

#[derive(Debug, Serialize)]
pub(crate) struct DiaryImageResponse {
    url: String,
    order: i32,
}

#[derive(Debug, Serialize)]
pub(crate) struct DiaryResponse {
    id: i64,
    user_id: i64,
    title: String,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    main_emotion: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    emotion_report: Option<Value>,
    tags: Vec<String>,
    images: Vec<DiaryImageResponse>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub(crate) struct DiaryListItem {
    id: i64,
    user_id: i64,
    title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    main_emotion: Option<&'static str>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub(crate) struct PageMeta {
    page: i64,
    page_size: i64,
    total: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct DiaryListResponse {
    items: Vec<DiaryListItem>,
    meta: PageMeta,
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: String,
}

fn diary_response(entry: DiaryWithChildren) -> DiaryResponse {
    let main_emotion = entry
        .diary
        .emotion_report
        .as_ref()
        .and_then(main_emotion_of)
        .map(EmotionLabel::as_str);
    DiaryResponse {
        id: entry.diary.id,
        user_id: entry.diary.user_id,
        title: entry.diary.title,
        content: entry.diary.content,
        main_emotion,
        emotion_report: entry.diary.emotion_report,
        tags: entry.tags,
        images: entry
            .images
            .into_iter()
            .map(|image| DiaryImageResponse {
                url: image.url,
                order: image.display_order,
            })
            .collect(),
        created_at: entry.diary.created_at,
        updated_at: entry.diary.updated_at,
    }
}

fn list_item(entry: DiaryWithChildren) -> DiaryListItem {
    let main_emotion = entry
        .diary
        .emotion_report
        .as_ref()
        .and_then(main_emotion_of)
        .map(EmotionLabel::as_str);
    DiaryListItem {
        id: entry.diary.id,
        user_id: entry.diary.user_id,
        title: entry.diary.title,
        main_emotion,
        created_at: entry.diary.created_at,
    }
}

pub(crate) fn error_response(error: &DiaryError) -> Response {
    match error {
        DiaryError::Validation(message) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: message.clone(),
            }),
        )
            .into_response(),
        DiaryError::NotFound(id) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("diary {id} not found"),
            }),
        )
            .into_response(),
        DiaryError::Persistence(source) => {
            error!(error = %source, "diary persistence failure");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "internal error".to_string(),
                }),
            )
                .into_response()
        }
    }
}

pub(crate) async fn create(
    State(state): State<AppState>,
    Json(payload): Json<CreateDiaryRequest>,
) -> Response {
    let input = CreateDiaryInput {
        user_id: payload.user_id,
        title: payload.title,
        content: payload.content,
        tags: payload.tags,
        images: payload.images,
        emotion_report: payload.emotion_report,
    };

    match state.pipeline().create(input).await {
        Ok(entry) => (StatusCode::CREATED, Json(diary_response(entry))).into_response(),
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn fetch(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.pipeline().get(id).await {
        Ok(entry) => Json(diary_response(entry)).into_response(),
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListDiariesQuery>,
) -> Response {
    let label = match query.label.as_deref() {
        None => None,
        Some(raw) => match EmotionLabel::parse(raw) {
            Some(label) => Some(label),
            None => {
                return error_response(&DiaryError::Validation(format!(
                    "unknown emotion label: {raw}"
                )));
            }
        },
    };

    let input = ListDiariesInput {
        user_id: query.user_id,
        label,
        date_from: query.date_from,
        date_to: query.date_to,
        page: query.page,
        page_size: query.page_size,
    };

    match state.pipeline().list(input).await {
        Ok((items, total)) => Json(DiaryListResponse {
            items: items.into_iter().map(list_item).collect(),
            meta: PageMeta {
                page: query.page,
                page_size: query.page_size,
                total,
            },
        })
        .into_response(),
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn update(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateDiaryRequest>,
) -> Response {
    let input = UpdateDiaryInput {
        title: payload.title,
        content: payload.content,
        tags: payload.tags,
        images: payload.images,
    };

    match state.pipeline().update(id, input).await {
        Ok(entry) => Json(diary_response(entry)).into_response(),
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn remove(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.pipeline().delete(id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error_response(&error),
    }
}
