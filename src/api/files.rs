use axum::{
    Json,
    extract::{Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::app::AppState;

use super::diaries::ErrorResponse;

#[derive(Debug, Serialize)]
pub(crate) struct UploadImagesResponse {
    urls: Vec<String>,
}

/// 画像をまとめてアップロードし、得られたURLを入力順で返す。
///
/// 個別ファイルの失敗はバッチ全体の失敗にしない（黙って落ちる）。
pub(crate) async fn upload(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let mut files = Vec::new();
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                let content_type = field
                    .content_type()
                    .map_or_else(|| "application/octet-stream".to_string(), str::to_string);
                match field.bytes().await {
                    Ok(bytes) => files.push((bytes.to_vec(), content_type)),
                    Err(error) => {
                        return bad_request(format!("failed to read multipart field: {error}"));
                    }
                }
            }
            Ok(None) => break,
            Err(error) => return bad_request(format!("malformed multipart request: {error}")),
        }
    }

    if files.is_empty() {
        return bad_request("no image files supplied".to_string());
    }

    let urls = state.media_client().upload_batch(files).await;
    Json(UploadImagesResponse { urls }).into_response()
}

fn bad_request(message: String) -> Response {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: message })).into_response()
}
