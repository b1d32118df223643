use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Serialize;
use tracing::error;

use crate::app::AppState;
use crate::notifier::targeting::TargetingError;
use crate::store::models::{NotificationAssignment, NotificationDefinition, NotificationTarget};

use super::diaries::ErrorResponse;

#[derive(Debug, Serialize)]
pub(crate) struct DefinitionResponse {
    id: i64,
    weekday: i16,
    channel: &'static str,
    message: String,
}

impl From<NotificationDefinition> for DefinitionResponse {
    fn from(definition: NotificationDefinition) -> Self {
        Self {
            id: definition.id,
            weekday: definition.weekday,
            channel: definition.channel.as_str(),
            message: definition.message,
        }
    }
}

pub(crate) async fn definitions(State(state): State<AppState>) -> Response {
    match state.dao().list_notification_definitions().await {
        Ok(definitions) => Json(
            definitions
                .into_iter()
                .map(DefinitionResponse::from)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(error) => {
            error!(%error, "failed to list notification definitions");
            internal_error()
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AssignmentResponse {
    user_id: i64,
    definition_id: i64,
    weekday: i16,
    channel: &'static str,
    message: String,
}

impl From<NotificationAssignment> for AssignmentResponse {
    fn from(assignment: NotificationAssignment) -> Self {
        Self {
            user_id: assignment.user_id,
            definition_id: assignment.definition_id,
            weekday: assignment.weekday,
            channel: assignment.channel.as_str(),
            message: assignment.message,
        }
    }
}

pub(crate) async fn assignment(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Response {
    match state.dao().assignment_for_user(user_id).await {
        Ok(Some(assignment)) => Json(AssignmentResponse::from(assignment)).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("no notification assignment for user {user_id}"),
            }),
        )
            .into_response(),
        Err(error) => {
            error!(%error, user_id, "failed to fetch notification assignment");
            internal_error()
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct TargetResponse {
    user_id: i64,
    nickname: String,
    channel: &'static str,
    message: String,
}

impl From<NotificationTarget> for TargetResponse {
    fn from(target: NotificationTarget) -> Self {
        Self {
            user_id: target.user.id,
            nickname: target.user.nickname,
            channel: target.user.channel.as_str(),
            message: target.message,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct EvaluateResponse {
    targets: Vec<TargetResponse>,
}

/// ターゲティング評価のみを実行する（配送しない）。
pub(crate) async fn evaluate(State(state): State<AppState>) -> Response {
    match state.scheduler().evaluate_only(Utc::now()).await {
        Ok(targets) => Json(EvaluateResponse {
            targets: targets.into_iter().map(TargetResponse::from).collect(),
        })
        .into_response(),
        Err(error) => targeting_error_response(&error),
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct SendResponse {
    evaluated: usize,
    sent_user_ids: Vec<i64>,
}

/// 評価と配送を一度に実行する。
pub(crate) async fn send_now(State(state): State<AppState>) -> Response {
    match state.scheduler().run_sweep(Utc::now()).await {
        Ok(outcome) => Json(SendResponse {
            evaluated: outcome.evaluated,
            sent_user_ids: outcome.sent_user_ids,
        })
        .into_response(),
        Err(error) => targeting_error_response(&error),
    }
}

fn targeting_error_response(error: &TargetingError) -> Response {
    match error {
        TargetingError::MissingDefinition { .. } => {
            // シードが完全なら起こり得ない。設定エラーとして大きく残す。
            error!(%error, "notification catalogue seed is incomplete");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: error.to_string(),
                }),
            )
                .into_response()
        }
        TargetingError::Persistence(source) => {
            error!(error = %source, "targeting sweep failed on persistence");
            internal_error()
        }
    }
}

fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "internal error".to_string(),
        }),
    )
        .into_response()
}
