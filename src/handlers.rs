use crate::error::{AppError, ErrorDetail, SessionError};
use crate::models::{AnswerRecord, QuizMode, QuizResult};
use crate::session::{FinishIntent, SessionView};
use crate::state::{AppState, FinishOutcome, SessionSlot};
use crate::ws_protocol::{self as ws, WsEnvelope};
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use validator::{Validate, ValidationError, ValidationErrors};

fn request_id_from_headers(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

fn validation_details(errors: &ValidationErrors) -> Vec<ErrorDetail> {
    errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| ErrorDetail {
                field: field.to_string(),
                issue: e.code.to_string(),
            })
        })
        .collect()
}

fn find_slot(state: &AppState, id: &str, req_id: &str) -> Result<Arc<SessionSlot>, AppError> {
    state.slot(id).ok_or_else(|| AppError::session_not_found(req_id))
}

fn load_error(err: SessionError, req_id: String) -> AppError {
    match err {
        SessionError::Empty => AppError::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "NO_QUESTIONS",
            "no poll questions found in text",
            req_id,
        ),
        other => AppError::session(other, req_id),
    }
}

fn not_blank(text: &str) -> Result<(), ValidationError> {
    if text.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoadPayload {
    #[validate(length(max = 5000000), custom(function = "not_blank"))]
    pub text: String,
    #[serde(default)]
    pub mode: QuizMode,
}

impl LoadPayload {
    fn validated(&self, req_id: &str) -> Result<(), AppError> {
        self.validate().map_err(|errors| {
            AppError::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", "invalid quiz text", req_id)
                .with_details(validation_details(&errors))
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCreated {
    pub session_id: String,
    pub question_count: usize,
}

pub async fn create_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<LoadPayload>,
) -> Result<(StatusCode, Json<SessionCreated>), AppError> {
    let req_id = request_id_from_headers(&headers);
    payload.validated(&req_id)?;
    let (session_id, question_count) = state
        .create_session(&payload.text, payload.mode)
        .await
        .map_err(|e| load_error(e, req_id))?;
    Ok((StatusCode::CREATED, Json(SessionCreated { session_id, question_count })))
}

pub async fn get_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, AppError> {
    let req_id = request_id_from_headers(&headers);
    let slot = find_slot(&state, &id, &req_id)?;
    let view = slot.session.read().await.view();
    Ok(Json(view))
}

pub async fn load_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<LoadPayload>,
) -> Result<Json<serde_json::Value>, AppError> {
    let req_id = request_id_from_headers(&headers);
    payload.validated(&req_id)?;
    let slot = find_slot(&state, &id, &req_id)?;
    let count = state
        .load(&slot, &payload.text, payload.mode)
        .await
        .map_err(|e| load_error(e, req_id))?;
    Ok(Json(json!({ "questionCount": count })))
}

#[derive(Debug, Deserialize)]
pub struct SelectPayload {
    #[serde(rename = "optionIndex")]
    pub option_index: usize,
}

pub async fn select_option(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, question_id)): Path<(String, String)>,
    Json(payload): Json<SelectPayload>,
) -> Result<Json<AnswerRecord>, AppError> {
    let req_id = request_id_from_headers(&headers);
    let slot = find_slot(&state, &id, &req_id)?;
    let record = state
        .select_option(&slot, &question_id, payload.option_index)
        .await
        .map_err(|e| AppError::session(e, req_id))?;
    Ok(Json(record))
}

pub async fn check_answer(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, question_id)): Path<(String, String)>,
) -> Result<Json<AnswerRecord>, AppError> {
    let req_id = request_id_from_headers(&headers);
    let slot = find_slot(&state, &id, &req_id)?;
    let record = state
        .check_answer(&slot, &question_id)
        .await
        .map_err(|e| AppError::session(e, req_id))?;
    Ok(Json(record))
}

pub async fn finish_intent(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<FinishIntent>, AppError> {
    let req_id = request_id_from_headers(&headers);
    let slot = find_slot(&state, &id, &req_id)?;
    let intent = state
        .finish_intent(&slot)
        .await
        .map_err(|e| AppError::session(e, req_id))?;
    Ok(Json(intent))
}

#[derive(Debug, Default, Deserialize)]
pub struct FinishPayload {
    #[serde(default)]
    pub confirmed: bool,
}

pub async fn finish(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<FinishPayload>,
) -> Result<Json<QuizResult>, AppError> {
    let req_id = request_id_from_headers(&headers);
    let slot = find_slot(&state, &id, &req_id)?;
    match state
        .finish(&slot, payload.confirmed)
        .await
        .map_err(|e| AppError::session(e, req_id.clone()))?
    {
        FinishOutcome::Finished(result) => Ok(Json(result)),
        FinishOutcome::NeedsConfirmation(unanswered) => Err(AppError::new(
            StatusCode::CONFLICT,
            "CONFIRMATION_REQUIRED",
            format!("{} questions are unanswered", unanswered.len()),
            req_id,
        )
        .with_details(
            unanswered
                .into_iter()
                .map(|i| ErrorDetail {
                    field: format!("questions[{i}]"),
                    issue: "unanswered".into(),
                })
                .collect(),
        )),
        FinishOutcome::Superseded => Err(AppError::new(
            StatusCode::CONFLICT,
            "SUPERSEDED",
            "session was restarted while grading",
            req_id,
        )),
    }
}

pub async fn get_result(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<QuizResult>, AppError> {
    let req_id = request_id_from_headers(&headers);
    let slot = find_slot(&state, &id, &req_id)?;
    let result = slot.session.read().await.result().cloned();
    result
        .map(Json)
        .ok_or_else(|| AppError::new(StatusCode::NOT_FOUND, "NOT_FOUND", "quiz not finished yet", req_id))
}

pub async fn restart_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, AppError> {
    let req_id = request_id_from_headers(&headers);
    let slot = find_slot(&state, &id, &req_id)?;
    state.restart(&slot).await;
    let view = slot.session.read().await.view();
    Ok(Json(view))
}

pub async fn reset_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, AppError> {
    let req_id = request_id_from_headers(&headers);
    let slot = find_slot(&state, &id, &req_id)?;
    state.reset(&slot).await;
    let view = slot.session.read().await.view();
    Ok(Json(view))
}

pub async fn delete_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let req_id = request_id_from_headers(&headers);
    if state.remove(&id) {
        info!(session = %id, "session deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::session_not_found(req_id))
    }
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let req_id = request_id_from_headers(&headers);
    match state.slot(&id) {
        Some(slot) => ws.on_upgrade(move |socket| ws_session(socket, slot, id)),
        None => AppError::session_not_found(req_id).into_response(),
    }
}

async fn ws_session(stream: WebSocket, slot: Arc<SessionSlot>, session_id: String) {
    let mut receiver = slot.events.subscribe();
    let snapshot = {
        let session = slot.session.read().await;
        WsEnvelope::new(ws::EVENT_SNAPSHOT, json!({ "session": session.view() }))
    };
    // the socket must not keep a deleted session alive
    drop(slot);

    let (mut sender_ws, mut receiver_ws) = stream.split();
    let Ok(text) = serde_json::to_string(&snapshot) else {
        return;
    };
    if sender_ws.send(Message::Text(text)).await.is_err() {
        return;
    }

    let send_task = tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(msg) => {
                    if let Ok(text) = serde_json::to_string(&msg) {
                        if sender_ws.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "ws subscriber lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    while let Some(Ok(message)) = receiver_ws.next().await {
        if let Message::Close(_) = message {
            break;
        }
    }

    send_task.abort();
    info!("ws disconnected for session {}", session_id);
}
