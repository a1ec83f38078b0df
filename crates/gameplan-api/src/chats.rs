use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use tracing::error;
use uuid::Uuid;

use gameplan_db::models::MessageRow;
use gameplan_types::api::{ChatSummary, MessageResponse, SendMessageRequest, SendMessageResponse};
use gameplan_types::models::ASSISTANT_USER_ID;

use crate::error::ApiError;
use crate::middleware::CurrentUser;
use crate::{parse_id, parse_ts, AppState};

/// Send a message, resolving the single thread for the (sender, receiver)
/// pair on the way. A message to the AI coach synchronously collects the
/// generated answer and appends it as a second message.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.message_text.trim().is_empty() {
        return Err(ApiError::Validation(
            "Message text must not be empty".to_string(),
        ));
    }

    let sender_id = user.id.clone();
    let receiver_id = req.receiver_id.unwrap_or(ASSISTANT_USER_ID).to_string();
    if receiver_id == sender_id {
        return Err(ApiError::Validation(
            "Cannot send a message to yourself".to_string(),
        ));
    }
    if state.db.get_user_by_id(&receiver_id)?.is_none() {
        return Err(ApiError::NotFound("Receiver not found".to_string()));
    }

    // Run blocking DB work off the async runtime
    let db_state = state.clone();
    let (sender, receiver, text) = (sender_id.clone(), receiver_id.clone(), req.message_text);
    let user_message = tokio::task::spawn_blocking(move || {
        let chat_id = db_state.db.resolve_thread(&sender, &receiver)?;
        db_state.db.append_message(&chat_id, &sender, &receiver, &text)
    })
    .await
    .map_err(join_error)??;

    let reply = if receiver_id == ASSISTANT_USER_ID.to_string() {
        let generated = state.replies.generate_reply(&user_message.body).await?;

        let db_state = state.clone();
        let chat_id = user_message.chat_id.clone();
        let ai_message = tokio::task::spawn_blocking(move || {
            db_state
                .db
                .append_message(&chat_id, &ASSISTANT_USER_ID.to_string(), &sender_id, &generated)
        })
        .await
        .map_err(join_error)??;

        Some(message_response(&ai_message))
    } else {
        None
    };

    Ok((
        StatusCode::CREATED,
        Json(SendMessageResponse {
            message: message_response(&user_message),
            reply,
        }),
    ))
}

pub async fn list_chats(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(threads_for(&state, user.id).await?))
}

pub async fn last_chat(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let newest = threads_for(&state, user.id)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::NotFound("No chats found".to_string()))?;
    Ok(Json(newest))
}

pub async fn get_chat_messages(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let db_state = state.clone();
    let cid = chat_id.to_string();
    let uid = user.id;

    let rows = tokio::task::spawn_blocking(move || {
        if !db_state.db.is_chat_participant(&cid, &uid)? {
            return Ok(None);
        }
        db_state.db.get_chat_messages(&cid).map(Some)
    })
    .await
    .map_err(join_error)??
    .ok_or_else(|| ApiError::NotFound("Chat not found or access denied".to_string()))?;

    Ok(Json(
        rows.iter().map(message_response).collect::<Vec<_>>(),
    ))
}

async fn threads_for(state: &AppState, user_id: String) -> Result<Vec<ChatSummary>, ApiError> {
    let db_state = state.clone();
    let threads = tokio::task::spawn_blocking(move || db_state.db.list_threads_for(&user_id))
        .await
        .map_err(join_error)??;

    Ok(threads
        .into_iter()
        .map(|thread| ChatSummary {
            id: parse_id(&thread.chat.id),
            participants: thread.participants.iter().map(|id| parse_id(id)).collect(),
            last_message: thread.last_message.as_ref().map(message_response),
            updated_at: parse_ts(&thread.chat.updated_at),
        })
        .collect())
}

fn message_response(row: &MessageRow) -> MessageResponse {
    MessageResponse {
        id: parse_id(&row.id),
        chat_id: parse_id(&row.chat_id),
        sender_id: parse_id(&row.sender_id),
        receiver_id: parse_id(&row.receiver_id),
        message_text: row.body.clone(),
        timestamp: parse_ts(&row.created_at),
    }
}

fn join_error(err: tokio::task::JoinError) -> ApiError {
    error!("spawn_blocking join error: {}", err);
    ApiError::Internal(anyhow::anyhow!("blocking task failed: {err}"))
}
