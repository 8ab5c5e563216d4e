//! `/api/chat/chat_group` routes. Membership and admin checks run inside the
//! core operations, so every handler here is a straight pass-through.

use super::{ApiError, ApiJson, ApiPath, ApiQuery, ApiResult, AppState, AuthUser, now};
use crate::hub::{HubMessage, TOPIC_CHAT};
use axum::{
    Json, Router,
    extract::State,
    routing::{delete, get, post, put},
};
use connectup_core::chat::{
    self, ChatGroup, ChatGroupDetails, ChatGroupEdit, ChatGroupSummary, Message as ChatMessage,
    NewChatGroup, NewMessage, ParticipantsEdit,
};
use connectup_core::filters::Pagination;
use connectup_core::response::{Count, Message};
use connectup_core::uploads::Upload;
use connectup_core::{ChatGroupId, DateTime, MessageId, Timestamp, UploadId, UserId, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/chat_group", get(list).post(create))
        .route("/chat_group/{chat_group_id}/details", get(details))
        .route("/chat_group/{chat_group_id}/toggle_notification", put(toggle_mute))
        .route("/chat_group/{chat_group_id}/leave", post(leave))
        .route("/chat_group/{chat_group_id}/admin", put(edit).delete(remove))
        .route("/chat_group/{chat_group_id}/admin/toggle_admins", post(toggle_admins))
        .route("/chat_group/{chat_group_id}/admin/set_admin", post(set_admin))
        .route("/chat_group/{chat_group_id}/admin/edit_participants", post(edit_participants))
        .route("/chat_group/{chat_group_id}/message", get(messages).post(delete_messages))
        .route("/chat_group/{chat_group_id}/message/send", post(send))
        .route("/chat_group/{chat_group_id}/message/after_time", get(messages_after))
        .route("/chat_group/{chat_group_id}/message/clear_all", delete(clear_all))
        .route("/chat_group/{chat_group_id}/message/{attachment_id}", get(attachment))
}

async fn list(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
) -> ApiResult<Json<Vec<ChatGroupSummary>>> {
    Ok(Json(state.read(|tx| chat::chat_groups(tx, ctx.id))?))
}

async fn create(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiJson(body): ApiJson<NewChatGroup>,
) -> ApiResult<Json<ChatGroup>> {
    Ok(Json(state.write(|tx| chat::create_chat_group(tx, ctx.id, body, now()))?))
}

async fn details(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath(group): ApiPath<ChatGroupId>,
) -> ApiResult<Json<ChatGroupDetails>> {
    Ok(Json(state.read(|tx| chat::details(tx, group, ctx.id))?))
}

async fn toggle_mute(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath(group): ApiPath<ChatGroupId>,
) -> ApiResult<Json<Value>> {
    let muted = state.write(|tx| chat::toggle_mute(tx, group, ctx.id))?;
    Ok(Json(json!({ "isMuted": muted })))
}

async fn leave(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath(group): ApiPath<ChatGroupId>,
) -> ApiResult<Json<Message>> {
    state.write(|tx| chat::leave(tx, group, ctx.id))?;
    Ok(Json(Message::success()))
}

async fn edit(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath(group): ApiPath<ChatGroupId>,
    ApiJson(body): ApiJson<ChatGroupEdit>,
) -> ApiResult<Json<ChatGroup>> {
    Ok(Json(state.write(|tx| chat::edit(tx, group, ctx.id, body))?))
}

async fn remove(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath(group): ApiPath<ChatGroupId>,
) -> ApiResult<Json<Message>> {
    state.write(|tx| chat::delete_chat_group(tx, group, ctx.id))?;
    Ok(Json(Message::success()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdsBody {
    pub user_ids: Vec<UserId>,
}

async fn toggle_admins(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath(group): ApiPath<ChatGroupId>,
    ApiJson(body): ApiJson<UserIdsBody>,
) -> ApiResult<Json<Message>> {
    state.write(|tx| chat::toggle_admins(tx, group, ctx.id, &body.user_ids))?;
    Ok(Json(Message::success()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdBody {
    pub user_id: UserId,
}

async fn set_admin(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath(group): ApiPath<ChatGroupId>,
    ApiJson(body): ApiJson<UserIdBody>,
) -> ApiResult<Json<Message>> {
    state.write(|tx| chat::set_admin(tx, group, ctx.id, body.user_id))?;
    Ok(Json(Message::success()))
}

async fn edit_participants(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath(group): ApiPath<ChatGroupId>,
    ApiJson(body): ApiJson<ParticipantsEdit>,
) -> ApiResult<Json<Message>> {
    state.write(|tx| chat::edit_participants(tx, group, ctx.id, body, now()))?;
    Ok(Json(Message::success()))
}

// =============================================================================
// MESSAGES
// =============================================================================

async fn send(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath(group): ApiPath<ChatGroupId>,
    ApiJson(body): ApiJson<NewMessage>,
) -> ApiResult<Json<ChatMessage>> {
    let sent = state.write(|tx| chat::send_message(tx, group, ctx.id, body, now()))?;
    let payload = serde_json::to_value(&sent.message)
        .map_err(|e| ApiError::internal(format!("message encoding failed: {e}")))?;
    let msg = HubMessage::new(TOPIC_CHAT, payload)
        .header("chatGroupId", group)
        .header("senderId", ctx.id)
        .to(sent.recipients.iter().copied());
    let delivered = state.hub.publish(msg);
    debug!(%group, delivered, "chat message published");

    let preview = sent
        .message
        .body
        .clone()
        .unwrap_or_else(|| "Sent an attachment".to_string());
    state.push_to(&sent.push_recipients, &ctx.name, &preview);
    Ok(Json(sent.message))
}

async fn messages(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath(group): ApiPath<ChatGroupId>,
    ApiQuery(query): ApiQuery,
) -> ApiResult<Json<connectup_core::response::Page<ChatMessage>>> {
    let pagination = Pagination::parse(&query)?;
    Ok(Json(state.write(|tx| {
        let page = chat::messages(tx, group, ctx.id, pagination)?;
        chat::mark_read(tx, group, ctx.id, now())?;
        Ok(page)
    })?))
}

fn parse_timestamp(raw: &str) -> ApiResult<Timestamp> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| ApiError::bad_request("invalid timestamp"))
}

async fn messages_after(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath(group): ApiPath<ChatGroupId>,
    ApiQuery(query): ApiQuery,
) -> ApiResult<Json<Vec<ChatMessage>>> {
    let raw = query
        .get("timestamp")
        .ok_or_else(|| ApiError::bad_request("timestamp is required"))?;
    let after = parse_timestamp(raw)?;
    Ok(Json(state.read(|tx| chat::messages_after(tx, group, ctx.id, after))?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteMessages {
    pub message_ids: Vec<MessageId>,
    #[serde(default)]
    pub for_everyone: bool,
}

async fn delete_messages(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath(group): ApiPath<ChatGroupId>,
    ApiJson(body): ApiJson<DeleteMessages>,
) -> ApiResult<Json<Count>> {
    let count = state.write(|tx| {
        chat::delete_messages(tx, group, ctx.id, &body.message_ids, body.for_everyone)
    })?;
    Ok(Json(Count { count }))
}

async fn clear_all(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath(group): ApiPath<ChatGroupId>,
) -> ApiResult<Json<Message>> {
    state.write(|tx| chat::clear_all(tx, group, ctx.id, now()))?;
    Ok(Json(Message::success()))
}

async fn attachment(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath((group, attachment)): ApiPath<(ChatGroupId, UploadId)>,
) -> ApiResult<Json<Upload>> {
    Ok(Json(state.read(|tx| chat::message_attachment(tx, group, ctx.id, attachment))?))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc3339_timestamps() {
        let ts = parse_timestamp("2024-03-01T10:00:00Z").unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-03-01T10:00:00+00:00");
        let offset = parse_timestamp("2024-03-01T12:00:00+02:00").unwrap();
        assert_eq!(offset, ts);
        assert_eq!(parse_timestamp("yesterday").unwrap_err().status, 400);
    }
}
