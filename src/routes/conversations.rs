use std::collections::HashMap;

use axum::extract::{Json, Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use diesel::{prelude::*, PgConnection};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::documents::to_utc;
use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::matching::CONVERSATION_ACTIVE;
use crate::models::{Conversation, Message, NewMessage, User};
use crate::notifications::NotificationEvent;
use crate::schema::{conversations, messages, users};
use crate::state::AppState;

const MAX_MESSAGE_CHARS: usize = 5_000;
/// Width of `messages.message_type`.
const MAX_MESSAGE_TYPE_CHARS: usize = 32;
const DEFAULT_MESSAGE_TYPE: &str = "text";

#[derive(Serialize)]
pub struct ConversationResponse {
    pub id: Uuid,
    pub match_id: Uuid,
    pub coach_id: Uuid,
    pub seeker_id: Uuid,
    pub other_user_name: Option<String>,
    pub status: String,
    pub last_message: Option<MessageResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Clone)]
pub struct MessageResponse {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub message_type: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
    #[serde(default)]
    pub message_type: Option<String>,
}

impl From<Message> for MessageResponse {
    fn from(message: Message) -> Self {
        Self {
            id: message.id,
            conversation_id: message.conversation_id,
            sender_id: message.sender_id,
            content: message.content,
            message_type: message.message_type,
            created_at: to_utc(message.created_at),
        }
    }
}

fn load_participant_conversation(
    conn: &mut PgConnection,
    conversation_id: Uuid,
    user_id: Uuid,
) -> AppResult<Conversation> {
    let conversation: Conversation = conversations::table.find(conversation_id).first(conn)?;
    if conversation.coach_id != user_id && conversation.seeker_id != user_id {
        return Err(AppError::not_found());
    }
    Ok(conversation)
}

pub async fn list_conversations(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<ConversationResponse>>> {
    let mut conn = state.db()?;
    let rows: Vec<Conversation> = conversations::table
        .filter(
            conversations::coach_id
                .eq(user.user_id)
                .or(conversations::seeker_id.eq(user.user_id)),
        )
        .order(conversations::updated_at.desc())
        .load(&mut conn)?;

    let other_ids: Vec<Uuid> = rows
        .iter()
        .map(|row| {
            if row.coach_id == user.user_id {
                row.seeker_id
            } else {
                row.coach_id
            }
        })
        .collect();
    let names: HashMap<Uuid, String> = users::table
        .filter(users::id.eq_any(&other_ids))
        .load::<User>(&mut conn)?
        .into_iter()
        .map(|user| (user.id, user.name))
        .collect();

    let conversation_ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
    let mut latest: HashMap<Uuid, Message> = HashMap::new();
    for message in messages::table
        .filter(messages::conversation_id.eq_any(&conversation_ids))
        .order(messages::created_at.asc())
        .load::<Message>(&mut conn)?
    {
        latest.insert(message.conversation_id, message);
    }

    let response = rows
        .into_iter()
        .zip(other_ids)
        .map(|(row, other)| ConversationResponse {
            id: row.id,
            match_id: row.match_id,
            coach_id: row.coach_id,
            seeker_id: row.seeker_id,
            other_user_name: names.get(&other).cloned(),
            status: row.status,
            last_message: latest.remove(&row.id).map(MessageResponse::from),
            created_at: to_utc(row.created_at),
            updated_at: to_utc(row.updated_at),
        })
        .collect();

    Ok(Json(response))
}

pub async fn list_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<MessageResponse>>> {
    let mut conn = state.db()?;
    load_participant_conversation(&mut conn, conversation_id, user.user_id)?;

    let rows: Vec<Message> = messages::table
        .filter(messages::conversation_id.eq(conversation_id))
        .order((messages::created_at.asc(), messages::id.asc()))
        .load(&mut conn)?;
    Ok(Json(rows.into_iter().map(MessageResponse::from).collect()))
}

fn message_type(value: Option<&str>) -> AppResult<String> {
    let value = value.map(str::trim).filter(|value| !value.is_empty());
    match value {
        None => Ok(DEFAULT_MESSAGE_TYPE.to_string()),
        Some(value) if value.chars().count() > MAX_MESSAGE_TYPE_CHARS => Err(AppError::bad_request(
            format!("message_type must be at most {MAX_MESSAGE_TYPE_CHARS} characters"),
        )),
        Some(value) => Ok(value.to_string()),
    }
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    user: AuthenticatedUser,
    Json(payload): Json<SendMessageRequest>,
) -> AppResult<(StatusCode, Json<MessageResponse>)> {
    let content = payload.content.trim();
    if content.is_empty() {
        return Err(AppError::bad_request("message must not be empty"));
    }
    if content.chars().count() > MAX_MESSAGE_CHARS {
        return Err(AppError::bad_request(format!(
            "message must be at most {MAX_MESSAGE_CHARS} characters"
        )));
    }
    let message_type = message_type(payload.message_type.as_deref())?;

    let (conversation, message) = {
        let mut conn = state.db()?;
        let conversation = load_participant_conversation(&mut conn, conversation_id, user.user_id)?;
        if conversation.status != CONVERSATION_ACTIVE {
            return Err(AppError::conflict("conversation is closed"));
        }

        let message: Message = conn.transaction::<_, AppError, _>(|conn| {
            let message = diesel::insert_into(messages::table)
                .values(&NewMessage {
                    id: Uuid::new_v4(),
                    conversation_id,
                    sender_id: user.user_id,
                    content: content.to_string(),
                    message_type: message_type.clone(),
                })
                .get_result(conn)?;
            diesel::update(conversations::table.find(conversation_id))
                .set(conversations::updated_at.eq(Utc::now().naive_utc()))
                .execute(conn)?;
            Ok(message)
        })?;
        (conversation, MessageResponse::from(message))
    };

    let recipient = if conversation.coach_id == user.user_id {
        conversation.seeker_id
    } else {
        conversation.coach_id
    };
    state
        .notifier
        .publish(
            recipient,
            NotificationEvent::Message {
                conversation_id,
                message: serde_json::to_value(&message)?,
            },
        )
        .await;

    Ok((StatusCode::CREATED, Json(message)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_defaults_and_fits_its_column() {
        assert_eq!(message_type(None).expect("default"), "text");
        assert_eq!(message_type(Some("  ")).expect("blank"), "text");
        assert_eq!(message_type(Some(" system ")).expect("trimmed"), "system");
        assert!(message_type(Some(&"x".repeat(32))).is_ok());

        let err = message_type(Some(&"x".repeat(33))).expect_err("too long");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
