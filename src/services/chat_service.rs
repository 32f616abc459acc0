use tokio::sync::broadcast;

use crate::{
    dto::chat::{MessageList, SendMessageRequest},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::ChatMessage,
    response::{ApiResponse, Meta},
    state::AppState,
};

const NOTIFY_CAPACITY: usize = 64;

/// Signals subscribers that the group conversation changed. Subscribers
/// refetch the full list rather than receiving the new row.
#[derive(Debug, Clone)]
pub struct ChatNotifier {
    tx: broadcast::Sender<()>,
}

impl Default for ChatNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatNotifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(NOTIFY_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Number of listeners reached; zero when nobody is subscribed.
    pub fn notify(&self) -> usize {
        self.tx.send(()).unwrap_or(0)
    }
}

const GROUP_MESSAGES: &str = r#"
    SELECT m.id, m.sender_id,
           COALESCE(NULLIF(u.name, ''), u.email) AS sender_name,
           m.body, m.sent_at
    FROM messages m
    LEFT JOIN users u ON u.id = m.sender_id
    WHERE m.recipient_id IS NULL
"#;

pub async fn list_messages(state: &AppState) -> AppResult<ApiResponse<MessageList>> {
    let items = sqlx::query_as::<_, ChatMessage>(&format!(
        "{GROUP_MESSAGES} ORDER BY m.sent_at ASC, m.id ASC"
    ))
    .fetch_all(&state.pool)
    .await?;

    Ok(ApiResponse::success(
        "Messages",
        MessageList { items },
        Some(Meta::empty()),
    ))
}

pub async fn send_message(
    state: &AppState,
    user: &AuthUser,
    payload: SendMessageRequest,
) -> AppResult<ApiResponse<ChatMessage>> {
    let body = payload.body.trim();
    if body.is_empty() {
        return Err(AppError::BadRequest("Message must not be empty".into()));
    }

    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO messages (sender_id, recipient_id, body) VALUES ($1, NULL, $2) RETURNING id",
    )
    .bind(user.user_id)
    .bind(body)
    .fetch_one(&state.pool)
    .await?;

    let message = sqlx::query_as::<_, ChatMessage>(&format!("{GROUP_MESSAGES} AND m.id = $1"))
        .bind(id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or(AppError::NotFound)?;

    let listeners = state.chat.notify();
    tracing::debug!(message_id = id, user_id = %user.user_id, listeners, "chat message sent");

    Ok(ApiResponse::success("Message sent", message, Some(Meta::empty())))
}
