use std::convert::Infallible;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{
        Sse,
        sse::{Event, KeepAlive},
    },
    routing::get,
};
use futures::Stream;
use tokio::sync::broadcast::error::RecvError;

use crate::{
    dto::chat::{MessageList, SendMessageRequest},
    error::AppResult,
    middleware::auth::{AuthUser, require_roles},
    models::ChatMessage,
    response::ApiResponse,
    roles::CHAT_ROLES,
    services::chat_service,
    state::AppState,
};

/// Event name telling chat clients to reload the conversation.
pub const REFETCH_EVENT: &str = "refetch";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/messages", get(list_messages).post(send_message))
        .route("/stream", get(stream))
}

#[utoipa::path(
    get,
    path = "/api/chat/messages",
    responses(
        (status = 200, description = "Group conversation, oldest first", body = ApiResponse<MessageList>),
        (status = 403, description = "Admin, employee or supplier role required")
    ),
    security(("bearer_auth" = [])),
    tag = "Chat"
)]
pub async fn list_messages(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<MessageList>>> {
    require_roles(&state, &user, CHAT_ROLES).await?;
    Ok(Json(chat_service::list_messages(&state).await?))
}

#[utoipa::path(
    post,
    path = "/api/chat/messages",
    request_body = SendMessageRequest,
    responses(
        (status = 201, description = "Message posted to the group", body = ApiResponse<ChatMessage>),
        (status = 400, description = "Blank message")
    ),
    security(("bearer_auth" = [])),
    tag = "Chat"
)]
pub async fn send_message(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<SendMessageRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<ChatMessage>>)> {
    require_roles(&state, &user, CHAT_ROLES).await?;
    let resp = chat_service::send_message(&state, &user, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

/// GET /api/chat/stream
///
/// Emits a `refetch` event for every new group message. Lagging clients
/// get a single `refetch` for everything they missed.
#[utoipa::path(
    get,
    path = "/api/chat/stream",
    responses(
        (status = 200, description = "Server-sent `refetch` events", body = String, content_type = "text/event-stream")
    ),
    security(("bearer_auth" = [])),
    tag = "Chat"
)]
pub async fn stream(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    require_roles(&state, &user, CHAT_ROLES).await?;
    let mut rx = state.chat.subscribe();
    let user_id = user.user_id;

    let events = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(()) => yield Ok(Event::default().event(REFETCH_EVENT).data("{}")),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(user_id = %user_id, skipped, "chat stream lagged");
                    yield Ok(Event::default().event(REFETCH_EVENT).data("{}"));
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
