use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::ChatMessage;

#[derive(Debug, Deserialize, ToSchema)]
pub struct SendMessageRequest {
    pub body: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct MessageList {
    #[schema(value_type = Vec<ChatMessage>)]
    pub items: Vec<ChatMessage>,
}
