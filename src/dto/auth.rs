use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{models::User, roles::Role};

/// New accounts always get the `client` role.
#[derive(Deserialize, Debug, ToSchema)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SignInResponse {
    pub token: String,
    pub session_id: Uuid,
    pub user: User,
    pub roles: Vec<Role>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionInfo {
    pub session_id: Uuid,
    pub user: User,
    pub roles: Vec<Role>,
    pub roles_loading: bool,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct Claims {
    pub sub: String,
    pub sid: String,
    pub exp: usize,
}
