use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{models::UserWithRoles, roles::Role};

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetRolesRequest {
    pub roles: Vec<Role>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RoleChange {
    pub user: UserWithRoles,
    pub added: Vec<Role>,
    pub removed: Vec<Role>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct UserList {
    #[schema(value_type = Vec<UserWithRoles>)]
    pub items: Vec<UserWithRoles>,
}
