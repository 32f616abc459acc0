use argon2::{
    Argon2, PasswordHasher,
    password_hash::{PasswordHash, PasswordVerifier, SaltString},
};
use chrono::Utc;
use password_hash::rand_core::OsRng;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use uuid::Uuid;

use crate::{
    audit::{self, AuditAction},
    db::OrmConn,
    dto::auth::{SessionInfo, SignInRequest, SignInResponse, SignUpRequest},
    entity::{
        user_roles::{Column as UserRoleCol, Entity as UserRoles},
        users::{Column as UserCol, Entity as Users, Model as UserModel},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, resolve_roles, session_expiry, sign_token},
    models::User,
    query::QueryState,
    response::{ApiResponse, Meta},
    roles::{Role, RoleSet},
    state::AppState,
};

/// Roles granted to `user_id`. A role name outside the known set fails
/// the load rather than being dropped.
pub async fn fetch_user_roles(orm: &OrmConn, user_id: Uuid) -> AppResult<RoleSet> {
    let grants = UserRoles::find()
        .filter(UserRoleCol::UserId.eq(user_id))
        .all(orm)
        .await?;

    RoleSet::parse_all(grants.iter().map(|grant| grant.role.as_str())).map_err(|err| {
        tracing::warn!(user_id = %user_id, error = %err, "unrecognised role in user_roles");
        AppError::Internal(anyhow::anyhow!(err))
    })
}

pub async fn fetch_user(orm: &OrmConn, user_id: Uuid) -> AppResult<User> {
    Users::find_by_id(user_id)
        .one(orm)
        .await?
        .map(user_from_entity)
        .ok_or(AppError::NotFound)
}

fn user_from_entity(model: UserModel) -> User {
    User {
        id: model.id,
        email: model.email,
        name: model.name,
        created_at: model.created_at.with_timezone(&Utc),
    }
}

fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
}

/// Every account starts as a client; other roles are granted by an admin.
pub const SIGN_UP_ROLE: Role = Role::Client;

pub async fn sign_up(state: &AppState, payload: SignUpRequest) -> AppResult<ApiResponse<User>> {
    let SignUpRequest {
        email,
        password,
        name,
    } = payload;
    let email = email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::BadRequest("A valid email is required".into()));
    }
    if password.len() < 6 {
        return Err(AppError::BadRequest(
            "Password must be at least 6 characters".into(),
        ));
    }
    let role = SIGN_UP_ROLE;

    let exist: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM users WHERE email = $1")
        .bind(email.as_str())
        .fetch_optional(&state.pool)
        .await?;
    if exist.is_some() {
        return Err(AppError::Conflict("Email is already taken".to_string()));
    }

    let password_hash = hash_password(&password)?;

    let mut tx = state.pool.begin().await?;
    let user: User = sqlx::query_as(
        r#"
        INSERT INTO users (id, email, password_hash, name)
        VALUES ($1, $2, $3, $4)
        RETURNING id, email, name, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email.as_str())
    .bind(password_hash)
    .bind(name.trim())
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("INSERT INTO user_roles (id, user_id, role) VALUES ($1, $2, $3)")
        .bind(Uuid::new_v4())
        .bind(user.id)
        .bind(role.as_str())
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!(user_id = %user.id, role = %role, "user signed up");
    audit::record(
        &state.pool,
        Some(user.id),
        AuditAction::SignUp,
        "users",
        serde_json::json!({ "user_id": user.id, "role": role }),
    )
    .await;

    Ok(ApiResponse::success("User created", user, Some(Meta::empty())))
}

pub async fn sign_in(
    state: &AppState,
    payload: SignInRequest,
) -> AppResult<ApiResponse<SignInResponse>> {
    let SignInRequest { email, password } = payload;
    let account = Users::find()
        .filter(UserCol::Email.eq(email.trim().to_lowercase()))
        .one(&state.orm)
        .await?;

    let Some(account) = account else {
        return Err(AppError::Unauthorized("Invalid email or password".into()));
    };

    let parsed_hash = PasswordHash::new(&account.password_hash)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("Invalid password hash")))?;
    if Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_err()
    {
        return Err(AppError::Unauthorized("Invalid email or password".into()));
    }

    let user = user_from_entity(account);

    let session_id = Uuid::new_v4();
    let expires_at = session_expiry(state.config.session_ttl_hours)?;
    state.sessions.open(session_id, user.id, expires_at);

    let caller = AuthUser {
        user_id: user.id,
        session_id,
    };
    let roles = match resolve_roles(state, &caller).await {
        Ok(roles) => roles,
        Err(err) => {
            state.sessions.close(session_id);
            return Err(err);
        }
    };

    let token = sign_token(&state.config.jwt_secret, user.id, session_id, expires_at)?;

    tracing::info!(user_id = %user.id, session_id = %session_id, "user signed in");
    audit::record(
        &state.pool,
        Some(user.id),
        AuditAction::SignIn,
        "users",
        serde_json::json!({ "user_id": user.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Signed in",
        SignInResponse {
            token,
            session_id,
            user,
            roles: roles.to_vec(),
        },
        Some(Meta::empty()),
    ))
}

/// Ends the session: its cached roles and its cart are dropped.
pub async fn sign_out(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<serde_json::Value>> {
    state.sessions.close(user.session_id);
    state.carts.discard(user.session_id);

    tracing::info!(user_id = %user.user_id, session_id = %user.session_id, "user signed out");
    audit::record(
        &state.pool,
        Some(user.user_id),
        AuditAction::SignOut,
        "users",
        serde_json::json!({ "user_id": user.user_id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Signed out",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub async fn session_info(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<SessionInfo>> {
    let profile = fetch_user(&state.orm, user.user_id).await?;
    let roles = resolve_roles(state, user).await?;
    let roles_loading = state
        .sessions
        .snapshot(user.session_id)
        .is_some_and(|snap| matches!(snap.roles, QueryState::Loading));

    Ok(ApiResponse::success(
        "Session",
        SessionInfo {
            session_id: user.session_id,
            user: profile,
            roles: roles.to_vec(),
            roles_loading,
        },
        Some(Meta::empty()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requested_role_in_sign_up_body_is_ignored() {
        let payload: SignUpRequest = serde_json::from_value(serde_json::json!({
            "email": "eve@example.com",
            "password": "secret123",
            "name": "Eve",
            "role": "admin",
        }))
        .expect("sign-up body");

        assert_eq!(payload.email, "eve@example.com");
        assert_eq!(SIGN_UP_ROLE, Role::Client);
    }
}
