use std::convert::Infallible;

use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::{header, request::Parts},
};
use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use uuid::Uuid;

use crate::{
    dto::auth::Claims,
    error::{AppError, AppResult},
    guard::{GuardDecision, SessionView, evaluate},
    query::QueryState,
    roles::{Role, RoleSet},
    services::auth_service::fetch_user_roles,
    state::AppState,
};

/// A request carrying a valid bearer token for an open session.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub session_id: Uuid,
}

/// Expiry of a session opened now that lives `ttl_hours`.
pub fn session_expiry(ttl_hours: i64) -> AppResult<DateTime<Utc>> {
    TimeDelta::try_hours(ttl_hours)
        .filter(|ttl| *ttl > TimeDelta::zero())
        .and_then(|ttl| Utc::now().checked_add_signed(ttl))
        .ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!("Session lifetime out of range: {ttl_hours}h"))
        })
}

pub fn issue_token(
    secret: &str,
    user_id: Uuid,
    session_id: Uuid,
    ttl_hours: i64,
) -> AppResult<String> {
    sign_token(secret, user_id, session_id, session_expiry(ttl_hours)?)
}

pub fn sign_token(
    secret: &str,
    user_id: Uuid,
    session_id: Uuid,
    expires_at: DateTime<Utc>,
) -> AppResult<String> {
    let exp = usize::try_from(expires_at.timestamp())
        .map_err(|_| AppError::Internal(anyhow::anyhow!("Token expiry before epoch")))?;
    let claims = Claims {
        sub: user_id.to_string(),
        sid: session_id.to_string(),
        exp,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
}

fn bearer_token(parts: &Parts) -> AppResult<Option<&str>> {
    let Some(auth_header) = parts.headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let auth_str = auth_header
        .to_str()
        .map_err(|_| AppError::Unauthorized("Invalid Authorization header".into()))?;
    let token = auth_str
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Unauthorized("Invalid Authorization scheme".into()))?;
    Ok(Some(token.trim()))
}

fn authenticate(token: &str, state: &AppState) -> AppResult<AuthUser> {
    let decoded = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.config.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::Unauthorized("Invalid or expired token".into()))?;

    let user_id = Uuid::parse_str(&decoded.claims.sub)
        .map_err(|_| AppError::Unauthorized("Invalid user id in token".into()))?;
    let session_id = Uuid::parse_str(&decoded.claims.sid)
        .map_err(|_| AppError::Unauthorized("Invalid session id in token".into()))?;

    if !state.sessions.contains(session_id, user_id) {
        return Err(AppError::Unauthorized("Session has ended".into()));
    }

    Ok(AuthUser {
        user_id,
        session_id,
    })
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?
            .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".into()))?;
        authenticate(token, state)
    }
}

/// Anonymous when the token is missing, malformed or for a closed session.
impl OptionalFromRequestParts<AppState> for AuthUser {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Option<Self>, Self::Rejection> {
        let user = match bearer_token(parts) {
            Ok(Some(token)) => authenticate(token, state).ok(),
            Ok(None) | Err(_) => None,
        };
        Ok(user)
    }
}

/// Role set of the session, loading it from the database unless a load
/// has already succeeded. A load that was superseded while in flight
/// still answers its own request but does not touch the cache.
pub async fn resolve_roles(state: &AppState, user: &AuthUser) -> AppResult<RoleSet> {
    let snapshot = state
        .sessions
        .snapshot(user.session_id)
        .ok_or_else(|| AppError::Unauthorized("Session has ended".into()))?;
    if let QueryState::Success(roles) = snapshot.roles {
        return Ok(roles);
    }

    let token = state
        .sessions
        .begin_role_load(user.session_id)
        .ok_or_else(|| AppError::Unauthorized("Session has ended".into()))?;

    match fetch_user_roles(&state.orm, user.user_id).await {
        Ok(roles) => {
            if !state
                .sessions
                .complete_role_load(user.session_id, token, Ok(roles.clone()))
            {
                tracing::debug!(session_id = %user.session_id, "superseded role load dropped");
            }
            Ok(roles)
        }
        Err(err) => {
            state
                .sessions
                .complete_role_load(user.session_id, token, Err(err.to_string()));
            Err(err)
        }
    }
}

/// Admits the session when it holds any of `required`.
pub async fn require_roles(
    state: &AppState,
    user: &AuthUser,
    required: &[Role],
) -> AppResult<RoleSet> {
    let roles = resolve_roles(state, user).await?;
    match evaluate(&SessionView::signed_in(&roles), required) {
        GuardDecision::Allowed => Ok(roles),
        decision => {
            tracing::debug!(
                user_id = %user.user_id,
                ?decision,
                "role check rejected request"
            );
            Err(AppError::denied(decision))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_lifetimes_are_errors() {
        let (user, session) = (Uuid::new_v4(), Uuid::new_v4());
        for hours in [i64::MAX, i64::MIN, 0, -1] {
            assert!(matches!(
                issue_token("secret", user, session, hours),
                Err(AppError::Internal(_))
            ));
        }
    }

    #[test]
    fn token_carries_session_expiry() {
        let (user, session) = (Uuid::new_v4(), Uuid::new_v4());
        let expires_at = session_expiry(2).expect("in range");
        assert!(expires_at > Utc::now() + TimeDelta::minutes(119));

        let token = sign_token("secret", user, session, expires_at).expect("token");
        let decoded = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(b"secret"),
            &Validation::default(),
        )
        .expect("valid token");
        assert_eq!(decoded.claims.exp as i64, expires_at.timestamp());
        assert_eq!(decoded.claims.sid, session.to_string());
    }
}
