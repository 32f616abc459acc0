use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::{error::AppError, middleware::auth::AuthUser, state::AppState};

pub const CART_SESSION_HEADER: &str = "x-cart-session";

/// Identifies the cart a request acts on: the `x-cart-session` header when
/// present, otherwise the session of the bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartSession(pub Uuid);

impl FromRequestParts<AppState> for CartSession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(value) = parts.headers.get(CART_SESSION_HEADER) {
            let id = value
                .to_str()
                .ok()
                .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
                .ok_or_else(|| {
                    AppError::BadRequest(format!("Invalid {CART_SESSION_HEADER} header"))
                })?;
            return Ok(CartSession(id));
        }

        let user =
            <AuthUser as axum::extract::OptionalFromRequestParts<AppState>>::from_request_parts(
                parts, state,
            )
            .await
            .unwrap_or(None);

        user.map(|u| CartSession(u.session_id)).ok_or_else(|| {
            AppError::BadRequest(format!(
                "Missing cart session; send {CART_SESSION_HEADER} or sign in"
            ))
        })
    }
}
