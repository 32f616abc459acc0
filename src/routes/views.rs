use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};

use crate::{
    dto::views::ViewAccess,
    error::{AppError, AppResult},
    guard::{AccessPolicy, GuardDecision, SessionView, View, authorize},
    middleware::auth::{AuthUser, resolve_roles},
    query::QueryState,
    response::{ApiResponse, Meta},
    roles::RoleSet,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/{view}/access", get(view_access))
}

/// Decision for a role-gated view. Roles that have not been loaded yet
/// are fetched in the background and the caller is told to wait. A failed
/// load is reported once and the next poll retries it.
fn role_gated_decision(
    state: &AppState,
    user: AuthUser,
    policy: AccessPolicy,
) -> AppResult<GuardDecision> {
    let Some(snapshot) = state.sessions.snapshot(user.session_id) else {
        return Ok(authorize(&SessionView::anonymous(&RoleSet::new()), policy));
    };

    match snapshot.roles {
        QueryState::Success(roles) => Ok(authorize(&SessionView::signed_in(&roles), policy)),
        QueryState::Loading => Ok(loading(policy)),
        QueryState::Error(message) => {
            state.sessions.reset_roles(user.session_id);
            Err(AppError::Internal(anyhow::anyhow!(
                "could not load roles: {message}"
            )))
        }
        QueryState::Idle => {
            let state = state.clone();
            tokio::spawn(async move {
                if let Err(err) = resolve_roles(&state, &user).await {
                    tracing::warn!(
                        session_id = %user.session_id,
                        error = %err,
                        "background role load failed"
                    );
                }
            });
            Ok(loading(policy))
        }
    }
}

fn loading(policy: AccessPolicy) -> GuardDecision {
    let empty = RoleSet::new();
    let session = SessionView {
        is_loading: true,
        authenticated: true,
        roles: &empty,
    };
    authorize(&session, policy)
}

#[utoipa::path(
    get,
    path = "/api/views/{view}/access",
    params(
        ("view" = View, Path, description = "Front-end view name")
    ),
    responses(
        (status = 200, description = "Guard decision for the current session", body = ApiResponse<ViewAccess>),
        (status = 400, description = "Unknown view"),
        (status = 500, description = "Roles could not be loaded; polling again retries")
    ),
    tag = "Views"
)]
pub async fn view_access(
    State(state): State<AppState>,
    user: Option<AuthUser>,
    Path(view): Path<View>,
) -> AppResult<Json<ApiResponse<ViewAccess>>> {
    let policy = view.policy();
    let decision = match (user, policy) {
        (_, AccessPolicy::Public) | (Some(_), AccessPolicy::Authenticated) => {
            GuardDecision::Allowed
        }
        (None, policy) => authorize(&SessionView::anonymous(&RoleSet::new()), policy),
        (Some(user), policy @ AccessPolicy::AnyOf(_)) => {
            role_gated_decision(&state, user, policy)?
        }
    };

    Ok(Json(ApiResponse::success(
        "View access",
        ViewAccess {
            view,
            decision,
            redirect_to: decision.redirect_to().map(str::to_string),
        },
        Some(Meta::empty()),
    )))
}
