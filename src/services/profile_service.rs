use crate::{
    dto::profile::UpdateProfileRequest,
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::User,
    response::{ApiResponse, Meta},
    services::auth_service::fetch_user,
    state::AppState,
};

pub async fn get_profile(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<User>> {
    let profile = fetch_user(&state.orm, user.user_id).await?;
    Ok(ApiResponse::success("Profile", profile, Some(Meta::empty())))
}

pub async fn update_profile(
    state: &AppState,
    user: &AuthUser,
    payload: UpdateProfileRequest,
) -> AppResult<ApiResponse<User>> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("Name is required".into()));
    }

    let profile = sqlx::query_as::<_, User>(
        r#"
        UPDATE users SET name = $2
        WHERE id = $1
        RETURNING id, email, name, created_at
        "#,
    )
    .bind(user.user_id)
    .bind(name)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(AppError::NotFound)?;

    tracing::info!(user_id = %user.user_id, "profile updated");
    Ok(ApiResponse::success("Profile updated", profile, Some(Meta::empty())))
}
