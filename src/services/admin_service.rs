use chrono::Utc;
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect,
};
use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    audit::{self, AuditAction},
    dto::{
        admin::{RoleChange, SetRolesRequest, UserList},
        orders::{OrderList, OrderWithItems, UpdateOrderStatusRequest},
        products::ProductList,
    },
    entity::{
        orders::{ActiveModel as OrderActive, Entity as Orders},
        products::{Column as ProdCol, Entity as Products},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Order, UserWithRoles},
    response::{ApiResponse, Meta},
    roles::RoleSet,
    routes::params::{OrderListQuery, Pagination},
    services::{
        order_service::{list_with, order_from_entity, with_items},
        product_service::product_from_entity,
    },
    state::AppState,
};

#[derive(FromRow)]
struct UserRolesRow {
    id: Uuid,
    email: String,
    name: String,
    roles: Vec<String>,
}

impl UserRolesRow {
    fn into_user(self) -> AppResult<UserWithRoles> {
        let roles = RoleSet::parse_all(&self.roles)
            .map_err(|err| AppError::Internal(anyhow::anyhow!(err)))?;
        Ok(UserWithRoles {
            id: self.id,
            email: self.email,
            name: self.name,
            roles: roles.to_vec(),
        })
    }
}

const USERS_WITH_ROLES: &str = r#"
    SELECT u.id, u.email, u.name,
           COALESCE(array_agg(ur.role ORDER BY ur.role) FILTER (WHERE ur.role IS NOT NULL),
                    '{}') AS roles
    FROM users u
    LEFT JOIN user_roles ur ON ur.user_id = u.id
"#;

pub async fn list_users(
    state: &AppState,
    pagination: Pagination,
) -> AppResult<ApiResponse<UserList>> {
    let (page, limit, offset) = pagination.normalize();
    let rows = sqlx::query_as::<_, UserRolesRow>(&format!(
        "{USERS_WITH_ROLES} GROUP BY u.id ORDER BY u.created_at, u.id LIMIT $1 OFFSET $2"
    ))
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.pool)
    .await?;

    let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
        .fetch_one(&state.pool)
        .await?;

    let items = rows
        .into_iter()
        .map(UserRolesRow::into_user)
        .collect::<AppResult<Vec<_>>>()?;
    Ok(ApiResponse::success(
        "Users",
        UserList { items },
        Some(Meta::new(page, limit, total.0)),
    ))
}

async fn fetch_user_with_roles(state: &AppState, user_id: Uuid) -> AppResult<UserWithRoles> {
    sqlx::query_as::<_, UserRolesRow>(&format!(
        "{USERS_WITH_ROLES} WHERE u.id = $1 GROUP BY u.id"
    ))
    .bind(user_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(AppError::NotFound)?
    .into_user()
}

/// Replaces the user's role set. Grants and revocations are applied in one
/// transaction, then every open session of the user reloads its roles.
pub async fn set_user_roles(
    state: &AppState,
    admin: &AuthUser,
    user_id: Uuid,
    payload: SetRolesRequest,
) -> AppResult<ApiResponse<RoleChange>> {
    let current: RoleSet = fetch_user_with_roles(state, user_id)
        .await?
        .roles
        .into_iter()
        .collect();
    let target: RoleSet = payload.roles.into_iter().collect();
    let (added, removed) = current.diff(&target);

    let mut tx = state.pool.begin().await?;
    for role in &removed {
        sqlx::query("DELETE FROM user_roles WHERE user_id = $1 AND role = $2")
            .bind(user_id)
            .bind(role.as_str())
            .execute(&mut *tx)
            .await?;
    }
    for role in &added {
        sqlx::query(
            r#"
            INSERT INTO user_roles (id, user_id, role) VALUES ($1, $2, $3)
            ON CONFLICT (user_id, role) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(role.as_str())
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    let sessions = state.sessions.invalidate_user(user_id);
    tracing::info!(
        user_id = %user_id,
        admin_id = %admin.user_id,
        ?added,
        ?removed,
        sessions,
        "roles updated"
    );
    audit::record(
        &state.pool,
        Some(admin.user_id),
        AuditAction::RolesUpdate,
        "user_roles",
        serde_json::json!({ "user_id": user_id, "added": added, "removed": removed }),
    )
    .await;

    let user = fetch_user_with_roles(state, user_id).await?;
    Ok(ApiResponse::success(
        "Roles updated",
        RoleChange {
            user,
            added,
            removed,
        },
        Some(Meta::empty()),
    ))
}

pub async fn list_all_orders(
    state: &AppState,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    list_with(state, Condition::all(), query).await
}

pub async fn get_order_admin(
    state: &AppState,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let order = Orders::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    let data = with_items(state, order).await?;
    Ok(ApiResponse::success("Order found", data, Some(Meta::empty())))
}

pub async fn update_order_status(
    state: &AppState,
    admin: &AuthUser,
    id: Uuid,
    payload: UpdateOrderStatusRequest,
) -> AppResult<ApiResponse<Order>> {
    let existing = Orders::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut active: OrderActive = existing.into();
    active.status = Set(payload.status.as_str().to_string());
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&state.orm).await?;

    tracing::info!(order_id = %order.id, status = %payload.status, "order status updated");
    audit::record(
        &state.pool,
        Some(admin.user_id),
        AuditAction::OrderStatusUpdate,
        "orders",
        serde_json::json!({ "order_id": order.id, "status": payload.status }),
    )
    .await;

    Ok(ApiResponse::success(
        "Order updated",
        order_from_entity(order)?,
        Some(Meta::empty()),
    ))
}

pub async fn list_low_stock(
    state: &AppState,
    pagination: Pagination,
) -> AppResult<ApiResponse<ProductList>> {
    let threshold = state.config.low_stock_threshold;
    let (page, limit, offset) = pagination.normalize();

    let finder = Products::find()
        .filter(ProdCol::Stock.lte(threshold))
        .order_by_asc(ProdCol::Stock)
        .order_by_desc(ProdCol::CreatedAt);

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(|model| product_from_entity(model, threshold))
        .collect();

    Ok(ApiResponse::success(
        "Low stock",
        ProductList { items },
        Some(Meta::new(page, limit, total)),
    ))
}
