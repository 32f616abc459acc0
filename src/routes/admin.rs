use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, patch, put},
};
use uuid::Uuid;

use crate::{
    dto::{
        admin::{RoleChange, SetRolesRequest, UserList},
        orders::{OrderList, OrderWithItems, UpdateOrderStatusRequest},
        products::ProductList,
    },
    error::AppResult,
    middleware::auth::{AuthUser, require_roles},
    models::Order,
    response::ApiResponse,
    roles::ADMIN_ROLES,
    routes::params::{OrderListQuery, Pagination},
    services::admin_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/{id}/roles", put(set_user_roles))
        .route("/orders", get(list_all_orders))
        .route("/orders/{id}", get(get_order_admin))
        .route("/orders/{id}/status", patch(update_order_status))
        .route("/products/low-stock", get(list_low_stock))
}

#[utoipa::path(
    get,
    path = "/api/admin/users",
    params(Pagination),
    responses(
        (status = 200, description = "Users with their roles", body = ApiResponse<UserList>),
        (status = 403, description = "Admin role required")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn list_users(
    State(state): State<AppState>,
    user: AuthUser,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<ApiResponse<UserList>>> {
    require_roles(&state, &user, ADMIN_ROLES).await?;
    Ok(Json(admin_service::list_users(&state, pagination).await?))
}

#[utoipa::path(
    put,
    path = "/api/admin/users/{id}/roles",
    params(
        ("id" = Uuid, Path, description = "User ID")
    ),
    request_body = SetRolesRequest,
    responses(
        (status = 200, description = "Roles replaced", body = ApiResponse<RoleChange>),
        (status = 403, description = "Admin role required"),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn set_user_roles(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetRolesRequest>,
) -> AppResult<Json<ApiResponse<RoleChange>>> {
    require_roles(&state, &user, ADMIN_ROLES).await?;
    Ok(Json(
        admin_service::set_user_roles(&state, &user, id, payload).await?,
    ))
}

#[utoipa::path(
    get,
    path = "/api/admin/orders",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20"),
        ("status" = Option<String>, Query, description = "pending | shipped | delivered | cancelled"),
        ("sort_order" = Option<String>, Query, description = "asc | desc")
    ),
    responses(
        (status = 200, description = "All orders", body = ApiResponse<OrderList>),
        (status = 403, description = "Admin role required")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn list_all_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<OrderListQuery>,
) -> AppResult<Json<ApiResponse<OrderList>>> {
    require_roles(&state, &user, ADMIN_ROLES).await?;
    Ok(Json(admin_service::list_all_orders(&state, query).await?))
}

#[utoipa::path(
    get,
    path = "/api/admin/orders/{id}",
    params(
        ("id" = Uuid, Path, description = "Order ID")
    ),
    responses(
        (status = 200, description = "Order with its lines", body = ApiResponse<OrderWithItems>),
        (status = 404, description = "Order not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn get_order_admin(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<OrderWithItems>>> {
    require_roles(&state, &user, ADMIN_ROLES).await?;
    Ok(Json(admin_service::get_order_admin(&state, id).await?))
}

#[utoipa::path(
    patch,
    path = "/api/admin/orders/{id}/status",
    params(
        ("id" = Uuid, Path, description = "Order ID")
    ),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Status changed", body = ApiResponse<Order>),
        (status = 404, description = "Order not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateOrderStatusRequest>,
) -> AppResult<Json<ApiResponse<Order>>> {
    require_roles(&state, &user, ADMIN_ROLES).await?;
    Ok(Json(
        admin_service::update_order_status(&state, &user, id, payload).await?,
    ))
}

#[utoipa::path(
    get,
    path = "/api/admin/products/low-stock",
    params(Pagination),
    responses(
        (status = 200, description = "Products at or below the low-stock threshold", body = ApiResponse<ProductList>)
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn list_low_stock(
    State(state): State<AppState>,
    user: AuthUser,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<ApiResponse<ProductList>>> {
    require_roles(&state, &user, ADMIN_ROLES).await?;
    Ok(Json(admin_service::list_low_stock(&state, pagination).await?))
}
