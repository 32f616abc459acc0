use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, patch, post},
};

use crate::{
    cart::CartSummary,
    dto::cart::{AddToCartRequest, CartSessionResponse, UpdateQuantityRequest},
    error::AppResult,
    middleware::cart_session::CartSession,
    response::ApiResponse,
    services::cart_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(view_cart).delete(clear_cart))
        .route("/session", post(open_session))
        .route("/items", post(add_item))
        .route("/items/{product_id}", patch(update_item).delete(remove_item))
}

#[utoipa::path(
    post,
    path = "/api/cart/session",
    responses(
        (status = 200, description = "New anonymous cart session", body = ApiResponse<CartSessionResponse>)
    ),
    tag = "Cart"
)]
pub async fn open_session(
    State(state): State<AppState>,
) -> Json<ApiResponse<CartSessionResponse>> {
    Json(cart_service::open_session(&state))
}

#[utoipa::path(
    get,
    path = "/api/cart",
    params(
        ("x-cart-session" = Option<String>, Header, description = "Cart session id; defaults to the signed-in session")
    ),
    responses(
        (status = 200, description = "Cart lines and totals", body = ApiResponse<CartSummary>),
        (status = 400, description = "No cart session")
    ),
    tag = "Cart"
)]
pub async fn view_cart(
    State(state): State<AppState>,
    CartSession(session_id): CartSession,
) -> Json<ApiResponse<CartSummary>> {
    Json(cart_service::view_cart(&state, session_id))
}

#[utoipa::path(
    post,
    path = "/api/cart/items",
    params(
        ("x-cart-session" = Option<String>, Header, description = "Cart session id")
    ),
    request_body = AddToCartRequest,
    responses(
        (status = 200, description = "Item added", body = ApiResponse<CartSummary>),
        (status = 400, description = "Not enough stock"),
        (status = 404, description = "Product not found")
    ),
    tag = "Cart"
)]
pub async fn add_item(
    State(state): State<AppState>,
    CartSession(session_id): CartSession,
    Json(payload): Json<AddToCartRequest>,
) -> AppResult<Json<ApiResponse<CartSummary>>> {
    let resp = cart_service::add_item(&state, session_id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    patch,
    path = "/api/cart/items/{product_id}",
    params(
        ("product_id" = i64, Path, description = "Product ID"),
        ("x-cart-session" = Option<String>, Header, description = "Cart session id")
    ),
    request_body = UpdateQuantityRequest,
    responses(
        (status = 200, description = "Quantity set; zero leaves the cart unchanged", body = ApiResponse<CartSummary>),
        (status = 400, description = "Not enough stock")
    ),
    tag = "Cart"
)]
pub async fn update_item(
    State(state): State<AppState>,
    CartSession(session_id): CartSession,
    Path(product_id): Path<i64>,
    Json(payload): Json<UpdateQuantityRequest>,
) -> AppResult<Json<ApiResponse<CartSummary>>> {
    let resp = cart_service::update_item(&state, session_id, product_id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/cart/items/{product_id}",
    params(
        ("product_id" = i64, Path, description = "Product ID"),
        ("x-cart-session" = Option<String>, Header, description = "Cart session id")
    ),
    responses(
        (status = 200, description = "Line removed if present", body = ApiResponse<CartSummary>)
    ),
    tag = "Cart"
)]
pub async fn remove_item(
    State(state): State<AppState>,
    CartSession(session_id): CartSession,
    Path(product_id): Path<i64>,
) -> Json<ApiResponse<CartSummary>> {
    Json(cart_service::remove_item(&state, session_id, product_id))
}

#[utoipa::path(
    delete,
    path = "/api/cart",
    params(
        ("x-cart-session" = Option<String>, Header, description = "Cart session id")
    ),
    responses(
        (status = 200, description = "Cart emptied", body = ApiResponse<CartSummary>)
    ),
    tag = "Cart"
)]
pub async fn clear_cart(
    State(state): State<AppState>,
    CartSession(session_id): CartSession,
) -> Json<ApiResponse<CartSummary>> {
    Json(cart_service::clear_cart(&state, session_id))
}
