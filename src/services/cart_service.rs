use uuid::Uuid;

use crate::{
    cart::{Cart, CartSummary, NewLineItem},
    dto::cart::{AddToCartRequest, CartSessionResponse, UpdateQuantityRequest},
    error::{AppError, AppResult},
    response::{ApiResponse, Meta},
    services::product_service::find_product,
    state::AppState,
};

fn summary(state: &AppState, session_id: Uuid) -> CartSummary {
    state
        .carts
        .snapshot(session_id)
        .summary(state.config.shipping_fee)
}

/// Quantities below 1 map to zero, which every cart operation ignores.
fn to_quantity(raw: i64) -> AppResult<u32> {
    if raw < 1 {
        return Ok(0);
    }
    u32::try_from(raw).map_err(|_| AppError::BadRequest("Quantity is too large".into()))
}

pub fn open_session(state: &AppState) -> ApiResponse<CartSessionResponse> {
    let cart_session = state.carts.issue();
    tracing::debug!(session_id = %cart_session, "cart session issued");
    ApiResponse::success(
        "Cart session",
        CartSessionResponse { cart_session },
        Some(Meta::empty()),
    )
}

pub fn view_cart(state: &AppState, session_id: Uuid) -> ApiResponse<CartSummary> {
    ApiResponse::success("Cart", summary(state, session_id), Some(Meta::empty()))
}

pub async fn add_item(
    state: &AppState,
    session_id: Uuid,
    payload: AddToCartRequest,
) -> AppResult<ApiResponse<CartSummary>> {
    let quantity = to_quantity(payload.quantity.unwrap_or(1))?;
    if quantity == 0 {
        return Ok(view_cart(state, session_id));
    }

    let product = find_product(state, payload.product_id).await?;
    let in_cart = state.carts.snapshot(session_id).quantity_of(product.id);
    let wanted = i64::from(in_cart) + i64::from(quantity);
    if wanted > i64::from(product.stock) {
        return Err(AppError::BadRequest(format!(
            "Only {} of {} in stock",
            product.stock, product.name
        )));
    }

    let item = NewLineItem {
        product_id: product.id,
        name: product.name,
        unit_price: product.price,
        image: product.image_url.unwrap_or_default(),
    };
    state
        .carts
        .update(session_id, |cart| cart.add_item(item, quantity));

    tracing::debug!(
        session_id = %session_id,
        product_id = payload.product_id,
        quantity,
        "cart item added"
    );
    Ok(ApiResponse::success(
        "Added to cart",
        summary(state, session_id),
        Some(Meta::empty()),
    ))
}

/// Sets a line's quantity. Zero and unknown product ids leave the cart as is;
/// quantities above stock are rejected.
pub async fn update_item(
    state: &AppState,
    session_id: Uuid,
    product_id: i64,
    payload: UpdateQuantityRequest,
) -> AppResult<ApiResponse<CartSummary>> {
    let quantity = to_quantity(payload.quantity)?;
    let in_cart = state.carts.snapshot(session_id).quantity_of(product_id);
    if quantity == 0 || in_cart == 0 {
        return Ok(view_cart(state, session_id));
    }

    if quantity > in_cart {
        let product = find_product(state, product_id).await?;
        if i64::from(quantity) > i64::from(product.stock) {
            return Err(AppError::BadRequest(format!(
                "Only {} of {} in stock",
                product.stock, product.name
            )));
        }
    }

    state
        .carts
        .update_existing(session_id, |cart| cart.update_quantity(product_id, quantity));
    Ok(ApiResponse::success(
        "Cart updated",
        summary(state, session_id),
        Some(Meta::empty()),
    ))
}

pub fn remove_item(
    state: &AppState,
    session_id: Uuid,
    product_id: i64,
) -> ApiResponse<CartSummary> {
    state
        .carts
        .update_existing(session_id, |cart| cart.remove_item(product_id));
    ApiResponse::success("Removed", summary(state, session_id), Some(Meta::empty()))
}

pub fn clear_cart(state: &AppState, session_id: Uuid) -> ApiResponse<CartSummary> {
    state.carts.update_existing(session_id, Cart::clear);
    ApiResponse::success("Cart cleared", summary(state, session_id), Some(Meta::empty()))
}
