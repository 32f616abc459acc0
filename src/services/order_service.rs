use std::collections::HashMap;

use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::{self, AuditAction},
    cart::{Cart, NewLineItem},
    dto::orders::{CheckoutRequest, OrderList, OrderWithItems},
    entity::{
        order_items::{
            ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems,
            Model as OrderItemModel,
        },
        orders::{
            ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel,
        },
        products::{Column as ProdCol, Entity as Products, Model as ProductModel},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Order, OrderItem, OrderStatus},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    state::AppState,
};

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let condition = Condition::all().add(OrderCol::UserId.eq(user.user_id));
    list_with(state, condition, query).await
}

/// Pages through orders matching `condition`, newest first by default.
pub(crate) async fn list_with(
    state: &AppState,
    mut condition: Condition,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination().normalize();
    if let Some(status) = query.status {
        condition = condition.add(OrderCol::Status.eq(status.as_str()));
    }

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);

    let mut finder = Orders::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_from_entity)
        .collect::<AppResult<Vec<_>>>()?;

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success(
        "Ok",
        OrderList { items: orders },
        Some(meta),
    ))
}

/// Re-prices `cart` from the locked catalog rows. Fails when a product is
/// gone or does not have enough stock for its line.
fn reprice(cart: &Cart, products: &HashMap<i64, ProductModel>) -> AppResult<Cart> {
    let mut priced = Cart::new();
    for line in cart.items() {
        let product = products.get(&line.product_id).ok_or_else(|| {
            AppError::BadRequest(format!("{} is no longer available", line.name))
        })?;
        if i64::from(product.stock) < i64::from(line.quantity) {
            return Err(AppError::BadRequest(format!(
                "Insufficient stock for {}",
                product.name
            )));
        }
        priced.add_item(
            NewLineItem {
                product_id: product.id,
                name: product.name.clone(),
                unit_price: product.price,
                image: product.image_url.clone().unwrap_or_default(),
            },
            line.quantity,
        );
    }
    Ok(priced)
}

pub async fn checkout(
    state: &AppState,
    user: &AuthUser,
    cart_session: Uuid,
    payload: CheckoutRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let address = payload.address.trim();
    if address.is_empty() {
        return Err(AppError::BadRequest("Shipping address is required".into()));
    }

    let cart = state.carts.snapshot(cart_session);
    if cart.is_empty() {
        return Err(AppError::BadRequest("Cart is empty".into()));
    }

    let txn = state.orm.begin().await?;

    let ids: Vec<i64> = cart.items().iter().map(|line| line.product_id).collect();
    let products: HashMap<i64, ProductModel> = Products::find()
        .filter(ProdCol::Id.is_in(ids))
        .lock(LockType::Update)
        .all(&txn)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    let priced = reprice(&cart, &products)?;
    let summary = priced.summary(state.config.shipping_fee);

    let order = OrderActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.user_id),
        address: Set(address.to_string()),
        subtotal: Set(summary.subtotal),
        shipping: Set(summary.shipping),
        total_amount: Set(summary.total),
        status: Set(OrderStatus::Pending.as_str().into()),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    let mut order_items: Vec<OrderItem> = Vec::with_capacity(priced.items().len());
    for line in priced.items() {
        let quantity = i32::try_from(line.quantity)
            .map_err(|_| AppError::BadRequest("Quantity is too large".into()))?;
        let item = OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_id: Set(Some(line.product_id)),
            product_name: Set(line.name.clone()),
            quantity: Set(quantity),
            unit_price: Set(line.unit_price),
            created_at: NotSet,
        }
        .insert(&txn)
        .await?;

        order_items.push(order_item_from_entity(item));

        Products::update_many()
            .col_expr(ProdCol::Stock, Expr::col(ProdCol::Stock).sub(quantity))
            .filter(ProdCol::Id.eq(line.product_id))
            .exec(&txn)
            .await?;
    }

    txn.commit().await?;

    state
        .carts
        .update_existing(cart_session, |current| current.deduct(&cart));

    tracing::info!(
        order_id = %order.id,
        user_id = %user.user_id,
        total = %order.total_amount,
        "order placed"
    );
    audit::record(
        &state.pool,
        Some(user.user_id),
        AuditAction::Checkout,
        "orders",
        serde_json::json!({ "order_id": order.id, "total": order.total_amount.to_string() }),
    )
    .await;

    Ok(ApiResponse::success(
        "Checkout success",
        OrderWithItems {
            order: order_from_entity(order)?,
            items: order_items,
        },
        Some(Meta::empty()),
    ))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::UserId.eq(user.user_id))
                .add(OrderCol::Id.eq(id)),
        )
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let data = with_items(state, order).await?;
    Ok(ApiResponse::success("OK", data, Some(Meta::empty())))
}

pub(crate) async fn with_items(
    state: &AppState,
    order: OrderModel,
) -> AppResult<OrderWithItems> {
    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .order_by_asc(OrderItemCol::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_item_from_entity)
        .collect();

    Ok(OrderWithItems {
        order: order_from_entity(order)?,
        items,
    })
}

pub(crate) fn order_from_entity(model: OrderModel) -> AppResult<Order> {
    let status = model
        .status
        .parse::<OrderStatus>()
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;
    Ok(Order {
        id: model.id,
        user_id: model.user_id,
        address: model.address,
        subtotal: model.subtotal,
        shipping: model.shipping,
        total_amount: model.total_amount,
        status,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}

fn order_item_from_entity(model: OrderItemModel) -> OrderItem {
    OrderItem {
        id: model.id,
        order_id: model.order_id,
        product_id: model.product_id,
        product_name: model.product_name,
        quantity: model.quantity,
        unit_price: model.unit_price,
        created_at: model.created_at.with_timezone(&Utc),
    }
}

#[cfg(test)]
mod tests {
    use chrono::FixedOffset;
    use rust_decimal::Decimal;

    use super::*;

    fn d(value: &str) -> Decimal {
        value.parse().expect("decimal literal")
    }

    fn product(id: i64, price: &str, stock: i32) -> ProductModel {
        ProductModel {
            id,
            name: format!("Product {id}"),
            description: None,
            price: d(price),
            stock,
            image_url: None,
            category: None,
            featured: false,
            created_at: Utc::now().with_timezone(&FixedOffset::east_opt(0).expect("utc offset")),
        }
    }

    fn cart_line(id: i64, price: &str, quantity: u32) -> (NewLineItem, u32) {
        (
            NewLineItem {
                product_id: id,
                name: format!("Product {id}"),
                unit_price: d(price),
                image: String::new(),
            },
            quantity,
        )
    }

    #[test]
    fn reprice_uses_catalog_prices() {
        let mut cart = Cart::new();
        let (item, qty) = cart_line(1, "9.00", 2);
        cart.add_item(item, qty);
        let catalog = HashMap::from([(1, product(1, "12.50", 10))]);

        let priced = reprice(&cart, &catalog).expect("in stock");
        assert_eq!(priced.total_price(), d("25.00"));
        assert_eq!(priced.summary(d("4.99")).total, d("29.99"));
    }

    #[test]
    fn reprice_rejects_short_stock_and_missing_products() {
        let mut cart = Cart::new();
        let (item, qty) = cart_line(1, "5.00", 3);
        cart.add_item(item, qty);

        let short = HashMap::from([(1, product(1, "5.00", 2))]);
        assert!(matches!(reprice(&cart, &short), Err(AppError::BadRequest(_))));
        assert!(matches!(
            reprice(&cart, &HashMap::new()),
            Err(AppError::BadRequest(_))
        ));
    }
}
