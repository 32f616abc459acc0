use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::Expr;
use sea_orm::sea_query::extension::postgres::PgExpr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};

use crate::{
    audit::{self, AuditAction},
    dto::products::{CategoryList, CreateProductRequest, ProductList, UpdateProductRequest},
    entity::products::{ActiveModel, Column, Entity as Products, Model as ProductModel},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::Product,
    response::{ApiResponse, Meta},
    routes::params::{ProductQuery, ProductSortBy, SortOrder},
    state::AppState,
};

/// Category value meaning "no category filter".
pub const ALL_CATEGORIES: &str = "all";

pub async fn list_products(
    state: &AppState,
    query: ProductQuery,
) -> AppResult<ApiResponse<ProductList>> {
    let (page, limit, offset) = query.pagination().normalize();
    let mut condition = Condition::all();

    if let Some(category) = query
        .category
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty() && !c.eq_ignore_ascii_case(ALL_CATEGORIES))
    {
        condition = condition.add(Column::Category.eq(category));
    }

    if let Some(search) = query.q.as_ref().filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search);
        condition = condition.add(
            Condition::any()
                .add(Expr::col(Column::Name).ilike(pattern.clone()))
                .add(Expr::col(Column::Description).ilike(pattern)),
        );
    }

    if let Some(featured) = query.featured {
        condition = condition.add(Column::Featured.eq(featured));
    }

    if let Some(min_price) = query.min_price {
        condition = condition.add(Column::Price.gte(min_price));
    }

    if let Some(max_price) = query.max_price {
        condition = condition.add(Column::Price.lte(max_price));
    }

    let sort_by = query.sort_by.unwrap_or(ProductSortBy::CreatedAt);
    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);
    let sort_col = match sort_by {
        ProductSortBy::CreatedAt => Column::CreatedAt,
        ProductSortBy::Price => Column::Price,
        ProductSortBy::Name => Column::Name,
    };

    let mut finder = Products::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(sort_col),
        SortOrder::Desc => finder.order_by_desc(sort_col),
    };
    // Stable paging when the sort column ties.
    finder = finder.order_by_asc(Column::Id);

    let total = finder.clone().count(&state.orm).await? as i64;

    let threshold = state.config.low_stock_threshold;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(|model| product_from_entity(model, threshold))
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Products", ProductList { items }, Some(meta)))
}

pub async fn find_product(state: &AppState, id: i64) -> AppResult<ProductModel> {
    Products::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)
}

pub async fn get_product(state: &AppState, id: i64) -> AppResult<ApiResponse<Product>> {
    let model = find_product(state, id).await?;
    Ok(ApiResponse::success(
        "Product",
        product_from_entity(model, state.config.low_stock_threshold),
        None,
    ))
}

pub async fn list_categories(state: &AppState) -> AppResult<ApiResponse<CategoryList>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT DISTINCT category
        FROM products
        WHERE category IS NOT NULL AND category <> ''
        ORDER BY category
        "#,
    )
    .fetch_all(&state.pool)
    .await?;

    let items = rows.into_iter().map(|(category,)| category).collect();
    Ok(ApiResponse::success(
        "Categories",
        CategoryList { items },
        Some(Meta::empty()),
    ))
}

fn validate_fields(
    name: Option<&str>,
    price: Option<Decimal>,
    stock: Option<i32>,
) -> AppResult<()> {
    if name.is_some_and(|n| n.trim().is_empty()) {
        return Err(AppError::BadRequest("Product name is required".into()));
    }
    if price.is_some_and(|p| p.is_sign_negative()) {
        return Err(AppError::BadRequest("Price must not be negative".into()));
    }
    if stock.is_some_and(|s| s < 0) {
        return Err(AppError::BadRequest("Stock must not be negative".into()));
    }
    Ok(())
}

async fn ensure_name_free(state: &AppState, name: &str, except: Option<i64>) -> AppResult<()> {
    let mut condition = Condition::all().add(Column::Name.eq(name));
    if let Some(id) = except {
        condition = condition.add(Column::Id.ne(id));
    }
    let taken = Products::find().filter(condition).count(&state.orm).await? > 0;
    if taken {
        return Err(AppError::Conflict(format!("Product {name:?} already exists")));
    }
    Ok(())
}

pub async fn create_product(
    state: &AppState,
    user: &AuthUser,
    payload: CreateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    validate_fields(Some(&payload.name), Some(payload.price), Some(payload.stock))?;
    let name = payload.name.trim().to_string();
    ensure_name_free(state, &name, None).await?;

    let active = ActiveModel {
        id: NotSet,
        name: Set(name),
        description: Set(payload.description),
        price: Set(payload.price),
        stock: Set(payload.stock),
        image_url: Set(payload.image_url),
        category: Set(payload.category),
        featured: Set(payload.featured),
        created_at: NotSet,
    };
    let product = active.insert(&state.orm).await?;

    tracing::info!(product_id = product.id, user_id = %user.user_id, "product created");
    audit::record(
        &state.pool,
        Some(user.user_id),
        AuditAction::ProductCreate,
        "products",
        serde_json::json!({ "product_id": product.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Product created",
        product_from_entity(product, state.config.low_stock_threshold),
        Some(Meta::empty()),
    ))
}

pub async fn update_product(
    state: &AppState,
    user: &AuthUser,
    id: i64,
    payload: UpdateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    validate_fields(payload.name.as_deref(), payload.price, payload.stock)?;
    let existing = find_product(state, id).await?;

    let mut active: ActiveModel = existing.into();
    if let Some(name) = payload.name {
        let name = name.trim().to_string();
        ensure_name_free(state, &name, Some(id)).await?;
        active.name = Set(name);
    }
    if let Some(description) = payload.description {
        active.description = Set(Some(description));
    }
    if let Some(price) = payload.price {
        active.price = Set(price);
    }
    if let Some(stock) = payload.stock {
        active.stock = Set(stock);
    }
    if let Some(image_url) = payload.image_url {
        active.image_url = Set(Some(image_url));
    }
    if let Some(category) = payload.category {
        active.category = Set(Some(category));
    }
    if let Some(featured) = payload.featured {
        active.featured = Set(featured);
    }

    let product = active.update(&state.orm).await?;

    tracing::info!(product_id = product.id, user_id = %user.user_id, "product updated");
    audit::record(
        &state.pool,
        Some(user.user_id),
        AuditAction::ProductUpdate,
        "products",
        serde_json::json!({ "product_id": product.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Updated",
        product_from_entity(product, state.config.low_stock_threshold),
        Some(Meta::empty()),
    ))
}

pub async fn delete_product(
    state: &AppState,
    user: &AuthUser,
    id: i64,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let result = Products::delete_by_id(id).exec(&state.orm).await?;

    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    tracing::info!(product_id = id, user_id = %user.user_id, "product deleted");
    audit::record(
        &state.pool,
        Some(user.user_id),
        AuditAction::ProductDelete,
        "products",
        serde_json::json!({ "product_id": id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub fn is_low_stock(stock: i32, threshold: i32) -> bool {
    stock <= threshold
}

pub fn product_from_entity(model: ProductModel, low_stock_threshold: i32) -> Product {
    Product {
        id: model.id,
        low_stock: is_low_stock(model.stock, low_stock_threshold),
        name: model.name,
        description: model.description,
        price: model.price,
        stock: model.stock,
        image_url: model.image_url,
        category: model.category,
        featured: model.featured,
        created_at: model.created_at.with_timezone(&Utc),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn low_stock_includes_threshold() {
        assert!(is_low_stock(0, 5));
        assert!(is_low_stock(5, 5));
        assert!(!is_low_stock(6, 5));
    }

    #[test]
    fn rejects_negative_price_and_blank_name() {
        assert!(validate_fields(Some("  "), None, None).is_err());
        assert!(validate_fields(None, Some(Decimal::new(-1, 2)), None).is_err());
        assert!(validate_fields(None, None, Some(-3)).is_err());
        assert!(validate_fields(Some("Mug"), Some(Decimal::ZERO), Some(0)).is_ok());
    }
}
