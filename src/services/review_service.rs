use crate::{
    audit::{self, AuditAction},
    dto::reviews::{CreateReviewRequest, ReviewList},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::Review,
    response::{ApiResponse, Meta},
    services::product_service::find_product,
    state::AppState,
};

const REVIEW_COLUMNS: &str = r#"
    r.id, r.product_id, r.user_id,
    COALESCE(NULLIF(u.name, ''), u.email) AS author,
    r.rating, r.comment, r.created_at
"#;

pub fn average_rating(reviews: &[Review]) -> Option<f64> {
    if reviews.is_empty() {
        return None;
    }
    let sum: i64 = reviews.iter().map(|r| i64::from(r.rating)).sum();
    Some(sum as f64 / reviews.len() as f64)
}

pub async fn list_reviews(
    state: &AppState,
    product_id: i64,
) -> AppResult<ApiResponse<ReviewList>> {
    find_product(state, product_id).await?;

    let items = sqlx::query_as::<_, Review>(&format!(
        r#"
        SELECT {REVIEW_COLUMNS}
        FROM reviews r
        JOIN users u ON u.id = r.user_id
        WHERE r.product_id = $1
        ORDER BY r.created_at DESC
        "#
    ))
    .bind(product_id)
    .fetch_all(&state.pool)
    .await?;

    let average = average_rating(&items);
    Ok(ApiResponse::success(
        "Reviews",
        ReviewList {
            items,
            average_rating: average,
        },
        Some(Meta::empty()),
    ))
}

pub async fn create_review(
    state: &AppState,
    user: &AuthUser,
    product_id: i64,
    payload: CreateReviewRequest,
) -> AppResult<ApiResponse<Review>> {
    if !(1..=5).contains(&payload.rating) {
        return Err(AppError::BadRequest("Rating must be between 1 and 5".into()));
    }
    find_product(state, product_id).await?;

    let comment = payload
        .comment
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());

    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO reviews (product_id, user_id, rating, comment)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(product_id)
    .bind(user.user_id)
    .bind(payload.rating)
    .bind(comment)
    .fetch_one(&state.pool)
    .await?;

    let review = fetch_review(state, id).await?;

    tracing::info!(product_id, review_id = id, user_id = %user.user_id, "review posted");
    audit::record(
        &state.pool,
        Some(user.user_id),
        AuditAction::ReviewCreate,
        "reviews",
        serde_json::json!({ "review_id": id, "product_id": product_id }),
    )
    .await;

    Ok(ApiResponse::success("Review created", review, Some(Meta::empty())))
}

async fn fetch_review(state: &AppState, id: i64) -> AppResult<Review> {
    sqlx::query_as::<_, Review>(&format!(
        r#"
        SELECT {REVIEW_COLUMNS}
        FROM reviews r
        JOIN users u ON u.id = r.user_id
        WHERE r.id = $1
        "#
    ))
    .bind(id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(AppError::NotFound)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;

    fn review(rating: i16) -> Review {
        Review {
            id: 1,
            product_id: 1,
            user_id: Uuid::new_v4(),
            author: "ana".into(),
            rating,
            comment: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn average_of_no_reviews_is_none() {
        assert_eq!(average_rating(&[]), None);
    }

    #[test]
    fn average_rating_is_mean() {
        let reviews = [review(5), review(4), review(3)];
        assert_eq!(average_rating(&reviews), Some(4.0));
    }
}
