use rust_decimal::Decimal;
use storefront_api::{
    config::AppConfig,
    db::{create_pool, run_migrations},
    dto::{
        admin::SetRolesRequest,
        auth::{SignInRequest, SignUpRequest},
        cart::AddToCartRequest,
        chat::SendMessageRequest,
        orders::{CheckoutRequest, UpdateOrderStatusRequest},
        products::CreateProductRequest,
        reviews::CreateReviewRequest,
    },
    error::AppError,
    middleware::auth::{AuthUser, require_roles, resolve_roles},
    models::OrderStatus,
    query::QueryState,
    roles::{ADMIN_ROLES, CHAT_ROLES, Role},
    routes::params::{OrderListQuery, ProductQuery},
    services::{
        admin_service, auth_service, cart_service, chat_service, order_service, product_service,
        review_service,
    },
    state::AppState,
};

fn d(value: &str) -> Decimal {
    value.parse().expect("decimal literal")
}

// Full flow: sign-up -> catalog -> cart -> checkout -> history -> admin role change -> chat.
#[tokio::test]
async fn sign_up_to_checkout_flow() -> anyhow::Result<()> {
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
            );
            return Ok(());
        }
    };

    let state = setup_state(&database_url).await?;

    let client = sign_up_and_in(&state, "client@example.com", "Claire", None).await?;
    let admin = sign_up_and_in(&state, "admin@example.com", "Ada", Some(Role::Admin)).await?;

    // A role sent with the sign-up body grants nothing beyond client.
    let eve: SignUpRequest = serde_json::from_value(serde_json::json!({
        "email": "eve@example.com",
        "password": "secret123",
        "name": "Eve",
        "role": "admin",
    }))?;
    auth_service::sign_up(&state, eve).await?;
    let eve = auth_service::sign_in(
        &state,
        SignInRequest {
            email: "eve@example.com".into(),
            password: "secret123".into(),
        },
    )
    .await?
    .data
    .expect("sign-in");
    assert_eq!(eve.roles, vec![Role::Client]);
    let eve = AuthUser {
        user_id: eve.user.id,
        session_id: eve.session_id,
    };
    assert!(matches!(
        require_roles(&state, &eve, ADMIN_ROLES).await,
        Err(AppError::Forbidden)
    ));

    let duplicate = auth_service::sign_up(
        &state,
        SignUpRequest {
            email: "client@example.com".into(),
            password: "secret123".into(),
            name: "Again".into(),
        },
    )
    .await;
    assert!(matches!(duplicate, Err(AppError::Conflict(_))));

    let product = product_service::create_product(
        &state,
        &admin,
        CreateProductRequest {
            name: "Test Widget".into(),
            description: Some("A product for testing".into()),
            price: d("10.00"),
            stock: 6,
            image_url: None,
            category: Some("gadgets".into()),
            featured: false,
        },
    )
    .await?
    .data
    .expect("product");
    assert!(!product.low_stock);

    let listed = product_service::list_products(
        &state,
        ProductQuery {
            category: Some("gadgets".into()),
            ..Default::default()
        },
    )
    .await?
    .data
    .expect("products");
    assert_eq!(listed.items.len(), 1);

    // Cart lives under the client's session id.
    cart_service::add_item(
        &state,
        client.session_id,
        AddToCartRequest {
            product_id: product.id,
            quantity: Some(2),
        },
    )
    .await?;
    cart_service::add_item(
        &state,
        client.session_id,
        AddToCartRequest {
            product_id: product.id,
            quantity: Some(3),
        },
    )
    .await?;
    let too_many = cart_service::add_item(
        &state,
        client.session_id,
        AddToCartRequest {
            product_id: product.id,
            quantity: Some(2),
        },
    )
    .await;
    assert!(matches!(too_many, Err(AppError::BadRequest(_))));

    let summary = cart_service::view_cart(&state, client.session_id)
        .data
        .expect("cart");
    assert_eq!(summary.total_items, 5);
    assert_eq!(summary.subtotal, d("50.00"));

    let placed = order_service::checkout(
        &state,
        &client,
        client.session_id,
        CheckoutRequest {
            address: "1 Main Street".into(),
        },
    )
    .await?
    .data
    .expect("order");
    assert_eq!(placed.order.subtotal, d("50.00"));
    assert_eq!(placed.order.total_amount, d("50.00") + state.config.shipping_fee);
    assert_eq!(placed.order.status, OrderStatus::Pending);
    assert_eq!(placed.items.len(), 1);
    assert!(state.carts.snapshot(client.session_id).is_empty());

    let after = product_service::get_product(&state, product.id)
        .await?
        .data
        .expect("product");
    assert_eq!(after.stock, 1);
    assert!(after.low_stock);

    let empty_checkout = order_service::checkout(
        &state,
        &client,
        client.session_id,
        CheckoutRequest {
            address: "1 Main Street".into(),
        },
    )
    .await;
    assert!(matches!(empty_checkout, Err(AppError::BadRequest(_))));

    let history = order_service::list_orders(&state, &client, OrderListQuery::default())
        .await?
        .data
        .expect("orders");
    assert_eq!(history.items.len(), 1);

    let admin_history = order_service::list_orders(&state, &admin, OrderListQuery::default())
        .await?
        .data
        .expect("orders");
    assert!(admin_history.items.is_empty());

    let shipped = admin_service::update_order_status(
        &state,
        &admin,
        placed.order.id,
        UpdateOrderStatusRequest {
            status: OrderStatus::Shipped,
        },
    )
    .await?
    .data
    .expect("order");
    assert_eq!(shipped.status, OrderStatus::Shipped);

    let review = review_service::create_review(
        &state,
        &client,
        product.id,
        CreateReviewRequest {
            rating: 5,
            comment: Some("  Great  ".into()),
        },
    )
    .await?
    .data
    .expect("review");
    assert_eq!(review.author, "Claire");
    assert_eq!(review.comment.as_deref(), Some("Great"));

    // Client cannot chat until an admin grants a staff role.
    assert!(matches!(
        require_roles(&state, &client, CHAT_ROLES).await,
        Err(AppError::Forbidden)
    ));

    let change = admin_service::set_user_roles(
        &state,
        &admin,
        client.user_id,
        SetRolesRequest {
            roles: vec![Role::Client, Role::Employee],
        },
    )
    .await?
    .data
    .expect("role change");
    assert_eq!(change.added, vec![Role::Employee]);
    assert!(change.removed.is_empty());
    assert_eq!(
        state
            .sessions
            .snapshot(client.session_id)
            .expect("session")
            .roles,
        QueryState::Idle
    );

    let reloaded = resolve_roles(&state, &client).await?;
    assert!(reloaded.has_role(Role::Employee));
    require_roles(&state, &client, CHAT_ROLES).await?;

    let mut rx = state.chat.subscribe();
    let blank = chat_service::send_message(
        &state,
        &client,
        SendMessageRequest { body: "   ".into() },
    )
    .await;
    assert!(matches!(blank, Err(AppError::BadRequest(_))));

    chat_service::send_message(
        &state,
        &client,
        SendMessageRequest {
            body: "Restocked the widgets".into(),
        },
    )
    .await?;
    assert!(rx.recv().await.is_ok());

    let messages = chat_service::list_messages(&state)
        .await?
        .data
        .expect("messages");
    assert_eq!(messages.items.len(), 1);
    assert_eq!(messages.items[0].sender_name.as_deref(), Some("Claire"));

    auth_service::sign_out(&state, &client).await?;
    assert!(state.sessions.snapshot(client.session_id).is_none());

    Ok(())
}

async fn setup_state(database_url: &str) -> anyhow::Result<AppState> {
    let pool = create_pool(database_url).await?;
    run_migrations(&pool).await?;

    sqlx::query(
        "TRUNCATE TABLE messages, reviews, order_items, orders, audit_logs, products, user_roles, users RESTART IDENTITY CASCADE",
    )
    .execute(&pool)
    .await?;

    let config = AppConfig {
        database_url: database_url.to_string(),
        jwt_secret: "flow-test-secret".into(),
        host: "127.0.0.1".into(),
        port: 0,
        session_ttl_hours: 1,
        shipping_fee: d("4.99"),
        low_stock_threshold: 5,
    };
    Ok(AppState::new(pool, config))
}

/// Signs up through the service, then grants `extra_role` directly in the
/// database the way an operator would, then signs in.
async fn sign_up_and_in(
    state: &AppState,
    email: &str,
    name: &str,
    extra_role: Option<Role>,
) -> anyhow::Result<AuthUser> {
    let user = auth_service::sign_up(
        state,
        SignUpRequest {
            email: email.into(),
            password: "secret123".into(),
            name: name.into(),
        },
    )
    .await?
    .data
    .expect("user");

    if let Some(role) = extra_role {
        sqlx::query("INSERT INTO user_roles (id, user_id, role) VALUES ($1, $2, $3)")
            .bind(uuid::Uuid::new_v4())
            .bind(user.id)
            .bind(role.as_str())
            .execute(&state.pool)
            .await?;
    }

    let signed_in = auth_service::sign_in(
        state,
        SignInRequest {
            email: email.into(),
            password: "secret123".into(),
        },
    )
    .await?
    .data
    .expect("sign-in");

    Ok(AuthUser {
        user_id: signed_in.user.id,
        session_id: signed_in.session_id,
    })
}
