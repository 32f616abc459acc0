use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    cart::{CartSummary, LineItem},
    dto::{
        admin::{RoleChange, SetRolesRequest, UserList},
        auth::{SessionInfo, SignInRequest, SignInResponse, SignUpRequest},
        cart::{AddToCartRequest, CartSessionResponse, UpdateQuantityRequest},
        chat::{MessageList, SendMessageRequest},
        orders::{CheckoutRequest, OrderList, OrderWithItems, UpdateOrderStatusRequest},
        products::{CategoryList, CreateProductRequest, ProductList, UpdateProductRequest},
        profile::UpdateProfileRequest,
        reviews::{CreateReviewRequest, ReviewList},
        views::ViewAccess,
    },
    guard::{GuardDecision, View},
    models::{ChatMessage, Order, OrderItem, OrderStatus, Product, Review, User, UserWithRoles},
    response::{ApiResponse, Meta},
    roles::Role,
    routes::{admin, auth, cart, chat, health, orders, params, products, profile, views},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::sign_up,
        auth::sign_in,
        auth::sign_out,
        auth::session,
        products::list_products,
        products::list_categories,
        products::get_product,
        products::create_product,
        products::update_product,
        products::delete_product,
        products::list_reviews,
        products::create_review,
        cart::open_session,
        cart::view_cart,
        cart::add_item,
        cart::update_item,
        cart::remove_item,
        cart::clear_cart,
        orders::list_orders,
        orders::checkout,
        orders::get_order,
        profile::get_profile,
        profile::update_profile,
        admin::list_users,
        admin::set_user_roles,
        admin::list_all_orders,
        admin::get_order_admin,
        admin::update_order_status,
        admin::list_low_stock,
        chat::list_messages,
        chat::send_message,
        chat::stream,
        views::view_access
    ),
    components(
        schemas(
            User,
            UserWithRoles,
            Role,
            Product,
            Review,
            Order,
            OrderItem,
            OrderStatus,
            ChatMessage,
            LineItem,
            CartSummary,
            GuardDecision,
            View,
            ViewAccess,
            SignUpRequest,
            SignInRequest,
            SignInResponse,
            SessionInfo,
            AddToCartRequest,
            UpdateQuantityRequest,
            CartSessionResponse,
            CreateProductRequest,
            UpdateProductRequest,
            ProductList,
            CategoryList,
            CreateReviewRequest,
            ReviewList,
            CheckoutRequest,
            OrderList,
            OrderWithItems,
            UpdateOrderStatusRequest,
            UpdateProfileRequest,
            SetRolesRequest,
            RoleChange,
            UserList,
            SendMessageRequest,
            MessageList,
            params::Pagination,
            params::ProductQuery,
            params::OrderListQuery,
            Meta,
            ApiResponse<Product>,
            ApiResponse<ProductList>,
            ApiResponse<CartSummary>,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderList>,
            ApiResponse<ViewAccess>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Sign-up, sign-in and sessions"),
        (name = "Products", description = "Catalog endpoints"),
        (name = "Reviews", description = "Product reviews"),
        (name = "Cart", description = "Session cart endpoints"),
        (name = "Orders", description = "Checkout and order history"),
        (name = "Profile", description = "Own profile"),
        (name = "Admin", description = "Admin endpoints"),
        (name = "Chat", description = "Team chat"),
        (name = "Views", description = "Route guard decisions for front-end views"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
