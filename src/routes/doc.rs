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
    dto::{
        auth::{
            LoginRequest, LoginResponse, OtpRequest, OtpVerifyRequest, RefreshRequest,
            RefreshResponse, RegisterRequest,
        },
        cart::{AddToCartRequest, CartItemDto, CartList, UpdateCartQuantityRequest},
        orders::{CreateOrderRequest, GeoPoint, OrderList, OrderWithItems, UpdateOrderStatusRequest},
        payments::PaymentIntentResponse,
        products::{CreateProductRequest, ProductList, UpdateProductRequest},
        reviews::{CreateReviewRequest, ReviewList, ReviewWithAuthor, UpdateReviewRequest},
        users::{
            ChangePasswordRequest, RestoreAccountRequest, UpdateAccountRequest, UserList,
            UserPublic,
        },
        wishlist::{WishlistProductList, WishlistProductRequest, WishlistToggleResult},
    },
    models::{CartItem, Order, OrderItem, Product, Review},
    response::{ApiResponse, Meta},
    routes::{
        admin, auth, cart, health, orders, payments, products as product_routes, reviews, users,
        wishlist,
    },
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
        auth::register,
        auth::login,
        auth::refresh_token,
        auth::logout,
        auth::otp_request,
        auth::otp_verify,
        users::me,
        users::update_account,
        users::change_password,
        users::delete_account,
        users::restore_account,
        product_routes::list_products,
        product_routes::featured_products,
        product_routes::my_products,
        product_routes::get_product,
        product_routes::create_product,
        product_routes::update_product,
        product_routes::delete_product,
        cart::cart_list,
        cart::add_to_cart,
        cart::update_quantity,
        cart::remove_from_cart,
        wishlist::list_wishlist,
        wishlist::add_to_wishlist,
        wishlist::toggle_wishlist,
        wishlist::remove_from_wishlist,
        orders::create_order,
        orders::list_my_orders,
        orders::get_order,
        reviews::create_review,
        reviews::list_product_reviews,
        reviews::update_review,
        reviews::delete_review,
        payments::create_payment_intent,
        admin::list_users,
        admin::get_user,
        admin::deactivate_user,
        admin::restore_user,
        admin::list_all_orders,
        admin::update_order_status
    ),
    components(
        schemas(
            Product,
            CartItem,
            Order,
            OrderItem,
            Review,
            RegisterRequest,
            LoginRequest,
            LoginResponse,
            RefreshRequest,
            RefreshResponse,
            OtpRequest,
            OtpVerifyRequest,
            UserPublic,
            UserList,
            UpdateAccountRequest,
            ChangePasswordRequest,
            RestoreAccountRequest,
            CreateProductRequest,
            UpdateProductRequest,
            ProductList,
            AddToCartRequest,
            UpdateCartQuantityRequest,
            CartItemDto,
            CartList,
            WishlistProductRequest,
            WishlistProductList,
            WishlistToggleResult,
            GeoPoint,
            CreateOrderRequest,
            UpdateOrderStatusRequest,
            OrderWithItems,
            OrderList,
            CreateReviewRequest,
            UpdateReviewRequest,
            ReviewWithAuthor,
            ReviewList,
            PaymentIntentResponse,
            Meta,
            ApiResponse<Product>,
            ApiResponse<ProductList>,
            ApiResponse<UserPublic>,
            ApiResponse<LoginResponse>,
            ApiResponse<CartList>,
            ApiResponse<WishlistProductList>,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderList>,
            ApiResponse<ReviewList>,
            ApiResponse<PaymentIntentResponse>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Registration, login, token refresh and OTP login"),
        (name = "Users", description = "Account management endpoints"),
        (name = "Products", description = "Catalog endpoints"),
        (name = "Cart", description = "Cart endpoints"),
        (name = "Wishlist", description = "Wishlist endpoints"),
        (name = "Orders", description = "Order endpoints"),
        (name = "Reviews", description = "Review endpoints"),
        (name = "Payments", description = "Payment intent endpoints"),
        (name = "Admin", description = "Admin endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
