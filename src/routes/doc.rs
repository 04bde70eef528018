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
        cart::{AddItemRequest, ApplyCouponRequest, CartDto, CartItemDto, UpdateQuantityRequest},
        coupons::{CouponList, CreateCouponRequest},
        products::{
            CreateProductRequest, CreateVariantRequest, ProductList, ProductWithVariants,
            UpdateProductRequest,
        },
    },
    models::{Cart, CartItem, Coupon, DiscountType, Product, ProductVariant},
    response::{ApiResponse, Meta},
    routes::{admin, cart, health, params, products as product_routes},
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
        cart::get_cart,
        cart::add_item,
        cart::update_item,
        cart::remove_item,
        cart::clear_cart,
        cart::apply_coupon,
        cart::remove_coupon,
        product_routes::list_products,
        product_routes::get_product,
        product_routes::create_product,
        product_routes::update_product,
        product_routes::delete_product,
        product_routes::create_variant,
        admin::create_coupon,
        admin::list_coupons
    ),
    components(
        schemas(
            Product,
            ProductVariant,
            Cart,
            CartItem,
            Coupon,
            DiscountType,
            CartDto,
            CartItemDto,
            AddItemRequest,
            UpdateQuantityRequest,
            ApplyCouponRequest,
            CreateProductRequest,
            UpdateProductRequest,
            CreateVariantRequest,
            CreateCouponRequest,
            ProductList,
            ProductWithVariants,
            CouponList,
            params::Pagination,
            params::ProductQuery,
            Meta,
            ApiResponse<CartDto>,
            ApiResponse<Product>,
            ApiResponse<ProductList>,
            ApiResponse<ProductWithVariants>,
            ApiResponse<Coupon>,
            ApiResponse<CouponList>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Products", description = "Catalog endpoints"),
        (name = "Cart", description = "Cart and coupon endpoints"),
        (name = "Admin", description = "Coupon administration endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
