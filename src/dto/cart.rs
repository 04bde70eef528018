use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::pricing::CartAggregate;

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddItemRequest {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub quantity: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateQuantityRequest {
    pub quantity: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ApplyCouponRequest {
    pub code: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartItemDto {
    pub id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub quantity: i32,
    pub unit_price: i64,
    pub line_total: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartDto {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub session_id: Option<Uuid>,
    pub items: Vec<CartItemDto>,
    pub coupon_code: Option<String>,
    pub subtotal: i64,
    pub discount: i64,
    pub tax: i64,
    pub shipping: i64,
    pub total: i64,
    pub currency: String,
    pub expires_at: DateTime<Utc>,
}

impl CartDto {
    pub fn from_aggregate(agg: &CartAggregate) -> Self {
        let items = agg
            .items
            .iter()
            .map(|item| CartItemDto {
                id: item.id,
                product_id: item.product_id,
                variant_id: item.variant_id,
                quantity: item.quantity,
                unit_price: item.unit_price,
                line_total: item.line_total(),
            })
            .collect();

        Self {
            id: agg.cart.id,
            user_id: agg.cart.user_id,
            session_id: agg.cart.session_id,
            items,
            coupon_code: agg.cart.coupon_code.clone(),
            subtotal: agg.cart.subtotal,
            discount: agg.cart.discount,
            tax: agg.cart.tax,
            shipping: agg.cart.shipping,
            total: agg.cart.total,
            currency: agg.cart.currency.clone(),
            expires_at: agg.cart.expires_at,
        }
    }
}
