use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    config::PricingConfig,
    error::{AppError, AppResult},
    models::{Cart, CartItem, Coupon, DiscountType},
};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PriceQuote {
    pub price: i64,
    pub currency: String,
}

/// Price-by-product lookup. The engine captures the quoted price on the cart
/// line and never re-fetches it for an existing line.
#[async_trait]
pub trait CatalogLookup: Send + Sync {
    async fn price_of(&self, product_id: Uuid, variant_id: Option<Uuid>) -> AppResult<PriceQuote>;
}

/// Coupon lookup and redemption. `redeem` must increment the usage counter
/// atomically with the limit check and report `CouponLimitReached` when the
/// counter is already at the limit, even if an earlier read said otherwise.
#[async_trait]
pub trait CouponStore: Send + Sync {
    async fn find_by_code(&self, code: &str) -> AppResult<Coupon>;
    async fn redeem(&self, coupon_id: Uuid) -> AppResult<()>;
}

/// The coupon parameters a cart needs to re-derive its discount after item
/// changes, snapshotted at apply time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedCoupon {
    pub code: String,
    pub kind: DiscountType,
    pub value: i64,
    pub max_discount: Option<i64>,
}

impl AppliedCoupon {
    pub fn from_coupon(coupon: &Coupon) -> AppResult<Self> {
        let kind = DiscountType::parse(&coupon.discount_type).ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!(
                "coupon {} has unknown discount type {}",
                coupon.code,
                coupon.discount_type
            ))
        })?;
        Ok(Self {
            code: coupon.code.clone(),
            kind,
            value: coupon.value,
            max_discount: coupon.max_discount,
        })
    }
}

/// A cart with its items and applied coupon, treated as one consistency
/// boundary. Engine operations mutate it in place and leave the derived
/// amounts consistent; callers persist the result.
#[derive(Debug, Clone)]
pub struct CartAggregate {
    pub cart: Cart,
    pub items: Vec<CartItem>,
    pub coupon: Option<AppliedCoupon>,
}

impl CartAggregate {
    pub fn new(cart: Cart, items: Vec<CartItem>, coupon_row: Option<Coupon>) -> AppResult<Self> {
        let coupon = match coupon_row {
            Some(row) => Some(AppliedCoupon::from_coupon(&row)?),
            None => None,
        };
        Ok(Self {
            cart,
            items,
            coupon,
        })
    }
}

#[derive(Clone)]
pub struct PricingEngine {
    catalog: Arc<dyn CatalogLookup>,
    coupons: Arc<dyn CouponStore>,
    config: PricingConfig,
}

impl PricingEngine {
    pub fn new(
        catalog: Arc<dyn CatalogLookup>,
        coupons: Arc<dyn CouponStore>,
        config: PricingConfig,
    ) -> Self {
        Self {
            catalog,
            coupons,
            config,
        }
    }

    pub fn config(&self) -> &PricingConfig {
        &self.config
    }

    /// Add `quantity` of a product (variant) to the cart. An existing line
    /// for the same (product, variant) is incremented instead of duplicated;
    /// only a new line fetches a catalog price.
    pub async fn add_item(
        &self,
        agg: &mut CartAggregate,
        product_id: Uuid,
        variant_id: Option<Uuid>,
        quantity: i32,
    ) -> AppResult<()> {
        if quantity <= 0 {
            return Err(AppError::InvalidQuantity);
        }

        if let Some(item) = agg
            .items
            .iter_mut()
            .find(|item| item.product_id == product_id && item.variant_id == variant_id)
        {
            item.quantity += quantity;
        } else {
            let quote = self.catalog.price_of(product_id, variant_id).await?;
            if agg.items.is_empty() {
                agg.cart.currency = quote.currency.clone();
            }
            agg.items.push(CartItem {
                id: Uuid::new_v4(),
                cart_id: agg.cart.id,
                product_id,
                variant_id,
                quantity,
                unit_price: quote.price,
                created_at: Utc::now(),
            });
        }

        self.recompute_totals(agg);
        Ok(())
    }

    /// Set an item's quantity, keeping its captured unit price. Use
    /// `remove_item` to delete a line; zero is not a valid quantity.
    pub fn update_item_quantity(
        &self,
        agg: &mut CartAggregate,
        item_id: Uuid,
        quantity: i32,
    ) -> AppResult<()> {
        if quantity <= 0 {
            return Err(AppError::InvalidQuantity);
        }
        let item = agg
            .items
            .iter_mut()
            .find(|item| item.id == item_id)
            .ok_or(AppError::NotFound)?;
        item.quantity = quantity;

        self.recompute_totals(agg);
        Ok(())
    }

    pub fn remove_item(&self, agg: &mut CartAggregate, item_id: Uuid) -> AppResult<()> {
        let before = agg.items.len();
        agg.items.retain(|item| item.id != item_id);
        if agg.items.len() == before {
            return Err(AppError::NotFound);
        }

        self.recompute_totals(agg);
        Ok(())
    }

    /// Drop all items and any applied coupon; every derived amount goes to
    /// zero.
    pub fn clear(&self, agg: &mut CartAggregate) {
        agg.items.clear();
        agg.coupon = None;
        agg.cart.coupon_code = None;
        self.recompute_totals(agg);
    }

    /// Validate and redeem a coupon against the cart. Applying a different
    /// code while one is active replaces it and consumes a redemption from
    /// the new coupon; the old redemption is not refunded.
    pub async fn apply_coupon(&self, agg: &mut CartAggregate, code: &str) -> AppResult<()> {
        let coupon = self.coupons.find_by_code(code).await?;

        let now = Utc::now();
        if !coupon.active
            || coupon.starts_at.is_some_and(|start| now < start)
            || coupon.ends_at.is_some_and(|end| now > end)
        {
            return Err(AppError::CouponExpired);
        }
        if let Some(limit) = coupon.usage_limit {
            if coupon.usage_count >= limit {
                return Err(AppError::CouponLimitReached);
            }
        }
        if let Some(min_purchase) = coupon.min_purchase {
            if agg.cart.subtotal < min_purchase {
                return Err(AppError::MinimumPurchaseNotMet);
            }
        }

        let applied = AppliedCoupon::from_coupon(&coupon)?;

        // The limit check above is optimistic; the store re-checks it inside
        // the increment and reports CouponLimitReached on a lost race.
        self.coupons.redeem(coupon.id).await?;

        agg.cart.coupon_code = Some(applied.code.clone());
        agg.coupon = Some(applied);
        self.recompute_totals(agg);
        Ok(())
    }

    /// Detach the applied coupon. The redemption stays consumed; the usage
    /// counter is not decremented.
    pub fn remove_coupon(&self, agg: &mut CartAggregate) {
        agg.coupon = None;
        agg.cart.coupon_code = None;
        self.recompute_totals(agg);
    }

    pub fn recompute_totals(&self, agg: &mut CartAggregate) {
        recompute_totals(agg, &self.config);
    }
}

/// Rewrite the four derived amounts from the current items and coupon.
/// Writes nothing else; the same inputs always produce the same outputs.
pub fn recompute_totals(agg: &mut CartAggregate, config: &PricingConfig) {
    let subtotal: i64 = agg.items.iter().map(CartItem::line_total).sum();

    // Shipping the flat policy would charge before any coupon is considered.
    let base_shipping = flat_shipping(subtotal, !agg.items.is_empty(), config);

    let discount = agg
        .coupon
        .as_ref()
        .map(|coupon| discount_amount(coupon, subtotal, base_shipping))
        .unwrap_or(0);

    let free_shipping = agg
        .coupon
        .as_ref()
        .is_some_and(|coupon| coupon.kind == DiscountType::FreeShipping);
    let shipping = if free_shipping { 0 } else { base_shipping };

    let tax = (subtotal - discount) * config.tax_rate_bps / 10_000;

    let cart = &mut agg.cart;
    cart.subtotal = subtotal;
    cart.discount = discount;
    cart.tax = tax;
    cart.shipping = shipping;
    cart.total = subtotal - discount + tax + shipping;
}

fn flat_shipping(subtotal: i64, has_items: bool, config: &PricingConfig) -> i64 {
    if !has_items || subtotal > config.free_shipping_threshold {
        0
    } else {
        config.shipping_fee
    }
}

fn discount_amount(coupon: &AppliedCoupon, subtotal: i64, base_shipping: i64) -> i64 {
    match coupon.kind {
        DiscountType::Percentage => {
            let amount = subtotal * coupon.value / 100;
            coupon.max_discount.map_or(amount, |cap| amount.min(cap))
        }
        // Never discounts more than the cart is worth.
        DiscountType::FixedAmount => coupon.value.min(subtotal),
        DiscountType::FreeShipping => base_shipping,
    }
}
