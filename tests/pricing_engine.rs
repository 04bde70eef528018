use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use uuid::Uuid;

use async_trait::async_trait;
use cart_pricing_api::{
    config::PricingConfig,
    error::{AppError, AppResult},
    models::{Cart, Coupon},
    pricing::{CartAggregate, CatalogLookup, CouponStore, PriceQuote, PricingEngine},
};

struct FakeCatalog {
    prices: Mutex<HashMap<(Uuid, Option<Uuid>), i64>>,
}

impl FakeCatalog {
    fn new() -> Self {
        Self {
            prices: Mutex::new(HashMap::new()),
        }
    }

    fn set_price(&self, product_id: Uuid, variant_id: Option<Uuid>, price: i64) {
        self.prices
            .lock()
            .unwrap()
            .insert((product_id, variant_id), price);
    }
}

#[async_trait]
impl CatalogLookup for FakeCatalog {
    async fn price_of(&self, product_id: Uuid, variant_id: Option<Uuid>) -> AppResult<PriceQuote> {
        self.prices
            .lock()
            .unwrap()
            .get(&(product_id, variant_id))
            .copied()
            .map(|price| PriceQuote {
                price,
                currency: "USD".to_string(),
            })
            .ok_or(AppError::NotFound)
    }
}

struct FakeCouponStore {
    coupons: Mutex<Vec<Coupon>>,
}

impl FakeCouponStore {
    fn new(coupons: Vec<Coupon>) -> Self {
        Self {
            coupons: Mutex::new(coupons),
        }
    }

    fn usage_count(&self, code: &str) -> i32 {
        self.coupons
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.code == code)
            .map(|c| c.usage_count)
            .unwrap_or(0)
    }
}

#[async_trait]
impl CouponStore for FakeCouponStore {
    async fn find_by_code(&self, code: &str) -> AppResult<Coupon> {
        self.coupons
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.code == code)
            .cloned()
            .ok_or(AppError::NotFound)
    }

    // Check-and-increment under one lock, like the conditional UPDATE in the
    // real store.
    async fn redeem(&self, coupon_id: Uuid) -> AppResult<()> {
        let mut coupons = self.coupons.lock().unwrap();
        let coupon = coupons
            .iter_mut()
            .find(|c| c.id == coupon_id)
            .ok_or(AppError::NotFound)?;
        if !coupon.active {
            return Err(AppError::CouponLimitReached);
        }
        if coupon
            .usage_limit
            .is_some_and(|limit| coupon.usage_count >= limit)
        {
            return Err(AppError::CouponLimitReached);
        }
        coupon.usage_count += 1;
        Ok(())
    }
}

fn coupon(code: &str, discount_type: &str, value: i64) -> Coupon {
    Coupon {
        id: Uuid::new_v4(),
        code: code.to_string(),
        discount_type: discount_type.to_string(),
        value,
        min_purchase: None,
        max_discount: None,
        usage_limit: None,
        usage_count: 0,
        starts_at: None,
        ends_at: None,
        active: true,
        created_at: Utc::now(),
    }
}

fn empty_cart() -> CartAggregate {
    let now = Utc::now();
    let cart = Cart {
        id: Uuid::new_v4(),
        user_id: Some(Uuid::new_v4()),
        session_id: None,
        coupon_code: None,
        subtotal: 0,
        discount: 0,
        tax: 0,
        shipping: 0,
        total: 0,
        currency: "USD".to_string(),
        expires_at: now + Duration::days(30),
        created_at: now,
        updated_at: now,
    };
    CartAggregate::new(cart, Vec::new(), None).expect("empty aggregate")
}

fn engine_with(catalog: Arc<FakeCatalog>, store: Arc<FakeCouponStore>) -> PricingEngine {
    PricingEngine::new(catalog, store, PricingConfig::default())
}

fn assert_consistent(agg: &CartAggregate) {
    let subtotal: i64 = agg
        .items
        .iter()
        .map(|item| item.unit_price * i64::from(item.quantity))
        .sum();
    assert_eq!(agg.cart.subtotal, subtotal, "subtotal out of sync with items");
    assert_eq!(
        agg.cart.total,
        agg.cart.subtotal - agg.cart.discount + agg.cart.tax + agg.cart.shipping,
        "total out of sync with components"
    );
}

#[tokio::test]
async fn subtotal_tracks_every_mutation() {
    let catalog = Arc::new(FakeCatalog::new());
    let store = Arc::new(FakeCouponStore::new(vec![]));
    let engine = engine_with(catalog.clone(), store);

    let p1 = Uuid::new_v4();
    let p2 = Uuid::new_v4();
    catalog.set_price(p1, None, 1500);
    catalog.set_price(p2, None, 2000);

    let mut agg = empty_cart();

    engine.add_item(&mut agg, p1, None, 2).await.unwrap();
    assert_consistent(&agg);
    assert_eq!(agg.cart.subtotal, 3000);

    engine.add_item(&mut agg, p2, None, 1).await.unwrap();
    assert_consistent(&agg);
    assert_eq!(agg.cart.subtotal, 5000);

    let p1_item = agg.items[0].id;
    engine.update_item_quantity(&mut agg, p1_item, 5).unwrap();
    assert_consistent(&agg);
    assert_eq!(agg.cart.subtotal, 9500);

    let p2_item = agg.items[1].id;
    engine.remove_item(&mut agg, p2_item).unwrap();
    assert_consistent(&agg);
    assert_eq!(agg.cart.subtotal, 7500);
}

#[tokio::test]
async fn adding_same_product_twice_merges_into_one_line() {
    let catalog = Arc::new(FakeCatalog::new());
    let store = Arc::new(FakeCouponStore::new(vec![]));
    let engine = engine_with(catalog.clone(), store);

    let product = Uuid::new_v4();
    catalog.set_price(product, None, 1000);

    let mut agg = empty_cart();
    engine.add_item(&mut agg, product, None, 2).await.unwrap();
    engine.add_item(&mut agg, product, None, 3).await.unwrap();

    assert_eq!(agg.items.len(), 1);
    assert_eq!(agg.items[0].quantity, 5);
    assert_eq!(agg.cart.subtotal, 5000);
}

#[tokio::test]
async fn variant_lines_stay_separate_from_base_product() {
    let catalog = Arc::new(FakeCatalog::new());
    let store = Arc::new(FakeCouponStore::new(vec![]));
    let engine = engine_with(catalog.clone(), store);

    let product = Uuid::new_v4();
    let variant = Uuid::new_v4();
    catalog.set_price(product, None, 1000);
    catalog.set_price(product, Some(variant), 1300);

    let mut agg = empty_cart();
    engine.add_item(&mut agg, product, None, 1).await.unwrap();
    engine
        .add_item(&mut agg, product, Some(variant), 1)
        .await
        .unwrap();

    assert_eq!(agg.items.len(), 2);
    assert_eq!(agg.cart.subtotal, 2300);
    let variant_line = agg
        .items
        .iter()
        .find(|i| i.variant_id == Some(variant))
        .unwrap();
    assert_eq!(variant_line.unit_price, 1300);
}

#[tokio::test]
async fn re_adding_a_removed_product_fetches_a_fresh_price() {
    let catalog = Arc::new(FakeCatalog::new());
    let store = Arc::new(FakeCouponStore::new(vec![]));
    let engine = engine_with(catalog.clone(), store);

    let product = Uuid::new_v4();
    catalog.set_price(product, None, 1000);

    let mut agg = empty_cart();
    engine.add_item(&mut agg, product, None, 1).await.unwrap();
    let item_id = agg.items[0].id;
    engine.remove_item(&mut agg, item_id).unwrap();

    catalog.set_price(product, None, 1200);
    engine.add_item(&mut agg, product, None, 1).await.unwrap();

    assert_eq!(agg.items[0].unit_price, 1200);
    assert_eq!(agg.cart.subtotal, 1200);
}

#[tokio::test]
async fn quantity_update_keeps_the_captured_price() {
    let catalog = Arc::new(FakeCatalog::new());
    let store = Arc::new(FakeCouponStore::new(vec![]));
    let engine = engine_with(catalog.clone(), store);

    let product = Uuid::new_v4();
    catalog.set_price(product, None, 1000);

    let mut agg = empty_cart();
    engine.add_item(&mut agg, product, None, 1).await.unwrap();

    // A later catalog change must not leak into the existing line.
    catalog.set_price(product, None, 9999);
    let item_id = agg.items[0].id;
    engine.update_item_quantity(&mut agg, item_id, 4).unwrap();

    assert_eq!(agg.items[0].unit_price, 1000);
    assert_eq!(agg.cart.subtotal, 4000);
}

#[tokio::test]
async fn non_positive_quantities_are_rejected() {
    let catalog = Arc::new(FakeCatalog::new());
    let store = Arc::new(FakeCouponStore::new(vec![]));
    let engine = engine_with(catalog.clone(), store);

    let product = Uuid::new_v4();
    catalog.set_price(product, None, 1000);

    let mut agg = empty_cart();
    assert!(matches!(
        engine.add_item(&mut agg, product, None, 0).await,
        Err(AppError::InvalidQuantity)
    ));
    assert!(matches!(
        engine.add_item(&mut agg, product, None, -3).await,
        Err(AppError::InvalidQuantity)
    ));

    engine.add_item(&mut agg, product, None, 1).await.unwrap();
    let item_id = agg.items[0].id;
    assert!(matches!(
        engine.update_item_quantity(&mut agg, item_id, 0),
        Err(AppError::InvalidQuantity)
    ));
    assert_eq!(agg.items[0].quantity, 1);
}

#[tokio::test]
async fn unknown_product_and_unknown_line_are_not_found() {
    let catalog = Arc::new(FakeCatalog::new());
    let store = Arc::new(FakeCouponStore::new(vec![]));
    let engine = engine_with(catalog, store);

    let mut agg = empty_cart();
    assert!(matches!(
        engine.add_item(&mut agg, Uuid::new_v4(), None, 1).await,
        Err(AppError::NotFound)
    ));
    assert!(matches!(
        engine.update_item_quantity(&mut agg, Uuid::new_v4(), 2),
        Err(AppError::NotFound)
    ));
    assert!(matches!(
        engine.remove_item(&mut agg, Uuid::new_v4()),
        Err(AppError::NotFound)
    ));
}

#[tokio::test]
async fn percentage_coupon_worked_example() {
    let catalog = Arc::new(FakeCatalog::new());
    let store = Arc::new(FakeCouponStore::new(vec![coupon("SAVE20", "percentage", 20)]));
    let engine = engine_with(catalog.clone(), store);

    let product = Uuid::new_v4();
    catalog.set_price(product, None, 5000);

    let mut agg = empty_cart();
    engine.add_item(&mut agg, product, None, 2).await.unwrap();
    assert_eq!(agg.cart.subtotal, 10_000);

    engine.apply_coupon(&mut agg, "SAVE20").await.unwrap();

    // 10000 is not strictly above the 10000 threshold, so shipping stays.
    assert_eq!(agg.cart.discount, 2000);
    assert_eq!(agg.cart.tax, 800);
    assert_eq!(agg.cart.shipping, 1000);
    assert_eq!(agg.cart.total, 9800);
    assert_consistent(&agg);
}

#[tokio::test]
async fn percentage_discount_respects_maximum_discount() {
    let catalog = Arc::new(FakeCatalog::new());
    let mut capped = coupon("SAVE20", "percentage", 20);
    capped.max_discount = Some(1500);
    let store = Arc::new(FakeCouponStore::new(vec![capped]));
    let engine = engine_with(catalog.clone(), store);

    let product = Uuid::new_v4();
    catalog.set_price(product, None, 5000);

    let mut agg = empty_cart();
    engine.add_item(&mut agg, product, None, 2).await.unwrap();
    engine.apply_coupon(&mut agg, "SAVE20").await.unwrap();

    assert_eq!(agg.cart.discount, 1500);
    assert_consistent(&agg);
}

#[tokio::test]
async fn percentage_discount_rescales_when_items_change() {
    let catalog = Arc::new(FakeCatalog::new());
    let store = Arc::new(FakeCouponStore::new(vec![coupon("SAVE20", "percentage", 20)]));
    let engine = engine_with(catalog.clone(), store);

    let product = Uuid::new_v4();
    catalog.set_price(product, None, 5000);

    let mut agg = empty_cart();
    engine.add_item(&mut agg, product, None, 2).await.unwrap();
    engine.apply_coupon(&mut agg, "SAVE20").await.unwrap();
    assert_eq!(agg.cart.discount, 2000);

    engine.add_item(&mut agg, product, None, 2).await.unwrap();
    assert_eq!(agg.cart.subtotal, 20_000);
    assert_eq!(agg.cart.discount, 4000);
    assert_consistent(&agg);
}

#[tokio::test]
async fn fixed_amount_discount_never_exceeds_subtotal() {
    let catalog = Arc::new(FakeCatalog::new());
    let store = Arc::new(FakeCouponStore::new(vec![coupon(
        "FIXED50",
        "fixed_amount",
        5000,
    )]));
    let engine = engine_with(catalog.clone(), store);

    let product = Uuid::new_v4();
    catalog.set_price(product, None, 3000);

    let mut agg = empty_cart();
    engine.add_item(&mut agg, product, None, 1).await.unwrap();
    engine.apply_coupon(&mut agg, "FIXED50").await.unwrap();

    assert_eq!(agg.cart.subtotal, 3000);
    assert_eq!(agg.cart.discount, 3000);
    assert_eq!(agg.cart.tax, 0);
    assert_eq!(agg.cart.shipping, 1000);
    assert_eq!(agg.cart.total, 1000);
    assert_consistent(&agg);
}

#[tokio::test]
async fn free_shipping_coupon_zeroes_the_shipping_line() {
    let catalog = Arc::new(FakeCatalog::new());
    let store = Arc::new(FakeCouponStore::new(vec![coupon(
        "FREESHIP",
        "free_shipping",
        0,
    )]));
    let engine = engine_with(catalog.clone(), store);

    let product = Uuid::new_v4();
    catalog.set_price(product, None, 3000);

    let mut agg = empty_cart();
    engine.add_item(&mut agg, product, None, 1).await.unwrap();
    engine.apply_coupon(&mut agg, "FREESHIP").await.unwrap();

    // The discount mirrors the fee the flat policy would have charged.
    assert_eq!(agg.cart.discount, 1000);
    assert_eq!(agg.cart.shipping, 0);
    assert_eq!(agg.cart.tax, 200);
    assert_consistent(&agg);
}

#[tokio::test]
async fn free_shipping_above_threshold_discounts_nothing() {
    let catalog = Arc::new(FakeCatalog::new());
    let store = Arc::new(FakeCouponStore::new(vec![coupon(
        "FREESHIP",
        "free_shipping",
        0,
    )]));
    let engine = engine_with(catalog.clone(), store);

    let product = Uuid::new_v4();
    catalog.set_price(product, None, 20_000);

    let mut agg = empty_cart();
    engine.add_item(&mut agg, product, None, 1).await.unwrap();
    engine.apply_coupon(&mut agg, "FREESHIP").await.unwrap();

    assert_eq!(agg.cart.discount, 0);
    assert_eq!(agg.cart.shipping, 0);
    assert_consistent(&agg);
}

#[tokio::test]
async fn clear_cart_resets_all_derived_amounts() {
    let catalog = Arc::new(FakeCatalog::new());
    let store = Arc::new(FakeCouponStore::new(vec![coupon("SAVE20", "percentage", 20)]));
    let engine = engine_with(catalog.clone(), store);

    let product = Uuid::new_v4();
    catalog.set_price(product, None, 5000);

    let mut agg = empty_cart();
    engine.add_item(&mut agg, product, None, 2).await.unwrap();
    engine.apply_coupon(&mut agg, "SAVE20").await.unwrap();

    engine.clear(&mut agg);

    assert!(agg.items.is_empty());
    assert!(agg.coupon.is_none());
    assert_eq!(agg.cart.coupon_code, None);
    assert_eq!(agg.cart.subtotal, 0);
    assert_eq!(agg.cart.discount, 0);
    assert_eq!(agg.cart.tax, 0);
    assert_eq!(agg.cart.shipping, 0);
    assert_eq!(agg.cart.total, 0);
}

#[tokio::test]
async fn removing_the_last_item_prices_the_cart_to_zero() {
    let catalog = Arc::new(FakeCatalog::new());
    let store = Arc::new(FakeCouponStore::new(vec![]));
    let engine = engine_with(catalog.clone(), store);

    let product = Uuid::new_v4();
    catalog.set_price(product, None, 5000);

    let mut agg = empty_cart();
    engine.add_item(&mut agg, product, None, 1).await.unwrap();
    let item_id = agg.items[0].id;
    engine.remove_item(&mut agg, item_id).unwrap();

    assert_eq!(agg.cart.shipping, 0);
    assert_eq!(agg.cart.total, 0);
    assert_consistent(&agg);
}

#[tokio::test]
async fn coupon_outside_active_window_is_rejected() {
    let catalog = Arc::new(FakeCatalog::new());
    let mut ended = coupon("ENDED", "percentage", 10);
    ended.ends_at = Some(Utc::now() - Duration::days(1));
    let mut not_started = coupon("SOON", "percentage", 10);
    not_started.starts_at = Some(Utc::now() + Duration::days(1));
    let mut disabled = coupon("OFF", "percentage", 10);
    disabled.active = false;
    let store = Arc::new(FakeCouponStore::new(vec![ended, not_started, disabled]));
    let engine = engine_with(catalog.clone(), store.clone());

    let product = Uuid::new_v4();
    catalog.set_price(product, None, 5000);

    let mut agg = empty_cart();
    engine.add_item(&mut agg, product, None, 1).await.unwrap();

    for code in ["ENDED", "SOON", "OFF"] {
        assert!(matches!(
            engine.apply_coupon(&mut agg, code).await,
            Err(AppError::CouponExpired)
        ));
        assert_eq!(store.usage_count(code), 0);
    }
    assert!(matches!(
        engine.apply_coupon(&mut agg, "NOPE").await,
        Err(AppError::NotFound)
    ));
}

#[tokio::test]
async fn minimum_purchase_is_enforced_against_subtotal() {
    let catalog = Arc::new(FakeCatalog::new());
    let mut picky = coupon("BIGSPEND", "percentage", 10);
    picky.min_purchase = Some(5000);
    let store = Arc::new(FakeCouponStore::new(vec![picky]));
    let engine = engine_with(catalog.clone(), store.clone());

    let product = Uuid::new_v4();
    catalog.set_price(product, None, 3000);

    let mut agg = empty_cart();
    engine.add_item(&mut agg, product, None, 1).await.unwrap();

    assert!(matches!(
        engine.apply_coupon(&mut agg, "BIGSPEND").await,
        Err(AppError::MinimumPurchaseNotMet)
    ));
    assert_eq!(store.usage_count("BIGSPEND"), 0);

    engine.add_item(&mut agg, product, None, 1).await.unwrap();
    engine.apply_coupon(&mut agg, "BIGSPEND").await.unwrap();
    assert_eq!(store.usage_count("BIGSPEND"), 1);
}

#[tokio::test]
async fn exhausted_coupon_is_rejected_before_redeeming() {
    let catalog = Arc::new(FakeCatalog::new());
    let mut spent = coupon("SPENT", "percentage", 10);
    spent.usage_limit = Some(3);
    spent.usage_count = 3;
    let store = Arc::new(FakeCouponStore::new(vec![spent]));
    let engine = engine_with(catalog.clone(), store.clone());

    let product = Uuid::new_v4();
    catalog.set_price(product, None, 3000);

    let mut agg = empty_cart();
    engine.add_item(&mut agg, product, None, 1).await.unwrap();

    assert!(matches!(
        engine.apply_coupon(&mut agg, "SPENT").await,
        Err(AppError::CouponLimitReached)
    ));
    assert_eq!(store.usage_count("SPENT"), 3);
}

#[tokio::test]
async fn concurrent_redemptions_cannot_oversell_a_limited_coupon() {
    let catalog = Arc::new(FakeCatalog::new());
    let mut limited = coupon("ONCE", "percentage", 10);
    limited.usage_limit = Some(1);
    let store = Arc::new(FakeCouponStore::new(vec![limited]));
    let engine = engine_with(catalog.clone(), store.clone());

    let product = Uuid::new_v4();
    catalog.set_price(product, None, 3000);

    let mut cart_a = empty_cart();
    let mut cart_b = empty_cart();
    engine.add_item(&mut cart_a, product, None, 1).await.unwrap();
    engine.add_item(&mut cart_b, product, None, 1).await.unwrap();

    let (first, second) = tokio::join!(
        engine.apply_coupon(&mut cart_a, "ONCE"),
        engine.apply_coupon(&mut cart_b, "ONCE"),
    );

    let successes = [&first, &second].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one redemption may win");
    assert!(
        matches!(first, Err(AppError::CouponLimitReached)) ^ matches!(second, Err(AppError::CouponLimitReached))
    );
    assert_eq!(store.usage_count("ONCE"), 1);
}

#[tokio::test]
async fn replacing_a_coupon_counts_a_new_redemption() {
    let catalog = Arc::new(FakeCatalog::new());
    let store = Arc::new(FakeCouponStore::new(vec![
        coupon("FIRST", "percentage", 10),
        coupon("SECOND", "percentage", 20),
    ]));
    let engine = engine_with(catalog.clone(), store.clone());

    let product = Uuid::new_v4();
    catalog.set_price(product, None, 5000);

    let mut agg = empty_cart();
    engine.add_item(&mut agg, product, None, 2).await.unwrap();

    engine.apply_coupon(&mut agg, "FIRST").await.unwrap();
    engine.apply_coupon(&mut agg, "SECOND").await.unwrap();

    assert_eq!(agg.cart.coupon_code.as_deref(), Some("SECOND"));
    assert_eq!(agg.cart.discount, 2000);
    // The first redemption stays consumed.
    assert_eq!(store.usage_count("FIRST"), 1);
    assert_eq!(store.usage_count("SECOND"), 1);
}

#[tokio::test]
async fn removing_a_coupon_clears_the_discount_but_not_the_redemption() {
    let catalog = Arc::new(FakeCatalog::new());
    let store = Arc::new(FakeCouponStore::new(vec![coupon("SAVE20", "percentage", 20)]));
    let engine = engine_with(catalog.clone(), store.clone());

    let product = Uuid::new_v4();
    catalog.set_price(product, None, 5000);

    let mut agg = empty_cart();
    engine.add_item(&mut agg, product, None, 2).await.unwrap();
    engine.apply_coupon(&mut agg, "SAVE20").await.unwrap();

    engine.remove_coupon(&mut agg);

    assert_eq!(agg.cart.coupon_code, None);
    assert_eq!(agg.cart.discount, 0);
    assert_consistent(&agg);
    assert_eq!(store.usage_count("SAVE20"), 1);

    // Re-applying consumes a second redemption from the pool.
    engine.apply_coupon(&mut agg, "SAVE20").await.unwrap();
    assert_eq!(store.usage_count("SAVE20"), 2);
}
