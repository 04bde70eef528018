use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::cart::{AddItemRequest, ApplyCouponRequest, CartDto, UpdateQuantityRequest},
    error::{AppError, AppResult},
    middleware::auth::{Actor, ActorId},
    models::{Cart, CartItem, Coupon},
    pricing::CartAggregate,
    response::{ApiResponse, Meta},
    state::AppState,
};

pub async fn get_cart(state: &AppState, actor: &Actor) -> AppResult<ApiResponse<CartDto>> {
    let agg = load_or_create(state, actor).await?;
    Ok(ApiResponse::success(
        "OK",
        CartDto::from_aggregate(&agg),
        Some(Meta::empty()),
    ))
}

pub async fn add_item(
    state: &AppState,
    actor: &Actor,
    payload: AddItemRequest,
) -> AppResult<ApiResponse<CartDto>> {
    let mut agg = load_or_create(state, actor).await?;

    state
        .engine
        .add_item(&mut agg, payload.product_id, payload.variant_id, payload.quantity)
        .await?;

    // The engine merged into an existing line or pushed a new one; either
    // way exactly one line matches the (product, variant) pair now.
    let item = agg
        .items
        .iter()
        .find(|item| item.product_id == payload.product_id && item.variant_id == payload.variant_id)
        .ok_or(AppError::NotFound)?;

    let mut tx = state.pool.begin().await?;
    sqlx::query(
        r#"
        INSERT INTO cart_items (id, cart_id, product_id, variant_id, quantity, unit_price)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (cart_id, product_id, variant_id)
        DO UPDATE SET quantity = EXCLUDED.quantity
        "#,
    )
    .bind(item.id)
    .bind(item.cart_id)
    .bind(item.product_id)
    .bind(item.variant_id)
    .bind(item.quantity)
    .bind(item.unit_price)
    .execute(&mut *tx)
    .await?;
    write_totals(&mut tx, &agg.cart).await?;
    tx.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        actor.user_id(),
        "cart_item_add",
        Some("cart_items"),
        Some(serde_json::json!({
            "cart_id": agg.cart.id,
            "product_id": payload.product_id,
            "variant_id": payload.variant_id,
            "quantity": payload.quantity,
        })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Added to cart",
        CartDto::from_aggregate(&agg),
        Some(Meta::empty()),
    ))
}

pub async fn update_item(
    state: &AppState,
    actor: &Actor,
    item_id: Uuid,
    payload: UpdateQuantityRequest,
) -> AppResult<ApiResponse<CartDto>> {
    let mut agg = load_or_create(state, actor).await?;

    state
        .engine
        .update_item_quantity(&mut agg, item_id, payload.quantity)?;

    let mut tx = state.pool.begin().await?;
    let result = sqlx::query("UPDATE cart_items SET quantity = $3 WHERE id = $1 AND cart_id = $2")
        .bind(item_id)
        .bind(agg.cart.id)
        .bind(payload.quantity)
        .execute(&mut *tx)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }
    write_totals(&mut tx, &agg.cart).await?;
    tx.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        actor.user_id(),
        "cart_item_update",
        Some("cart_items"),
        Some(serde_json::json!({
            "cart_id": agg.cart.id,
            "item_id": item_id,
            "quantity": payload.quantity,
        })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Quantity updated",
        CartDto::from_aggregate(&agg),
        Some(Meta::empty()),
    ))
}

pub async fn remove_item(
    state: &AppState,
    actor: &Actor,
    item_id: Uuid,
) -> AppResult<ApiResponse<CartDto>> {
    let mut agg = load_or_create(state, actor).await?;

    state.engine.remove_item(&mut agg, item_id)?;

    let mut tx = state.pool.begin().await?;
    sqlx::query("DELETE FROM cart_items WHERE id = $1 AND cart_id = $2")
        .bind(item_id)
        .bind(agg.cart.id)
        .execute(&mut *tx)
        .await?;
    write_totals(&mut tx, &agg.cart).await?;
    tx.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        actor.user_id(),
        "cart_item_remove",
        Some("cart_items"),
        Some(serde_json::json!({ "cart_id": agg.cart.id, "item_id": item_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Removed from cart",
        CartDto::from_aggregate(&agg),
        Some(Meta::empty()),
    ))
}

pub async fn clear_cart(state: &AppState, actor: &Actor) -> AppResult<ApiResponse<CartDto>> {
    let mut agg = load_or_create(state, actor).await?;

    state.engine.clear(&mut agg);

    let mut tx = state.pool.begin().await?;
    sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
        .bind(agg.cart.id)
        .execute(&mut *tx)
        .await?;
    write_totals(&mut tx, &agg.cart).await?;
    tx.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        actor.user_id(),
        "cart_clear",
        Some("carts"),
        Some(serde_json::json!({ "cart_id": agg.cart.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Cart cleared",
        CartDto::from_aggregate(&agg),
        Some(Meta::empty()),
    ))
}

pub async fn apply_coupon(
    state: &AppState,
    actor: &Actor,
    payload: ApplyCouponRequest,
) -> AppResult<ApiResponse<CartDto>> {
    let mut agg = load_or_create(state, actor).await?;

    state.engine.apply_coupon(&mut agg, &payload.code).await?;

    let mut tx = state.pool.begin().await?;
    write_totals(&mut tx, &agg.cart).await?;
    tx.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        actor.user_id(),
        "cart_coupon_apply",
        Some("carts"),
        Some(serde_json::json!({ "cart_id": agg.cart.id, "code": payload.code })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Coupon applied",
        CartDto::from_aggregate(&agg),
        Some(Meta::empty()),
    ))
}

pub async fn remove_coupon(state: &AppState, actor: &Actor) -> AppResult<ApiResponse<CartDto>> {
    let mut agg = load_or_create(state, actor).await?;

    let removed = agg.cart.coupon_code.clone();
    state.engine.remove_coupon(&mut agg);

    let mut tx = state.pool.begin().await?;
    write_totals(&mut tx, &agg.cart).await?;
    tx.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        actor.user_id(),
        "cart_coupon_remove",
        Some("carts"),
        Some(serde_json::json!({ "cart_id": agg.cart.id, "code": removed })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Coupon removed",
        CartDto::from_aggregate(&agg),
        Some(Meta::empty()),
    ))
}

/// Fetch the actor's latest unexpired cart with its items and coupon
/// snapshot, creating an empty cart when none exists.
async fn load_or_create(state: &AppState, actor: &Actor) -> AppResult<CartAggregate> {
    let existing: Option<Cart> = match actor.id {
        ActorId::User(user_id) => {
            sqlx::query_as(
                r#"
                SELECT * FROM carts
                WHERE user_id = $1 AND expires_at > now()
                ORDER BY created_at DESC
                LIMIT 1
                "#,
            )
            .bind(user_id)
            .fetch_optional(&state.pool)
            .await?
        }
        ActorId::Session(session_id) => {
            sqlx::query_as(
                r#"
                SELECT * FROM carts
                WHERE session_id = $1 AND expires_at > now()
                ORDER BY created_at DESC
                LIMIT 1
                "#,
            )
            .bind(session_id)
            .fetch_optional(&state.pool)
            .await?
        }
    };

    let cart = match existing {
        Some(cart) => cart,
        None => create_cart(state, actor).await?,
    };

    let items: Vec<CartItem> =
        sqlx::query_as("SELECT * FROM cart_items WHERE cart_id = $1 ORDER BY created_at ASC")
            .bind(cart.id)
            .fetch_all(&state.pool)
            .await?;

    let coupon: Option<Coupon> = match cart.coupon_code.as_deref() {
        Some(code) => {
            let row: Option<Coupon> = sqlx::query_as("SELECT * FROM coupons WHERE code = $1")
                .bind(code)
                .fetch_optional(&state.pool)
                .await?;
            if row.is_none() {
                tracing::warn!(code, cart_id = %cart.id, "applied coupon no longer exists");
            }
            row
        }
        None => None,
    };

    CartAggregate::new(cart, items, coupon)
}

async fn create_cart(state: &AppState, actor: &Actor) -> AppResult<Cart> {
    let (user_id, session_id) = match actor.id {
        ActorId::User(id) => (Some(id), None),
        ActorId::Session(id) => (None, Some(id)),
    };

    let cart: Cart = sqlx::query_as(
        r#"
        INSERT INTO carts (id, user_id, session_id, expires_at)
        VALUES ($1, $2, $3, now() + make_interval(days => $4))
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(session_id)
    .bind(state.config.cart_ttl_days)
    .fetch_one(&state.pool)
    .await?;

    Ok(cart)
}

async fn write_totals(tx: &mut Transaction<'_, Postgres>, cart: &Cart) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE carts
        SET subtotal = $2, discount = $3, tax = $4, shipping = $5, total = $6,
            coupon_code = $7, currency = $8, updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(cart.id)
    .bind(cart.subtotal)
    .bind(cart.discount)
    .bind(cart.tax)
    .bind(cart.shipping)
    .bind(cart.total)
    .bind(cart.coupon_code.as_deref())
    .bind(&cart.currency)
    .execute(&mut **tx)
    .await?;

    Ok(())
}
