use async_trait::async_trait;
use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    db::DbPool,
    dto::coupons::{CouponList, CreateCouponRequest},
    entity::coupons::{ActiveModel as CouponActive, Column as CouponCol, Entity as Coupons,
        Model as CouponModel},
    error::{AppError, AppResult},
    middleware::auth::{Actor, ensure_admin},
    models::{Coupon, DiscountType},
    pricing::CouponStore,
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    state::AppState,
};

pub async fn create_coupon(
    state: &AppState,
    actor: &Actor,
    payload: CreateCouponRequest,
) -> AppResult<ApiResponse<Coupon>> {
    ensure_admin(actor)?;

    let code = payload.code.trim().to_string();
    if code.is_empty() {
        return Err(AppError::BadRequest("coupon code must not be empty".into()));
    }
    match payload.discount_type {
        DiscountType::Percentage => {
            if payload.value <= 0 || payload.value > 100 {
                return Err(AppError::BadRequest(
                    "percentage value must be between 1 and 100".into(),
                ));
            }
        }
        DiscountType::FixedAmount => {
            if payload.value <= 0 {
                return Err(AppError::BadRequest(
                    "fixed amount value must be greater than 0".into(),
                ));
            }
        }
        DiscountType::FreeShipping => {
            if payload.value < 0 {
                return Err(AppError::BadRequest("value must not be negative".into()));
            }
        }
    }
    if payload.min_purchase.is_some_and(|v| v <= 0)
        || payload.max_discount.is_some_and(|v| v <= 0)
        || payload.usage_limit.is_some_and(|v| v <= 0)
    {
        return Err(AppError::BadRequest(
            "thresholds and limits must be greater than 0".into(),
        ));
    }
    if let (Some(starts_at), Some(ends_at)) = (payload.starts_at, payload.ends_at) {
        if ends_at <= starts_at {
            return Err(AppError::BadRequest(
                "ends_at must be after starts_at".into(),
            ));
        }
    }

    let existing = Coupons::find()
        .filter(CouponCol::Code.eq(code.clone()))
        .one(&state.orm)
        .await?;
    if existing.is_some() {
        return Err(AppError::BadRequest("coupon code already exists".into()));
    }

    let active = CouponActive {
        id: Set(Uuid::new_v4()),
        code: Set(code),
        discount_type: Set(payload.discount_type.as_str().to_string()),
        value: Set(payload.value),
        min_purchase: Set(payload.min_purchase),
        max_discount: Set(payload.max_discount),
        usage_limit: Set(payload.usage_limit),
        usage_count: Set(0),
        starts_at: Set(payload.starts_at.map(Into::into)),
        ends_at: Set(payload.ends_at.map(Into::into)),
        active: Set(payload.active.unwrap_or(true)),
        created_at: NotSet,
    };
    let coupon = active.insert(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.pool,
        actor.user_id(),
        "coupon_create",
        Some("coupons"),
        Some(serde_json::json!({ "coupon_id": coupon.id, "code": coupon.code })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Coupon created",
        coupon_from_entity(coupon),
        Some(Meta::empty()),
    ))
}

pub async fn list_coupons(
    state: &AppState,
    actor: &Actor,
    pagination: Pagination,
) -> AppResult<ApiResponse<CouponList>> {
    ensure_admin(actor)?;
    let (page, limit, offset) = pagination.normalize();

    let finder = Coupons::find().order_by_desc(CouponCol::CreatedAt);
    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(coupon_from_entity)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success(
        "Coupons",
        CouponList { items },
        Some(meta),
    ))
}

/// Coupon Store collaborator backed by the coupons table. Redemption is a
/// single conditional UPDATE so the limit check and the increment cannot be
/// split by a concurrent redemption.
pub struct PgCouponStore {
    pool: DbPool,
}

impl PgCouponStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CouponStore for PgCouponStore {
    async fn find_by_code(&self, code: &str) -> AppResult<Coupon> {
        let coupon: Option<Coupon> = sqlx::query_as("SELECT * FROM coupons WHERE code = $1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        coupon.ok_or(AppError::NotFound)
    }

    async fn redeem(&self, coupon_id: Uuid) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE coupons
            SET usage_count = usage_count + 1
            WHERE id = $1
              AND active
              AND (usage_limit IS NULL OR usage_count < usage_limit)
            "#,
        )
        .bind(coupon_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::CouponLimitReached);
        }
        Ok(())
    }
}

fn coupon_from_entity(model: CouponModel) -> Coupon {
    Coupon {
        id: model.id,
        code: model.code,
        discount_type: model.discount_type,
        value: model.value,
        min_purchase: model.min_purchase,
        max_discount: model.max_discount,
        usage_limit: model.usage_limit,
        usage_count: model.usage_count,
        starts_at: model.starts_at.map(|dt| dt.with_timezone(&Utc)),
        ends_at: model.ends_at.map(|dt| dt.with_timezone(&Utc)),
        active: model.active,
        created_at: model.created_at.with_timezone(&Utc),
    }
}
