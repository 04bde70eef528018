use std::sync::Arc;

use crate::{
    config::AppConfig,
    db::{DbPool, OrmConn},
    pricing::PricingEngine,
    services::{coupon_service::PgCouponStore, product_service::OrmCatalog},
};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub orm: OrmConn,
    pub config: AppConfig,
    pub engine: PricingEngine,
}

impl AppState {
    pub fn new(pool: DbPool, orm: OrmConn, config: AppConfig) -> Self {
        let engine = PricingEngine::new(
            Arc::new(OrmCatalog::new(orm.clone())),
            Arc::new(PgCouponStore::new(pool.clone())),
            config.pricing.clone(),
        );
        Self {
            pool,
            orm,
            config,
            engine,
        }
    }
}
