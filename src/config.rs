use std::env;

/// Knobs for the cart totals calculation. All amounts are in cents, the tax
/// rate is in basis points (1000 = 10%).
#[derive(Debug, Clone)]
pub struct PricingConfig {
    pub tax_rate_bps: i64,
    pub free_shipping_threshold: i64,
    pub shipping_fee: i64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            tax_rate_bps: 1000,
            free_shipping_threshold: 10_000,
            shipping_fee: 1000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub cart_ttl_days: i32,
    pub pricing: PricingConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);
        let cart_ttl_days = env::var("CART_TTL_DAYS")
            .ok()
            .and_then(|v| v.parse::<i32>().ok())
            .unwrap_or(30);

        let defaults = PricingConfig::default();
        let pricing = PricingConfig {
            tax_rate_bps: env_i64("TAX_RATE_BPS", defaults.tax_rate_bps),
            free_shipping_threshold: env_i64(
                "FREE_SHIPPING_THRESHOLD_CENTS",
                defaults.free_shipping_threshold,
            ),
            shipping_fee: env_i64("SHIPPING_FEE_CENTS", defaults.shipping_fee),
        };

        Ok(Self {
            database_url,
            host,
            port,
            cart_ttl_days,
            pricing,
        })
    }
}

fn env_i64(name: &str, default: i64) -> i64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(default)
}
