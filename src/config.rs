use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub base_url: String,
    /// Default platform fee percentage for new merchants (e.g. 2.9).
    pub default_fee_percent: f64,
    /// Default fixed fee in the smallest currency unit (e.g. 30 = $0.30).
    pub default_fixed_fee: i64,
    /// Timeout for a single webhook delivery attempt.
    pub delivery_timeout: Duration,
    /// How often the expiry sweep looks for overdue pending payments.
    pub expiry_sweep_interval: Duration,
    pub dev_mode: bool,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("PAYLANE_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let base_url =
            env::var("BASE_URL").unwrap_or_else(|_| format!("http://{}:{}", host, port));

        let delivery_timeout_secs: u64 = env::var("WEBHOOK_DELIVERY_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        let expiry_sweep_secs: u64 = env::var("EXPIRY_SWEEP_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "paylane.db".to_string()),
            base_url,
            default_fee_percent: env::var("DEFAULT_FEE_PERCENT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(2.9),
            default_fixed_fee: env::var("DEFAULT_FIXED_FEE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            delivery_timeout: Duration::from_secs(delivery_timeout_secs),
            expiry_sweep_interval: Duration::from_secs(expiry_sweep_secs),
            dev_mode,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
