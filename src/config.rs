use std::env;

/// Per-IP rate limit settings for the public surface.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub strict_rpm: u32,
    pub standard_rpm: u32,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub base_url: String,
    /// Where the callback redirects buyers after the provider hands them back.
    pub success_page_url: String,
    pub payment_api_url: String,
    pub payment_api_key: String,
    pub payment_webhook_secret: String,
    pub rate_limit: RateLimitConfig,
    pub dev_mode: bool,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("GATEFLOW_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let base_url = env::var("BASE_URL")
            .unwrap_or_else(|_| format!("http://{}:{}", host, port));

        let rate_limit = RateLimitConfig {
            enabled: env::var("RATE_LIMIT")
                .map(|v| v != "off" && v != "false" && v != "0")
                .unwrap_or(true),
            strict_rpm: env::var("RATE_LIMIT_STRICT_RPM")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            standard_rpm: env::var("RATE_LIMIT_STANDARD_RPM")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
        };

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "gateflow.db".to_string()),
            success_page_url: env::var("SUCCESS_PAGE_URL")
                .unwrap_or_else(|_| format!("{}/thanks", base_url)),
            base_url,
            payment_api_url: env::var("PAYMENT_API_URL")
                .unwrap_or_else(|_| "https://api.stripe.com".to_string()),
            payment_api_key: env::var("PAYMENT_API_KEY").unwrap_or_default(),
            payment_webhook_secret: env::var("PAYMENT_WEBHOOK_SECRET").unwrap_or_default(),
            rate_limit,
            dev_mode,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
