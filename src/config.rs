use std::env;

/// Which energy billing strategy prices meter readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnergyBillingMode {
    Metered,
    AllowanceCredit,
}

impl EnergyBillingMode {
    fn from_env(value: Option<String>) -> Self {
        match value
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .to_ascii_lowercase()
            .as_str()
        {
            "allowance" | "allowance_credit" => Self::AllowanceCredit,
            _ => Self::Metered,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Metered => "metered",
            Self::AllowanceCredit => "allowance",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub app_name: String,
    pub environment: String,
    pub host: String,
    pub port: u16,
    pub database_url: Option<String>,
    pub db_pool_max_connections: u32,
    pub energy_billing_mode: EnergyBillingMode,
    pub pix_key: String,
    pub pix_merchant_name: String,
    pub pix_merchant_city: String,
    pub admin_email: Option<String>,
    pub scheduler_enabled: bool,
    pub daily_jobs_hour_utc: u32,
    pub pix_cache_ttl_seconds: u64,
    pub pix_cache_max_entries: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            app_name: env_or("APP_NAME", "Flat Lease Billing"),
            environment: env_or("ENVIRONMENT", "development"),
            host: env_or("HOST", "0.0.0.0"),
            port: env_parse_or("PORT", 8080),
            database_url: env_opt("DATABASE_URL"),
            db_pool_max_connections: env_parse_or("DB_POOL_MAX_CONNECTIONS", 5),
            energy_billing_mode: EnergyBillingMode::from_env(env_opt("ENERGY_BILLING_MODE")),
            pix_key: env_or("PIX_KEY", ""),
            pix_merchant_name: env_or("PIX_MERCHANT_NAME", "FLAT FERSA"),
            pix_merchant_city: env_or("PIX_MERCHANT_CITY", "SAO PAULO"),
            admin_email: env_opt("ADMIN_EMAIL"),
            scheduler_enabled: env_parse_bool_or("SCHEDULER_ENABLED", true),
            daily_jobs_hour_utc: env_parse_or("DAILY_JOBS_HOUR_UTC", 3).min(23),
            pix_cache_ttl_seconds: env_parse_or("PIX_CACHE_TTL_SECONDS", 15 * 60),
            pix_cache_max_entries: env_parse_or("PIX_CACHE_MAX_ENTRIES", 1000),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.trim().eq_ignore_ascii_case("production")
    }
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    env_opt(key).unwrap_or_else(|| default.to_string())
}

fn env_parse_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    env_opt(key)
        .and_then(|raw| raw.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_parse_bool_or(key: &str, default: bool) -> bool {
    parse_bool(env_opt(key).as_deref()).unwrap_or(default)
}

fn parse_bool(raw: Option<&str>) -> Option<bool> {
    match raw.map(str::to_ascii_lowercase).as_deref() {
        Some("1" | "true" | "yes" | "on") => Some(true),
        Some("0" | "false" | "no" | "off") => Some(false),
        _ => None,
    }
}
