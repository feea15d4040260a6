use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: Option<RedisConfig>,
    pub auth: AuthConfig,
    pub payments: PaymentsConfig,
    #[serde(default)]
    pub booking_rules: BookingRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Base used for the gateway success/fail redirect URLs.
    pub public_base_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 20 }

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaymentsConfig {
    /// Without a secret key the engine runs in gateway test mode.
    pub gateway_secret_key: Option<String>,
    #[serde(default = "default_gateway_base_url")]
    pub gateway_base_url: String,
    /// Shared secret for webhook signatures. Unset disables verification.
    pub webhook_secret: Option<String>,
    #[serde(default = "default_dedup_retention")]
    pub dedup_retention_seconds: u64,
}

fn default_gateway_base_url() -> String { "https://api.tosspayments.com".to_string() }
fn default_dedup_retention() -> u64 { 3600 }

#[derive(Debug, Deserialize, Clone)]
pub struct BookingRules {
    #[serde(default = "default_cascade_sweep")]
    pub cascade_sweep_seconds: u64,
}

impl Default for BookingRules {
    fn default() -> Self {
        Self { cascade_sweep_seconds: default_cascade_sweep() }
    }
}

fn default_cascade_sweep() -> u64 { 300 }

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `TRIPCAR__PAYMENTS__WEBHOOK_SECRET=...`
            .add_source(config::Environment::with_prefix("TRIPCAR").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
