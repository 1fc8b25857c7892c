use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;

use souq_cart::models::CartCharges;
use souq_order::payouts::PayoutRates;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub auth: AuthConfig,
    pub gateway: GatewayConfig,
    pub business_rules: BusinessRules,
    /// Admin directory for notification broadcast; externally managed in
    /// multi-tenant deployments
    #[serde(default)]
    pub admins: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub store_id: String,
    pub signature_key: String,
    #[serde(default = "default_gateway_timeout")]
    pub timeout_seconds: u64,
}

fn default_gateway_timeout() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    pub tax_rate: f64,
    pub service_charge_rate: f64,
    pub free_shipping_threshold: f64,
    pub flat_shipping_fee: f64,
    pub commission_rate: f64,
    pub vendor_service_charge_rate: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    "BDT".to_string()
}

impl BusinessRules {
    pub fn cart_charges(&self) -> CartCharges {
        let defaults = CartCharges::default();
        CartCharges {
            tax_rate: to_decimal(self.tax_rate, defaults.tax_rate),
            service_charge_rate: to_decimal(self.service_charge_rate, defaults.service_charge_rate),
            free_shipping_threshold: to_decimal(
                self.free_shipping_threshold,
                defaults.free_shipping_threshold,
            ),
            flat_shipping_fee: to_decimal(self.flat_shipping_fee, defaults.flat_shipping_fee),
        }
    }

    pub fn payout_rates(&self) -> PayoutRates {
        let defaults = PayoutRates::default();
        PayoutRates {
            commission_rate: to_decimal(self.commission_rate, defaults.commission_rate),
            service_charge_rate: to_decimal(
                self.vendor_service_charge_rate,
                defaults.service_charge_rate,
            ),
        }
    }
}

fn to_decimal(value: f64, fallback: Decimal) -> Decimal {
    Decimal::try_from(value).unwrap_or(fallback)
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            // Start off by merging in the "default" configuration file
            .add_source(config::File::with_name("config/default"))
            // Add in the current environment file
            // Default to 'development' env
            // Note that this file is _optional_
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add in a local configuration file
            // This file shouldn't be checked in to git
            .add_source(config::File::with_name("config/local").required(false))
            // Add in settings from the environment (with a prefix of SOUQ)
            // Eg.. `SOUQ__SERVER__PORT=8080` would set the server port
            .add_source(config::Environment::with_prefix("SOUQ").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
