use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::lock::LockSettings;
use crate::resilience::BreakerConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub redis_url: String,
    /// Stable name of this instance inside each consumer group.
    pub consumer_name: String,
    pub callback_prefix: String,
    pub gateway_a_url: String,
    pub gateway_a_deposit_path: String,
    pub gateway_a_withdraw_path: String,
    pub gateway_b_url: String,
    pub transaction_topic: String,
    pub callback_topic: String,
    pub dispatcher_topic: String,
    pub gateway_timeout: Duration,
    pub max_concurrent_requests: usize,
    pub error_percent_threshold: u8,
    pub circuit_sleep_window: Duration,
    pub circuit_rolling_window: Duration,
    pub circuit_request_volume_threshold: u32,
    pub max_gateway_retries: u32,
    pub backoff_base: Duration,
    pub lock_ttl: Duration,
    pub lock_acquire_timeout: Duration,
    pub lock_retry_delay: Duration,
    pub dispatch_signing_secret: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok(); // Load .env file if present
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let error_percent_threshold: u8 = parse(&lookup, "ERROR_PERCENT_THRESHOLD", 25)?;
        if !(1..=100).contains(&error_percent_threshold) {
            anyhow::bail!("ERROR_PERCENT_THRESHOLD must be between 1 and 100");
        }

        Ok(Config {
            server_port: parse(&lookup, "SERVER_PORT", 8080)?,
            database_url: lookup("DATABASE_URL").context("DATABASE_URL must be set")?,
            redis_url: text("REDIS_URL", "redis://127.0.0.1:6379"),
            consumer_name: lookup("CONSUMER_NAME")
                .or_else(|| lookup("HOSTNAME"))
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| "settlement-core".to_string()),
            callback_prefix: text("API_CALLBACK_PREFIX", "http://localhost:8080/callback"),
            gateway_a_url: text("GATEWAY_A_URL", "http://gateway.com"),
            gateway_a_deposit_path: text("GATEWAY_A_DEPOSIT_PATH", "/deposit"),
            gateway_a_withdraw_path: text("GATEWAY_A_WITHDRAW_PATH", "/withdraw"),
            gateway_b_url: text("GATEWAY_B_URL", "http://gatewayb.com"),
            transaction_topic: text("TRANSACTION_TOPIC", "transactions"),
            callback_topic: text("CALLBACK_TOPIC", "callbacks"),
            dispatcher_topic: text("DISPATCHER_TOPIC", "dispatch"),
            gateway_timeout: millis(&lookup, "GATEWAY_TIMEOUT_MS", 1000)?,
            max_concurrent_requests: parse(&lookup, "MAX_CONCURRENT_REQUESTS", 100)?,
            error_percent_threshold,
            circuit_sleep_window: millis(&lookup, "CIRCUIT_SLEEP_WINDOW_MS", 5000)?,
            circuit_rolling_window: millis(&lookup, "CIRCUIT_ROLLING_WINDOW_MS", 10_000)?,
            circuit_request_volume_threshold: parse(
                &lookup,
                "CIRCUIT_REQUEST_VOLUME_THRESHOLD",
                20,
            )?,
            max_gateway_retries: parse(&lookup, "MAX_GATEWAY_RETRIES", 4)?,
            backoff_base: millis(&lookup, "BACKOFF_BASE_MS", 1000)?,
            lock_ttl: millis(&lookup, "LOCK_TTL_MS", 8000)?,
            lock_acquire_timeout: millis(&lookup, "LOCK_ACQUIRE_TIMEOUT_MS", 5000)?,
            lock_retry_delay: millis(&lookup, "LOCK_RETRY_DELAY_MS", 50)?,
            dispatch_signing_secret: lookup("DISPATCH_SIGNING_SECRET").filter(|s| !s.is_empty()),
        })
    }

    pub fn breaker_config(&self) -> BreakerConfig {
        BreakerConfig {
            timeout: self.gateway_timeout,
            max_concurrent_requests: self.max_concurrent_requests,
            error_percent_threshold: self.error_percent_threshold,
            request_volume_threshold: self.circuit_request_volume_threshold,
            rolling_window: self.circuit_rolling_window,
            sleep_window: self.circuit_sleep_window,
        }
    }

    pub fn lock_settings(&self) -> LockSettings {
        LockSettings {
            ttl: self.lock_ttl,
            acquire_timeout: self.lock_acquire_timeout,
            retry_delay: self.lock_retry_delay,
        }
    }
}

fn parse<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value '{}'", key, raw)),
        None => Ok(default),
    }
}

fn millis<F>(lookup: &F, key: &str, default: u64) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    parse(lookup, key, default).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[("DATABASE_URL", "postgres://localhost/payments")]).unwrap();

        assert_eq!(config.server_port, 8080);
        assert_eq!(config.redis_url, "redis://127.0.0.1:6379");
        assert_eq!(config.callback_prefix, "http://localhost:8080/callback");
        assert_eq!(config.transaction_topic, "transactions");
        assert_eq!(config.callback_topic, "callbacks");
        assert_eq!(config.dispatcher_topic, "dispatch");
        assert_eq!(config.max_gateway_retries, 4);
        assert_eq!(config.backoff_base, Duration::from_secs(1));
        assert_eq!(config.error_percent_threshold, 25);
        assert!(config.dispatch_signing_secret.is_none());
        assert_eq!(config.consumer_name, "settlement-core");
    }

    #[test]
    fn test_consumer_name_falls_back_to_hostname() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://localhost/payments"),
            ("HOSTNAME", "worker-7"),
        ])
        .unwrap();
        assert_eq!(config.consumer_name, "worker-7");

        let config = config_from(&[
            ("DATABASE_URL", "postgres://localhost/payments"),
            ("HOSTNAME", "worker-7"),
            ("CONSUMER_NAME", "processor-a"),
        ])
        .unwrap();
        assert_eq!(config.consumer_name, "processor-a");
    }

    #[test]
    fn test_missing_database_url() {
        assert!(config_from(&[]).is_err());
    }

    #[test]
    fn test_invalid_number() {
        let result = config_from(&[
            ("DATABASE_URL", "postgres://localhost/payments"),
            ("GATEWAY_TIMEOUT_MS", "soon"),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_threshold_range() {
        for bad in ["0", "101"] {
            let result = config_from(&[
                ("DATABASE_URL", "postgres://localhost/payments"),
                ("ERROR_PERCENT_THRESHOLD", bad),
            ]);
            assert!(result.is_err(), "{} should be rejected", bad);
        }
    }

    #[test]
    fn test_breaker_and_lock_settings() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://localhost/payments"),
            ("GATEWAY_TIMEOUT_MS", "250"),
            ("MAX_CONCURRENT_REQUESTS", "5"),
            ("LOCK_TTL_MS", "3000"),
            ("DISPATCH_SIGNING_SECRET", "s3cret"),
        ])
        .unwrap();

        let breaker = config.breaker_config();
        assert_eq!(breaker.timeout, Duration::from_millis(250));
        assert_eq!(breaker.max_concurrent_requests, 5);
        assert_eq!(config.lock_settings().ttl, Duration::from_secs(3));
        assert_eq!(config.dispatch_signing_secret.as_deref(), Some("s3cret"));
    }
}
