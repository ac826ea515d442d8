use omniport_core::retry::RetryPolicy;
use omniport_core::EngineConfig;
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub redis: Option<RedisConfig>,
    pub kafka: Option<KafkaConfig>,
    pub auth: AuthConfig,
    #[serde(default)]
    pub engine: EngineRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EngineRules {
    #[serde(default = "default_pin_length")]
    pub pin_length: usize,
    /// Minutes east of UTC; decides what "today" means for boarding.
    #[serde(default = "default_offset_minutes")]
    pub service_utc_offset_minutes: i32,
    #[serde(default = "default_max_seats")]
    pub max_seats_per_booking: i32,
    #[serde(default = "default_retry_attempts")]
    pub retry_max_attempts: usize,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: i64,
}

fn default_pin_length() -> usize { 4 }
fn default_offset_minutes() -> i32 { 0 }
fn default_max_seats() -> i32 { 1 }
fn default_retry_attempts() -> usize { 3 }
fn default_rate_limit() -> i64 { 120 }

impl Default for EngineRules {
    fn default() -> Self {
        Self {
            pin_length: default_pin_length(),
            service_utc_offset_minutes: default_offset_minutes(),
            max_seats_per_booking: default_max_seats(),
            retry_max_attempts: default_retry_attempts(),
            rate_limit_per_minute: default_rate_limit(),
        }
    }
}

impl EngineRules {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            pin_length: self.pin_length,
            max_seats_per_booking: self.max_seats_per_booking,
            retry: RetryPolicy::default().with_max_retries(self.retry_max_attempts),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// Unset runs the engine on the in-memory store.
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 10 }

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Optional per-environment overrides
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(config::File::with_name("config/local").required(false))
            // `OMNIPORT_DATABASE__URL=...` sets `database.url`
            .add_source(config::Environment::with_prefix("OMNIPORT").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> Config {
        config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_minimal_config_uses_engine_defaults() {
        let cfg = parse(
            r#"
            [server]
            port = 3000
            [auth]
            jwt_secret = "secret"
            "#,
        );
        assert!(cfg.database.url.is_none());
        assert!(cfg.redis.is_none());
        assert!(cfg.kafka.is_none());
        assert_eq!(cfg.engine.pin_length, 4);
        assert_eq!(cfg.engine.service_utc_offset_minutes, 0);

        let engine = cfg.engine.engine_config();
        assert_eq!(engine.max_seats_per_booking, 1);
        assert_eq!(engine.retry.max_retries, 3);
    }

    #[test]
    fn test_engine_rules_override() {
        let cfg = parse(
            r#"
            [server]
            port = 8080
            [database]
            url = "postgres://localhost/omniport"
            [redis]
            url = "redis://127.0.0.1:6379"
            [auth]
            jwt_secret = "secret"
            [engine]
            pin_length = 6
            max_seats_per_booking = 4
            "#,
        );
        assert_eq!(cfg.database.max_connections, 10);
        assert_eq!(cfg.redis.map(|r| r.url).as_deref(), Some("redis://127.0.0.1:6379"));
        assert_eq!(cfg.engine.pin_length, 6);
        assert_eq!(cfg.engine.engine_config().max_seats_per_booking, 4);
        assert_eq!(cfg.engine.rate_limit_per_minute, 120);
    }
}
