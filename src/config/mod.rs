use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub stripe: StripeConfig,
    #[serde(default)]
    pub booking: BookingConfig,
    #[serde(default)]
    pub cron: CronConfig,
    #[serde(default)]
    pub email: Option<EmailConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub base_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub session_duration_hours: i64,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StripeConfig {
    pub secret_key: Option<String>,
    pub webhook_secret: Option<String>,
    #[serde(default)]
    pub enabled: bool,
}

/// Booking policy knobs.
///
/// `hold_duration_minutes` bounds how long a pending reservation blocks the
/// calendar before payment completes. The sweeper interval (driven by the
/// external scheduler hitting /cron/expire-reservations) only affects how
/// long expired rows linger in the table: conflict detection ignores
/// expired-but-unswept holds, so correctness never depends on sweep cadence.
#[derive(Debug, Deserialize, Clone)]
pub struct BookingConfig {
    pub hold_duration_minutes: i64,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            hold_duration_minutes: 15,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct CronConfig {
    /// Bearer token the external scheduler must present. Sweeping is
    /// refused entirely (503) when unset.
    pub secret: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_username: String,
    pub smtp_password: String,
    pub from_address: String,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("database.max_connections", 10)?
            .set_default("auth.session_duration_hours", 24)?
            .set_default("stripe.enabled", false)?
            .set_default("booking.hold_duration_minutes", 15)?
            // Add config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Add environment variables (with FERMATA__ prefix, double underscore separates levels)
            .add_source(Environment::with_prefix("FERMATA").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                base_url: "http://localhost:8080".to_string(),
            },
            database: DatabaseConfig {
                url: "sqlite://fermata.db".to_string(),
                max_connections: 10,
            },
            auth: AuthConfig {
                session_duration_hours: 24,
            },
            stripe: StripeConfig {
                secret_key: None,
                webhook_secret: None,
                enabled: false,
            },
            booking: BookingConfig::default(),
            cron: CronConfig { secret: None },
            email: None,
        }
    }
}
