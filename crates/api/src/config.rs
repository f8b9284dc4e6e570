//! Configuration loaded once from the environment at startup

use std::env;

/// Minimum accepted length of `JWT_SECRET` in bytes
pub const MIN_JWT_SECRET_LEN: usize = 32;

/// Longest accepted session lifetime (one year)
pub const MAX_JWT_EXPIRY_HOURS: i64 = 24 * 365;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    /// Direct (non-pooled) URL used for migrations, if different
    pub database_direct_url: Option<String>,
    pub run_migrations: bool,
    pub bind_address: String,
    pub jwt_secret: String,
    pub jwt_expiry_hours: i64,
    /// Frontend page the activation email links to
    pub activation_url: String,
    pub resend_api_key: Option<String>,
    pub email_from: String,
    pub allowed_origins: Vec<String>,
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let jwt_secret = required("JWT_SECRET")?;
        if jwt_secret.len() < MIN_JWT_SECRET_LEN {
            return Err(ConfigError::Invalid {
                name: "JWT_SECRET",
                reason: format!("must be at least {} bytes", MIN_JWT_SECRET_LEN),
            });
        }

        let jwt_expiry_hours = match optional("JWT_EXPIRY_HOURS") {
            Some(raw) => raw
                .parse::<i64>()
                .ok()
                .filter(|h| (1..=MAX_JWT_EXPIRY_HOURS).contains(h))
                .ok_or_else(|| ConfigError::Invalid {
                    name: "JWT_EXPIRY_HOURS",
                    reason: format!(
                        "expected an integer between 1 and {}, got {:?}",
                        MAX_JWT_EXPIRY_HOURS, raw
                    ),
                })?,
            None => 24,
        };

        let run_migrations = match optional("RUN_MIGRATIONS") {
            Some(raw) => raw.parse::<bool>().map_err(|_| ConfigError::Invalid {
                name: "RUN_MIGRATIONS",
                reason: format!("expected true or false, got {:?}", raw),
            })?,
            None => true,
        };

        let allowed_origins = optional("ALLOWED_ORIGINS")
            .unwrap_or_else(|| "http://localhost:4200".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            database_direct_url: optional("DATABASE_DIRECT_URL"),
            run_migrations,
            bind_address: optional("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:8088".to_string()),
            jwt_secret,
            jwt_expiry_hours,
            activation_url: optional("ACTIVATION_URL")
                .unwrap_or_else(|| "http://localhost:4200/activate-account".to_string()),
            resend_api_key: optional("RESEND_API_KEY"),
            email_from: optional("EMAIL_FROM")
                .unwrap_or_else(|| "Bookish <no-reply@bookish.local>".to_string()),
            allowed_origins,
        })
    }
}
