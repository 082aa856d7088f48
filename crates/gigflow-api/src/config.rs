//! # Service Configuration
//!
//! Read once at startup from the process environment. Secrets are held in
//! fields with redacted `Debug` output.

use thiserror::Error;

/// Hosted checkout used when `PAYMENT_PROCESS_URL` is unset.
pub const DEFAULT_PROCESS_URL: &str = "https://sandbox.payfast.co.za/eng/process";

/// Error loading configuration.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Payment processor settings.
#[derive(Clone)]
pub struct PaymentConfig {
    pub merchant_id: String,
    /// Shared HMAC secret for checkout forms and callbacks.
    pub secret: String,
    pub process_url: String,
}

impl std::fmt::Debug for PaymentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentConfig")
            .field("merchant_id", &self.merchant_id)
            .field("secret", &"[REDACTED]")
            .field("process_url", &self.process_url)
            .finish()
    }
}

/// Application configuration.
#[derive(Clone)]
pub struct AppConfig {
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Shared bearer secret. `None` disables the secret check.
    pub auth_token: Option<String>,
    /// PostgreSQL URL. `None` runs on the in-memory ledger.
    pub database_url: Option<String>,
    pub payment: PaymentConfig,
    /// Base for the return, cancel and notify URLs.
    pub public_base_url: String,
    pub log_format: LogFormat,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .field("database_url", &self.database_url.as_ref().map(|_| "[REDACTED]"))
            .field("payment", &self.payment)
            .field("public_base_url", &self.public_base_url)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl AppConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let port = match get("PORT") {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
                name: "PORT",
                value: raw,
            })?,
            None => 8080,
        };
        let log_format = match get("LOG_FORMAT").as_deref().map(str::trim) {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "LOG_FORMAT",
                    value: other.to_string(),
                })
            }
        };
        let payment = PaymentConfig {
            merchant_id: get("PAYMENT_MERCHANT_ID").ok_or(ConfigError::Missing("PAYMENT_MERCHANT_ID"))?,
            secret: get("PAYMENT_SECRET").ok_or(ConfigError::Missing("PAYMENT_SECRET"))?,
            process_url: get("PAYMENT_PROCESS_URL").unwrap_or_else(|| DEFAULT_PROCESS_URL.to_string()),
        };

        Ok(Self {
            port,
            auth_token: get("AUTH_TOKEN"),
            database_url: get("DATABASE_URL"),
            payment,
            public_base_url: get("PUBLIC_BASE_URL")
                .unwrap_or_else(|| format!("http://localhost:{port}")),
            log_format,
        })
    }

    /// Configuration for tests and local runs.
    pub fn local(payment_secret: impl Into<String>) -> Self {
        Self {
            port: 8080,
            auth_token: None,
            database_url: None,
            payment: PaymentConfig {
                merchant_id: "10000100".to_string(),
                secret: payment_secret.into(),
                process_url: DEFAULT_PROCESS_URL.to_string(),
            },
            public_base_url: "http://localhost:8080".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}
