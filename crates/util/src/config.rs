use std::{env, fmt, net::SocketAddr, time::Duration};

use super::{database_url, server_bind_address};

const DEV_TOKEN_SECRET: &str = "aqua-talent-development-secret";
const DEFAULT_TOKEN_TTL_SECS: u64 = 86_400;
const MIN_TOKEN_SECRET_LEN: usize = 16;

/// Application runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    fn from_str(value: &str) -> Result<Self, ConfigError> {
        match value {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(ConfigError::InvalidEnvironment(other.to_string())),
        }
    }

    /// Returns `true` when the current environment should behave as development.
    pub fn is_development(self) -> bool {
        matches!(self, Self::Development)
    }

    /// Returns the canonical name used for logging/metrics labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }
}

/// Credentials for the administrator account ensured at startup.
#[derive(Clone)]
pub struct AdminBootstrap {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for AdminBootstrap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminBootstrap")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Runtime configuration resolved from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub environment: Environment,
    pub database_url: String,
    pub token_secret: Vec<u8>,
    pub token_ttl: Duration,
    pub admin: Option<AdminBootstrap>,
}

impl AppConfig {
    /// Constructs the configuration by reading and validating environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_value = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let environment = Environment::from_str(&env_value)?;
        let bind_addr = server_bind_address().map_err(ConfigError::BindAddress)?;

        let token_secret = match env::var("AUTH_TOKEN_SECRET") {
            Ok(value) if value.len() >= MIN_TOKEN_SECRET_LEN => value.into_bytes(),
            Ok(_) => return Err(ConfigError::WeakTokenSecret),
            Err(_) if environment == Environment::Production => {
                return Err(ConfigError::MissingVar("AUTH_TOKEN_SECRET"))
            }
            Err(_) => DEV_TOKEN_SECRET.as_bytes().to_vec(),
        };

        let token_ttl = match env::var("AUTH_TOKEN_TTL_SECS") {
            Ok(raw) => {
                let secs = raw
                    .parse::<u64>()
                    .ok()
                    .filter(|secs| *secs > 0)
                    .ok_or_else(|| ConfigError::InvalidTokenTtl(raw.clone()))?;
                Duration::from_secs(secs)
            }
            Err(_) => Duration::from_secs(DEFAULT_TOKEN_TTL_SECS),
        };

        let admin = match (env::var("ADMIN_EMAIL"), env::var("ADMIN_PASSWORD")) {
            (Ok(email), Ok(password)) if !email.trim().is_empty() && !password.is_empty() => {
                Some(AdminBootstrap {
                    email: email.trim().to_lowercase(),
                    password,
                })
            }
            (Err(_), Err(_)) => None,
            _ => return Err(ConfigError::IncompleteAdmin),
        };

        Ok(Self {
            bind_addr,
            environment,
            database_url: database_url(),
            token_secret,
            token_ttl,
            admin,
        })
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    InvalidEnvironment(String),
    BindAddress(std::net::AddrParseError),
    MissingVar(&'static str),
    WeakTokenSecret,
    InvalidTokenTtl(String),
    IncompleteAdmin,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEnvironment(value) => write!(
                f,
                "APP_ENV must be one of 'development', 'production', or 'test' (got {value})"
            ),
            Self::BindAddress(err) => write!(f, "invalid APP_BIND_ADDR value: {err}"),
            Self::MissingVar(name) => write!(f, "{name} must be set in production"),
            Self::WeakTokenSecret => write!(
                f,
                "AUTH_TOKEN_SECRET must be at least {MIN_TOKEN_SECRET_LEN} bytes long"
            ),
            Self::InvalidTokenTtl(value) => write!(
                f,
                "AUTH_TOKEN_TTL_SECS must be a positive integer (got {value})"
            ),
            Self::IncompleteAdmin => write!(
                f,
                "ADMIN_EMAIL and ADMIN_PASSWORD must be provided together"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}
