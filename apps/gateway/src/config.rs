//! Gateway configuration loading and types.

use std::env::VarError;
use std::fmt::Display;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use sisgpo_federation::{FederationConfig, DEFAULT_ASSERTION_TTL_SECS, DEFAULT_ORIGIN};

/// Root gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub listen_addr: SocketAddr,
    pub sisgpo: SisgpoConfig,
    pub auth: AuthConfig,
    pub cache: CacheConfig,
    pub max_body_size_bytes: usize,
    /// Optional JSON file mapping user ids to email addresses.
    pub identity_directory_path: Option<PathBuf>,
    pub cors_allowed_origins: Vec<String>,
    pub logging: LoggingConfig,
}

/// Upstream (SISGPO) integration settings.
#[derive(Debug, Clone)]
pub struct SisgpoConfig {
    pub base_url: String,
    pub sso_secret: Option<String>,
    pub sso_ttl_secs: u64,
    pub sso_origin: String,
    pub token_timeout_secs: u64,
    pub proxy_timeout_secs: u64,
    pub health_path: String,
}

/// Local session verification settings.
#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .finish()
    }
}

/// Response cache sizing.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_entries: u64,
    pub default_ttl_secs: u64,
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub filter: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "text" => Ok(LogFormat::Pretty),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3001";
const DEFAULT_SISGPO_URL: &str = "http://localhost:3333";
const DEFAULT_HEALTH_PATH: &str = "/api/health";
/// Upper bound for `SISGPO_SSO_TTL_SECS`; assertions are meant to be short-lived.
const MAX_SSO_TTL_SECS: u64 = 86_400;

const DEFAULT_LOG_FILTER: &str = "info,sisgpo_gateway=debug,sisgpo_federation=debug";

impl GatewayConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_reader(|key| std::env::var(key))
    }

    /// Load configuration from a custom variable reader.
    ///
    /// This allows tests to supply variables without mutating process-global
    /// environment state.
    pub fn from_reader<F>(reader: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<String, VarError>,
    {
        let listen_addr = reader("GATEWAY_LISTEN_ADDR")
            .unwrap_or_else(|_| DEFAULT_LISTEN_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("GATEWAY_LISTEN_ADDR".into(), e.to_string()))?;

        let base_url = reader("SISGPO_API_URL")
            .unwrap_or_else(|_| DEFAULT_SISGPO_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        match url::Url::parse(&base_url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            _ => {
                return Err(ConfigError::InvalidValue(
                    "SISGPO_API_URL".into(),
                    format!("'{base_url}' is not an absolute http(s) URL"),
                ))
            }
        }

        let sso_ttl_secs = parse_or(&reader, "SISGPO_SSO_TTL_SECS", DEFAULT_ASSERTION_TTL_SECS)?;
        if sso_ttl_secs == 0 || sso_ttl_secs > MAX_SSO_TTL_SECS {
            return Err(ConfigError::InvalidValue(
                "SISGPO_SSO_TTL_SECS".into(),
                format!("must be between 1 and {MAX_SSO_TTL_SECS} seconds, got {sso_ttl_secs}"),
            ));
        }

        let sso_secret = reader("SISGPO_SSO_SECRET")
            .ok()
            .filter(|secret| !secret.trim().is_empty());

        let sisgpo = SisgpoConfig {
            base_url,
            sso_secret,
            sso_ttl_secs,
            sso_origin: reader("SISGPO_SSO_ORIGIN").unwrap_or_else(|_| DEFAULT_ORIGIN.to_string()),
            token_timeout_secs: parse_or(&reader, "SISGPO_TOKEN_TIMEOUT_SECS", 10u64)?,
            proxy_timeout_secs: parse_or(&reader, "SISGPO_PROXY_TIMEOUT_SECS", 30u64)?,
            health_path: reader("SISGPO_HEALTH_PATH")
                .unwrap_or_else(|_| DEFAULT_HEALTH_PATH.to_string()),
        };

        let jwt_secret = reader("JWT_SECRET")
            .ok()
            .filter(|secret| !secret.is_empty())
            .ok_or_else(|| ConfigError::MissingVar("JWT_SECRET".into()))?;

        let cache = CacheConfig {
            max_entries: parse_or(&reader, "CACHE_MAX_ENTRIES", 10_000u64)?,
            default_ttl_secs: parse_or(&reader, "CACHE_DEFAULT_TTL_SECS", 60u64)?,
        };

        let cors_allowed_origins = reader("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        let logging = LoggingConfig {
            filter: reader("LOG_FILTER").unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string()),
            format: parse_or(&reader, "LOG_FORMAT", LogFormat::Json)?,
        };

        Ok(Self {
            listen_addr,
            sisgpo,
            auth: AuthConfig { jwt_secret },
            cache,
            max_body_size_bytes: parse_or(&reader, "MAX_BODY_SIZE_BYTES", 10 * 1024 * 1024usize)?,
            identity_directory_path: reader("IDENTITY_DIRECTORY_PATH").ok().map(PathBuf::from),
            cors_allowed_origins,
            logging,
        })
    }

    /// Settings for the token federation service.
    pub fn federation_config(&self) -> FederationConfig {
        let mut config = FederationConfig::new(self.sisgpo.base_url.clone())
            .with_assertion_ttl_secs(self.sisgpo.sso_ttl_secs)
            .with_origin(self.sisgpo.sso_origin.clone())
            .with_timeout(self.token_timeout());
        if let Some(secret) = &self.sisgpo.sso_secret {
            config = config.with_shared_secret(secret.clone());
        }
        config
    }

    pub fn token_timeout(&self) -> Duration {
        Duration::from_secs(self.sisgpo.token_timeout_secs)
    }

    pub fn proxy_timeout(&self) -> Duration {
        Duration::from_secs(self.sisgpo.proxy_timeout_secs)
    }
}

fn parse_or<F, T>(reader: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Result<String, VarError>,
    T: FromStr,
    T::Err: Display,
{
    match reader(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(key.into(), e.to_string())),
        Err(_) => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(String),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}
