//! Configuration module for the Jeevan Aahar backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::models::Role;

/// Google's published signing keys for Firebase ID tokens.
pub const FIREBASE_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

/// Errors raised while reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Deployment environment. Production hides internal error detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// What happens when an identity without a profile reaches a gated route
/// and the request names no usable role.
///
/// Chosen once per deployment; every gated route follows the same policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirstContactPolicy {
    /// Refuse to create a profile until the client picks a role.
    RequireRole,
    /// Create the profile with the given role.
    DefaultRole(Role),
}

impl FromStr for FirstContactPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "require-role" => Ok(FirstContactPolicy::RequireRole),
            other => match other.strip_prefix("default-role:") {
                Some(role) => role
                    .parse::<Role>()
                    .map(FirstContactPolicy::DefaultRole)
                    .map_err(|e| e.to_string()),
                None => Err("expected 'require-role' or 'default-role:<role>'".to_string()),
            },
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    pub log_format: LogFormat,
    pub environment: Environment,
    /// Firebase project id; the expected token audience
    pub firebase_project_id: Option<String>,
    /// JWK set used to verify RS256 ID tokens
    pub jwks_url: String,
    pub jwks_refresh: Duration,
    /// HTTP timeout for key set fetches
    pub verifier_timeout: Duration,
    /// Shared HS256 secret; replaces the JWK set (local development and emulator)
    pub auth_hs256_secret: Option<String>,
    pub first_contact: FirstContactPolicy,
    /// Allowed CORS origin; any origin when unset
    pub cors_origin: Option<String>,
    /// Maximum request body size in bytes
    pub body_limit: usize,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let db_path = lookup("JEEVAN_DB_PATH")
            .unwrap_or_else(|| "./data/jeevan.sqlite".to_string())
            .into();

        let bind_addr = parse_var(&lookup, "JEEVAN_BIND_ADDR", "127.0.0.1:8000", |v| {
            v.parse::<SocketAddr>().map_err(|e| e.to_string())
        })?;

        let log_level = lookup("JEEVAN_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let log_format = parse_var(&lookup, "JEEVAN_LOG_FORMAT", "pretty", |v| match v {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err("expected 'pretty' or 'json'".to_string()),
        })?;

        let environment = parse_var(&lookup, "JEEVAN_ENV", "development", |v| match v {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            _ => Err("expected 'development' or 'production'".to_string()),
        })?;

        let firebase_project_id = lookup("FIREBASE_PROJECT_ID").filter(|v| !v.is_empty());

        let jwks_url = lookup("JEEVAN_JWKS_URL").unwrap_or_else(|| FIREBASE_JWKS_URL.to_string());

        let jwks_refresh = parse_var(&lookup, "JEEVAN_JWKS_REFRESH_SECS", "3600", parse_secs)?;
        let verifier_timeout =
            parse_var(&lookup, "JEEVAN_VERIFIER_TIMEOUT_SECS", "10", parse_secs)?;

        let auth_hs256_secret = lookup("JEEVAN_AUTH_HS256_SECRET").filter(|v| !v.is_empty());

        let first_contact = parse_var(&lookup, "JEEVAN_FIRST_CONTACT", "require-role", |v| {
            v.parse::<FirstContactPolicy>()
        })?;

        let cors_origin = lookup("CORS_ORIGIN").filter(|v| !v.is_empty() && v != "*");

        let body_limit = parse_var(&lookup, "JEEVAN_BODY_LIMIT_MB", "50", |v| {
            let mb = v.parse::<usize>().map_err(|e| e.to_string())?;
            mb.checked_mul(1024 * 1024)
                .ok_or_else(|| "body limit does not fit in memory".to_string())
        })?;

        Ok(Self {
            db_path,
            bind_addr,
            log_level,
            log_format,
            environment,
            firebase_project_id,
            jwks_url,
            jwks_refresh,
            verifier_timeout,
            auth_hs256_secret,
            first_contact,
            cors_origin,
            body_limit,
        })
    }

    /// Whether error responses may include internal detail.
    pub fn expose_internal_errors(&self) -> bool {
        self.environment != Environment::Production
    }
}

fn parse_var<F, T, P>(
    lookup: &F,
    var: &'static str,
    default: &str,
    parse: P,
) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    P: Fn(&str) -> Result<T, String>,
{
    let value = lookup(var).unwrap_or_else(|| default.to_string());
    parse(&value).map_err(|reason| ConfigError::Invalid {
        var,
        value,
        reason,
    })
}

fn parse_secs(value: &str) -> Result<Duration, String> {
    value
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = load(&[]).unwrap();

        assert_eq!(config.db_path, PathBuf::from("./data/jeevan.sqlite"));
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8000");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.environment, Environment::Development);
        assert!(config.firebase_project_id.is_none());
        assert_eq!(config.jwks_url, FIREBASE_JWKS_URL);
        assert_eq!(config.jwks_refresh, Duration::from_secs(3600));
        assert_eq!(config.first_contact, FirstContactPolicy::RequireRole);
        assert!(config.cors_origin.is_none());
        assert_eq!(config.body_limit, 50 * 1024 * 1024);
        assert!(config.expose_internal_errors());
    }

    #[test]
    fn test_first_contact_policy_values() {
        let config = load(&[("JEEVAN_FIRST_CONTACT", "default-role:recipient")]).unwrap();
        assert_eq!(
            config.first_contact,
            FirstContactPolicy::DefaultRole(Role::Recipient)
        );

        assert!(load(&[("JEEVAN_FIRST_CONTACT", "default-role:admin")]).is_err());
        assert!(load(&[("JEEVAN_FIRST_CONTACT", "guess")]).is_err());
    }

    #[test]
    fn test_production_hides_internal_errors() {
        let config = load(&[("JEEVAN_ENV", "production")]).unwrap();
        assert!(!config.expose_internal_errors());
    }

    #[test]
    fn test_invalid_bind_addr_is_reported() {
        let err = load(&[("JEEVAN_BIND_ADDR", "not-an-addr")]).unwrap_err();
        assert!(err.to_string().contains("JEEVAN_BIND_ADDR"));
    }

    #[test]
    fn test_body_limit_overflow_is_reported() {
        let config = load(&[("JEEVAN_BODY_LIMIT_MB", "2")]).unwrap();
        assert_eq!(config.body_limit, 2 * 1024 * 1024);

        let huge = usize::MAX.to_string();
        let err = load(&[("JEEVAN_BODY_LIMIT_MB", huge.as_str())]).unwrap_err();
        assert!(err.to_string().contains("JEEVAN_BODY_LIMIT_MB"));
    }

    #[test]
    fn test_wildcard_cors_means_any_origin() {
        assert!(load(&[("CORS_ORIGIN", "*")]).unwrap().cors_origin.is_none());
        let config = load(&[("CORS_ORIGIN", "https://jeevan.example")]).unwrap();
        assert_eq!(config.cors_origin.as_deref(), Some("https://jeevan.example"));
    }
}
