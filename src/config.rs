//! Environment-driven configuration.

use std::net::SocketAddr;

use thiserror::Error;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_COUNTRY_CODE: u16 = 1;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value: {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub bind_addr: SocketAddr,
    pub db_max_connections: u32,
    pub default_country_code: u16,
}

impl Config {
    /// Reads `.env` (if present) and then the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let database_url = required("DATABASE_URL")?;
        let jwt_secret = required("JWT_SECRET")?;

        let bind_addr =
            parse_or(&lookup, "BIND_ADDR", || SocketAddr::from(([0, 0, 0, 0], 8080)))?;
        let db_max_connections = parse_or(&lookup, "DB_MAX_CONNECTIONS", || {
            (num_cpus::get() as u32).saturating_mul(2).max(2)
        })?;
        let default_country_code =
            parse_or(&lookup, "PHONE_DEFAULT_COUNTRY_CODE", || DEFAULT_COUNTRY_CODE)?;

        if db_max_connections == 0 {
            return Err(ConfigError::Invalid {
                name: "DB_MAX_CONNECTIONS",
                value: "0".to_string(),
            });
        }
        if !(1..=999).contains(&default_country_code) {
            return Err(ConfigError::Invalid {
                name: "PHONE_DEFAULT_COUNTRY_CODE",
                value: default_country_code.to_string(),
            });
        }

        Ok(Self {
            database_url,
            jwt_secret,
            bind_addr,
            db_max_connections,
            default_country_code,
        })
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: impl FnOnce() -> T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        Some(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        _ => Ok(default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_apply_when_optional_vars_absent() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/contacts"),
            ("JWT_SECRET", "secret"),
        ]))
        .unwrap();

        assert_eq!(config.bind_addr.to_string(), DEFAULT_BIND_ADDR);
        assert_eq!(config.default_country_code, DEFAULT_COUNTRY_CODE);
        assert!(config.db_max_connections >= 2);
    }

    #[test]
    fn missing_database_url_is_reported() {
        let err = Config::from_lookup(lookup(&[("JWT_SECRET", "secret")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("DATABASE_URL")));
    }

    #[test]
    fn blank_secret_counts_as_missing() {
        let err = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/contacts"),
            ("JWT_SECRET", "  "),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("JWT_SECRET")));
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        let err = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/contacts"),
            ("JWT_SECRET", "secret"),
            ("DB_MAX_CONNECTIONS", "many"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                name: "DB_MAX_CONNECTIONS",
                ..
            }
        ));

        let err = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/contacts"),
            ("JWT_SECRET", "secret"),
            ("PHONE_DEFAULT_COUNTRY_CODE", "1000"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }
}
