use std::path::PathBuf;

use thiserror::Error;

/// Values from sample `.env` files, never accepted as the signing secret.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "secret",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("KLASMWEN_JWT_SECRET is unset or still a placeholder")]
    MissingSecret,
    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub token_ttl_days: i64,
    /// Username promoted to ADMIN at startup, if it exists.
    pub bootstrap_admin: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let jwt_secret = lookup("KLASMWEN_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            return Err(ConfigError::MissingSecret);
        }

        let db_path = lookup("KLASMWEN_DB_PATH").unwrap_or_else(|| "klasmwen.db".into());
        let host = lookup("KLASMWEN_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port = parse(&lookup, "KLASMWEN_PORT", 3000)?;
        let token_ttl_days = parse(&lookup, "KLASMWEN_TOKEN_TTL_DAYS", 30)?;
        if token_ttl_days < 1 {
            return Err(ConfigError::Invalid {
                name: "KLASMWEN_TOKEN_TTL_DAYS",
                value: token_ttl_days.to_string(),
            });
        }
        let bootstrap_admin = lookup("KLASMWEN_BOOTSTRAP_ADMIN").filter(|v| !v.trim().is_empty());

        Ok(Self {
            jwt_secret,
            db_path: db_path.into(),
            host,
            port,
            token_ttl_days,
            bootstrap_admin,
        })
    }
}

fn parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply() {
        let c = config(&[("KLASMWEN_JWT_SECRET", "s3cr3t-for-tests")]).unwrap();
        assert_eq!(c.port, 3000);
        assert_eq!(c.host, "0.0.0.0");
        assert_eq!(c.db_path, PathBuf::from("klasmwen.db"));
        assert_eq!(c.token_ttl_days, 30);
        assert!(c.bootstrap_admin.is_none());
    }

    #[test]
    fn placeholder_secrets_are_refused() {
        assert!(matches!(config(&[]), Err(ConfigError::MissingSecret)));
        assert!(matches!(
            config(&[("KLASMWEN_JWT_SECRET", "dev-secret-change-me")]),
            Err(ConfigError::MissingSecret)
        ));
    }

    #[test]
    fn bad_numbers_name_the_variable() {
        let err = config(&[("KLASMWEN_JWT_SECRET", "x-real-secret"), ("KLASMWEN_PORT", "http")])
            .unwrap_err();
        assert_eq!(err.to_string(), "KLASMWEN_PORT has an invalid value 'http'");
    }
}
