//! Runtime settings from the environment (`.env` honored).

use crate::error::ConfigError;
use std::str::FromStr;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    /// Page size when a list request omits `limit`.
    pub default_limit: u64,
    /// Larger `limit` values are clamped to this.
    pub max_limit: u64,
    pub max_body_bytes: usize,
    pub bind: String,
    pub database_url: Option<String>,
    pub pg_schema: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            default_limit: 100,
            max_limit: 1000,
            max_body_bytes: 1024 * 1024,
            bind: "0.0.0.0:3000".into(),
            database_url: None,
            pg_schema: "public".into(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; `from_env` uses the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Settings::default();
        let settings = Settings {
            default_limit: parse_or(&lookup, "AUTOCRUD_DEFAULT_LIMIT", defaults.default_limit)?,
            max_limit: parse_or(&lookup, "AUTOCRUD_MAX_LIMIT", defaults.max_limit)?,
            max_body_bytes: parse_or(&lookup, "AUTOCRUD_MAX_BODY_BYTES", defaults.max_body_bytes)?,
            bind: lookup("AUTOCRUD_BIND").unwrap_or(defaults.bind),
            database_url: lookup("DATABASE_URL").filter(|s| !s.trim().is_empty()),
            pg_schema: lookup("AUTOCRUD_PG_SCHEMA").unwrap_or(defaults.pg_schema),
        };
        if settings.default_limit > settings.max_limit {
            return Err(ConfigError::Load(format!(
                "AUTOCRUD_DEFAULT_LIMIT ({}) exceeds AUTOCRUD_MAX_LIMIT ({})",
                settings.default_limit, settings.max_limit
            )));
        }
        Ok(settings)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Load(format!("{} is not a valid number: {}", key, raw))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let s = Settings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(s, Settings::default());
    }

    #[test]
    fn overrides_and_rejects_bad_values() {
        let s = Settings::from_lookup(lookup(&[("AUTOCRUD_DEFAULT_LIMIT", "20"), ("AUTOCRUD_MAX_LIMIT", "50")])).unwrap();
        assert_eq!((s.default_limit, s.max_limit), (20, 50));
        assert!(Settings::from_lookup(lookup(&[("AUTOCRUD_MAX_LIMIT", "lots")])).is_err());
        assert!(Settings::from_lookup(lookup(&[("AUTOCRUD_DEFAULT_LIMIT", "500"), ("AUTOCRUD_MAX_LIMIT", "50")])).is_err());
    }
}
