//! Environment-driven settings. `.env` is loaded first when present.

use crate::error::ConfigError;
use crate::schema::ReferentialAction;
use std::str::FromStr;

/// Where the entity cache keeps its entries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheKind {
    /// Process-local map.
    Memory,
    /// `_sys_cache` table in the metadata schema; shared between processes.
    Postgres,
}

impl FromStr for CacheKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(CacheKind::Memory),
            "postgres" | "pg" => Ok(CacheKind::Postgres),
            _ => Err(ConfigError::Invalid {
                key: "ARCHITECT_CACHE",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub database_url: String,
    /// Schema holding the `_sys_*` metadata tables. From `ARCHITECT_META_SCHEMA`, default `architect_meta`.
    pub meta_schema: String,
    /// Schema user tables live in. From `ARCHITECT_DATA_SCHEMA`, default `public`.
    pub data_schema: String,
    pub cache: CacheKind,
    pub fk_on_update: ReferentialAction,
    pub fk_on_delete: ReferentialAction,
    pub max_connections: u32,
}

impl Settings {
    /// Read settings from the process environment (after `dotenvy`).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Settings::from_env`] with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let meta_schema = lookup("ARCHITECT_META_SCHEMA").unwrap_or_else(|| "architect_meta".into());
        let data_schema = lookup("ARCHITECT_DATA_SCHEMA").unwrap_or_else(|| "public".into());
        for (key, value) in [
            ("ARCHITECT_META_SCHEMA", &meta_schema),
            ("ARCHITECT_DATA_SCHEMA", &data_schema),
        ] {
            if !is_identifier(value) {
                return Err(ConfigError::Invalid {
                    key,
                    value: value.clone(),
                });
            }
        }
        let cache = match lookup("ARCHITECT_CACHE") {
            Some(v) => v.parse()?,
            None => CacheKind::Memory,
        };
        let fk_on_update = action_setting(&lookup, "ARCHITECT_FK_ON_UPDATE")?;
        let fk_on_delete = action_setting(&lookup, "ARCHITECT_FK_ON_DELETE")?;
        let max_connections = match lookup("ARCHITECT_MAX_CONNECTIONS") {
            Some(v) => v.parse().map_err(|_| ConfigError::Invalid {
                key: "ARCHITECT_MAX_CONNECTIONS",
                value: v,
            })?,
            None => 5,
        };
        Ok(Settings {
            database_url,
            meta_schema,
            data_schema,
            cache,
            fk_on_update,
            fk_on_delete,
            max_connections,
        })
    }
}

fn action_setting<F>(lookup: &F, key: &'static str) -> Result<ReferentialAction, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(v) => v.parse().map_err(|_| ConfigError::Invalid { key, value: v }),
        None => Ok(ReferentialAction::NoAction),
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_apply_when_only_url_is_set() {
        let s = Settings::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/meta")])).unwrap();
        assert_eq!(s.meta_schema, "architect_meta");
        assert_eq!(s.data_schema, "public");
        assert_eq!(s.cache, CacheKind::Memory);
        assert_eq!(s.fk_on_delete, ReferentialAction::NoAction);
        assert_eq!(s.max_connections, 5);
    }

    #[test]
    fn missing_url_is_an_error() {
        assert!(matches!(
            Settings::from_lookup(lookup(&[])),
            Err(ConfigError::Missing("DATABASE_URL"))
        ));
    }

    #[test]
    fn rejects_bad_values() {
        let bad_schema = lookup(&[("DATABASE_URL", "x"), ("ARCHITECT_META_SCHEMA", "meta; drop")]);
        assert!(Settings::from_lookup(bad_schema).is_err());
        let bad_action = lookup(&[("DATABASE_URL", "x"), ("ARCHITECT_FK_ON_DELETE", "explode")]);
        assert!(Settings::from_lookup(bad_action).is_err());
        let cascade = lookup(&[("DATABASE_URL", "x"), ("ARCHITECT_FK_ON_DELETE", "cascade"), ("ARCHITECT_CACHE", "postgres")]);
        let s = Settings::from_lookup(cascade).unwrap();
        assert_eq!(s.fk_on_delete, ReferentialAction::Cascade);
        assert_eq!(s.cache, CacheKind::Postgres);
    }
}
