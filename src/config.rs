use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use serde::Deserialize;

use crate::db::DbKind;

/// Connection settings, read from the `database` section of a figment.
#[derive(Clone, Deserialize, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub kind: DbKind,
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    pub database: String,
    pub user: String,
    pub password: String,
    #[serde(default = "default_trust_cert")]
    pub trust_cert: bool,
}

fn default_trust_cert() -> bool {
    true
}

impl ConnectionConfig {
    pub fn from_figment(figment: &Figment) -> Result<Self> {
        figment
            .extract_inner("database")
            .context("invalid `database` configuration")
    }

    /// YAML file overlaid with `RPOCO_`-prefixed environment variables,
    /// e.g. `RPOCO_DATABASE__HOST`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let figment = Figment::new()
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("RPOCO_").split("__"));
        Self::from_figment(&figment)
    }

    /// Explicit port, or the engine's usual one.
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(match self.kind {
            DbKind::Mssql => 1433,
            DbKind::Postgres => 5432,
        })
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("kind", &self.kind)
            .field("host", &self.host)
            .field("port", &self.port())
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"***")
            .field("trust_cert", &self.trust_cert)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::providers::Serialized;

    #[test]
    fn extracts_database_section_with_defaults() {
        let figment = Figment::new().merge(Serialized::defaults(serde_json::json!({
            "database": {
                "kind": "postgres",
                "host": "localhost",
                "database": "app",
                "user": "app",
                "password": "secret"
            }
        })));
        let cfg = ConnectionConfig::from_figment(&figment).unwrap();
        assert_eq!(cfg.kind, DbKind::Postgres);
        assert_eq!(cfg.port(), 5432);
        assert!(cfg.trust_cert);
        assert!(!format!("{:?}", cfg).contains("secret"));
    }

    #[test]
    fn explicit_port_wins() {
        let figment = Figment::new().merge(Serialized::defaults(serde_json::json!({
            "database": {
                "kind": "mssql",
                "host": "db",
                "port": 14330,
                "database": "app",
                "user": "sa",
                "password": "pw",
                "trust_cert": false
            }
        })));
        let cfg = ConnectionConfig::from_figment(&figment).unwrap();
        assert_eq!(cfg.port(), 14330);
        assert!(!cfg.trust_cert);
    }

    #[test]
    fn missing_fields_are_reported() {
        let figment = Figment::new().merge(Serialized::defaults(serde_json::json!({
            "database": { "kind": "mssql" }
        })));
        assert!(ConnectionConfig::from_figment(&figment).is_err());
    }
}
