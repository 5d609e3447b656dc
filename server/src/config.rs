use prescription_engine::auth::{AuthorizationGuard, Role, DOCTOR_ORG, PHARMACIST_ORG};
use std::borrow::Cow;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use thiserror::Error;

use crate::db::DbConfig;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid {var}={value:?}: {reason}")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
    pub reason: String,
}

/// Where patient records are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LedgerBackend {
    #[default]
    Memory,
    Postgres,
}

impl FromStr for LedgerBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(LedgerBackend::Memory),
            "postgres" | "postgresql" => Ok(LedgerBackend::Postgres),
            _ => Err("expected 'memory' or 'postgres'".to_string()),
        }
    }
}

impl fmt::Display for LedgerBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerBackend::Memory => f.write_str("memory"),
            LedgerBackend::Postgres => f.write_str("postgres"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub backend: LedgerBackend,
    pub database: DbConfig<'static>,
    pub doctor_org: String,
    pub pharmacist_org: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = DbConfig::default();

        let mut database = DbConfig::new(
            lookup("DB_HOST").map_or(defaults.host, Cow::Owned),
            parse_or(&lookup, "DB_PORT", defaults.port)?,
            lookup("DB_NAME").map_or(defaults.database, Cow::Owned),
            lookup("DB_USER").map_or(defaults.user, Cow::Owned),
            lookup("DB_PASSWORD").map_or(defaults.password, Cow::Owned),
        )
        .with_max_connections(parse_or(&lookup, "DB_MAX_CONNECTIONS", defaults.max_connections)?);
        if let Some(url) = lookup("DATABASE_URL") {
            database = database.with_url(url);
        }

        Ok(Self {
            bind_addr: parse_or(&lookup, "BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 3000)))?,
            backend: parse_or(&lookup, "LEDGER_BACKEND", LedgerBackend::Memory)?,
            database,
            doctor_org: lookup("DOCTOR_ORG").unwrap_or_else(|| DOCTOR_ORG.to_string()),
            pharmacist_org: lookup("PHARMACIST_ORG").unwrap_or_else(|| PHARMACIST_ORG.to_string()),
        })
    }

    pub fn guard(&self) -> AuthorizationGuard {
        AuthorizationGuard::empty()
            .with_organization(self.doctor_org.clone(), Role::Doctor)
            .with_organization(self.pharmacist_org.clone(), Role::Pharmacist)
    }
}

fn parse_or<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|err: T::Err| ConfigError {
            var,
            reason: err.to_string(),
            value,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.bind_addr.to_string(), "0.0.0.0:3000");
        assert_eq!(config.backend, LedgerBackend::Memory);
        assert_eq!(config.database, DbConfig::default());
        assert_eq!(config.doctor_org, DOCTOR_ORG);
    }

    #[test]
    fn test_postgres_settings() {
        let config = config_from(&[
            ("LEDGER_BACKEND", "Postgres"),
            ("DB_HOST", "db"),
            ("DB_PORT", "6543"),
            ("DB_MAX_CONNECTIONS", "12"),
        ])
        .unwrap();
        assert_eq!(config.backend, LedgerBackend::Postgres);
        assert_eq!(config.database.port, 6543);
        assert_eq!(config.database.max_connections, 12);
        assert_eq!(
            config.database.connection_string(),
            "postgres://postgres:postgres@db:6543/prescriptions"
        );
    }

    #[test]
    fn test_invalid_value_names_the_variable() {
        let err = config_from(&[("DB_PORT", "eighty")]).unwrap_err();
        assert_eq!(err.var, "DB_PORT");
        assert_eq!(err.value, "eighty");

        let err = config_from(&[("LEDGER_BACKEND", "couchdb")]).unwrap_err();
        assert!(err.to_string().starts_with("invalid LEDGER_BACKEND=\"couchdb\""));
    }

    #[test]
    fn test_custom_organizations_seed_the_guard() {
        let config = config_from(&[("DOCTOR_ORG", "Org1MSP"), ("PHARMACIST_ORG", "Org2MSP")])
            .unwrap();
        let guard = config.guard();
        assert_eq!(guard.resolve_role("Org1MSP", Some("doctor")).unwrap(), Role::Doctor);
        assert!(guard.resolve_role(DOCTOR_ORG, Some("doctor")).is_err());
    }
}
