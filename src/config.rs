use std::{env, path::PathBuf, str::FromStr};

pub const DEFAULT_MODEL_PATH: &str = "model/model_klasifikasi_jagung_DenseNet.h5";
const DEFAULT_PORT: u16 = 5000;
const DEFAULT_BODY_LIMIT_MB: usize = 5;
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
    #[error("Unknown database driver: {0}")]
    UnknownDriver(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DbDriver {
    MySql,
    Postgres,
}

impl DbDriver {
    pub fn default_port(self) -> u16 {
        match self {
            DbDriver::MySql => 3306,
            DbDriver::Postgres => 5432,
        }
    }
}

impl FromStr for DbDriver {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mysql" => Ok(DbDriver::MySql),
            "postgres" | "postgresql" => Ok(DbDriver::Postgres),
            other => Err(ConfigError::UnknownDriver(other.to_string())),
        }
    }
}

#[derive(Clone, Debug)]
pub struct DbConfig {
    pub driver: DbDriver,
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub max_connections: u32,
}

#[derive(Clone, Debug)]
pub struct ModelConfig {
    pub path: PathBuf,
    /// Where to fetch the artifact from when it is missing locally.
    pub url: Option<String>,
    /// Graph operation for frozen graphs, signature key for SavedModels.
    pub input_op: String,
    pub output_op: String,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub body_limit_bytes: usize,
    pub model: ModelConfig,
    pub db: DbConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let port = parse_or(&var, "PORT", DEFAULT_PORT)?;
        let body_limit_bytes = parse_or(&var, "BODY_LIMIT_MB", DEFAULT_BODY_LIMIT_MB)? * 1024 * 1024;

        let model = ModelConfig {
            path: var("MODEL_PATH")
                .unwrap_or_else(|| DEFAULT_MODEL_PATH.to_string())
                .into(),
            url: var("MODEL_URL"),
            input_op: var("MODEL_INPUT_OP").unwrap_or_else(|| "x".to_string()),
            output_op: var("MODEL_OUTPUT_OP").unwrap_or_else(|| "Identity".to_string()),
        };

        let driver = match var("DB_DRIVER") {
            Some(raw) => raw.parse()?,
            None => DbDriver::MySql,
        };
        let db = DbConfig {
            driver,
            host: var("DB_HOST").unwrap_or_else(|| "localhost".to_string()),
            port: parse_or(&var, "DB_PORT", driver.default_port())?,
            user: var("DB_USER"),
            password: var("DB_PASSWORD"),
            database: var("DB_NAME"),
            max_connections: parse_or(&var, "DB_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?,
        };

        Ok(Config {
            port,
            body_limit_bytes,
            model,
            db,
        })
    }
}

fn parse_or<T, F>(var: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value: raw }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.body_limit_bytes, 5 * 1024 * 1024);
        assert_eq!(config.model.path, PathBuf::from(DEFAULT_MODEL_PATH));
        assert_eq!(config.model.input_op, "x");
        assert_eq!(config.model.output_op, "Identity");
        assert_eq!(config.db.driver, DbDriver::MySql);
        assert_eq!(config.db.host, "localhost");
        assert_eq!(config.db.port, 3306);
        assert!(config.db.user.is_none());
    }

    #[test]
    fn postgres_driver_changes_default_port() {
        let config = config_from(&[("DB_DRIVER", "PostgreSQL"), ("DB_NAME", "corn")]).unwrap();
        assert_eq!(config.db.driver, DbDriver::Postgres);
        assert_eq!(config.db.port, 5432);
        assert_eq!(config.db.database.as_deref(), Some("corn"));
    }

    #[test]
    fn explicit_values_override_defaults() {
        let config = config_from(&[
            ("PORT", "8080"),
            ("DB_PORT", "6543"),
            ("MODEL_PATH", "/srv/model"),
            ("DB_HOST", ""),
        ])
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.db.port, 6543);
        assert_eq!(config.model.path, PathBuf::from("/srv/model"));
        assert_eq!(config.db.host, "localhost");
    }

    #[test]
    fn rejects_bad_port_and_driver() {
        assert!(matches!(
            config_from(&[("PORT", "http")]),
            Err(ConfigError::InvalidValue { name: "PORT", .. })
        ));
        assert!(matches!(
            config_from(&[("DB_DRIVER", "sqlite")]),
            Err(ConfigError::UnknownDriver(_))
        ));
    }
}
