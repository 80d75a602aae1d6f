use std::{env, net::SocketAddr, path::PathBuf, time::Duration};

use thiserror::Error;

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:5000";
const DEFAULT_CORS_ORIGINS: [&str; 2] = ["http://localhost:8000", "http://127.0.0.1:8000"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be configured")]
    Missing(&'static str),
    #[error("invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Log sink settings consumed by [`crate::telemetry::init`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: String,
    pub dir: PathBuf,
    pub file: String,
}

impl LogSettings {
    pub fn file_path(&self) -> PathBuf {
        self.dir.join(&self.file)
    }
}

/// Process configuration, read once at startup and passed down explicitly.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub database_url: String,
    pub tenant_id: String,
    pub client_id: String,
    pub debug: bool,
    pub expose_errors: bool,
    pub statement_timeout: Option<Duration>,
    pub cors_origins: Vec<String>,
    pub log: LogSettings,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let tenant_id = non_empty("TENANT_ID").ok_or(ConfigError::Missing("TENANT_ID"))?;
        let client_id = non_empty("CLIENT_ID").ok_or(ConfigError::Missing("CLIENT_ID"))?;
        let database_url = non_empty("DATABASE_URL")
            .or_else(|| non_empty("DATABASE_URI"))
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let listen_addr: SocketAddr = non_empty("GATEWAY_ADDR")
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string())
            .parse()
            .map_err(|err: std::net::AddrParseError| ConfigError::Invalid {
                key: "GATEWAY_ADDR",
                reason: err.to_string(),
            })?;

        let debug = match non_empty("GATEWAY_DEBUG") {
            Some(value) => parse_bool("GATEWAY_DEBUG", &value)?,
            None => match non_empty("FLASK_DEBUG") {
                Some(value) => parse_bool("FLASK_DEBUG", &value)?,
                None => false,
            },
        };

        let expose_errors = match non_empty("GATEWAY_EXPOSE_ERRORS") {
            Some(value) => parse_bool("GATEWAY_EXPOSE_ERRORS", &value)?,
            None => true,
        };

        let statement_timeout = match non_empty("GATEWAY_DB_TIMEOUT_SECS") {
            Some(value) => {
                let secs: u64 = value.parse().map_err(|_| ConfigError::Invalid {
                    key: "GATEWAY_DB_TIMEOUT_SECS",
                    reason: format!("'{value}' is not a whole number of seconds"),
                })?;
                (secs > 0).then(|| Duration::from_secs(secs))
            }
            None => None,
        };

        let cors_origins = match non_empty("GATEWAY_CORS_ORIGINS") {
            Some(value) => parse_list(&value),
            None => DEFAULT_CORS_ORIGINS.iter().map(|o| o.to_string()).collect(),
        };

        let log = LogSettings {
            level: non_empty("LOG_LEVEL")
                .unwrap_or_else(|| "INFO".to_string())
                .to_ascii_uppercase(),
            dir: non_empty("LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./logs")),
            file: non_empty("LOG_FILE").unwrap_or_else(|| "app.log".to_string()),
        };

        Ok(Self {
            listen_addr,
            database_url,
            tenant_id,
            client_id,
            debug,
            expose_errors,
            statement_timeout,
            cors_origins,
            log,
        })
    }

    /// Expected `iss` claim for tokens minted by the configured tenant.
    pub fn issuer(&self) -> String {
        format!("https://login.microsoftonline.com/{}/v2.0", self.tenant_id)
    }
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "on" => Ok(true),
        "0" | "false" | "f" | "no" | "off" => Ok(false),
        other => Err(ConfigError::Invalid {
            key,
            reason: format!("'{other}' is not a boolean"),
        }),
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("TENANT_ID", "tenant-123"),
        ("CLIENT_ID", "client-abc"),
        ("DATABASE_URL", "sqlite://tickets.db"),
    ];

    #[test]
    fn defaults_apply_when_only_required_values_are_set() {
        let config = AppConfig::from_lookup(lookup(&REQUIRED)).unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:5000".parse::<SocketAddr>().unwrap());
        assert!(!config.debug);
        assert!(config.expose_errors);
        assert_eq!(config.statement_timeout, None);
        assert_eq!(config.cors_origins.len(), 2);
        assert_eq!(config.log.level, "INFO");
        assert_eq!(config.log.file_path(), PathBuf::from("./logs/app.log"));
        assert_eq!(
            config.issuer(),
            "https://login.microsoftonline.com/tenant-123/v2.0"
        );
    }

    #[test]
    fn missing_tenant_is_reported() {
        let err = AppConfig::from_lookup(lookup(&[("CLIENT_ID", "c"), ("DATABASE_URL", "x")]))
            .unwrap_err();
        assert_eq!(err, ConfigError::Missing("TENANT_ID"));
    }

    #[test]
    fn database_uri_is_accepted_as_alias() {
        let config = AppConfig::from_lookup(lookup(&[
            ("TENANT_ID", "t"),
            ("CLIENT_ID", "c"),
            ("DATABASE_URI", "mysql://localhost/tickets"),
        ]))
        .unwrap();
        assert_eq!(config.database_url, "mysql://localhost/tickets");
    }

    #[test]
    fn flask_debug_flag_is_honoured() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("FLASK_DEBUG", "T"));
        pairs.push(("LOG_LEVEL", "warning"));
        let config = AppConfig::from_lookup(lookup(&pairs)).unwrap();
        assert!(config.debug);
        assert_eq!(config.log.level, "WARNING");
    }

    #[test]
    fn overrides_are_parsed() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("GATEWAY_ADDR", "127.0.0.1:9000"),
            ("GATEWAY_EXPOSE_ERRORS", "off"),
            ("GATEWAY_DB_TIMEOUT_SECS", "15"),
            ("GATEWAY_CORS_ORIGINS", " https://a.example , ,https://b.example"),
        ]);
        let config = AppConfig::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:9000".parse::<SocketAddr>().unwrap());
        assert!(!config.expose_errors);
        assert_eq!(config.statement_timeout, Some(Duration::from_secs(15)));
        assert_eq!(
            config.cors_origins,
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
    }

    #[test]
    fn zero_timeout_disables_the_bound() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("GATEWAY_DB_TIMEOUT_SECS", "0"));
        let config = AppConfig::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.statement_timeout, None);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("GATEWAY_EXPOSE_ERRORS", "maybe"));
        let err = AppConfig::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "GATEWAY_EXPOSE_ERRORS",
                ..
            }
        ));
    }
}
