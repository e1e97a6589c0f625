use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf, time::Duration};
use validator::Validate;

/// Environment variable naming an alternative TOML file.
pub const CONFIG_PATH_ENV: &str = "STRESS_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct Config {
    #[validate(nested)]
    pub server: ServerConfig,
    #[validate(nested)]
    pub stub: StubConfig,
    #[validate(nested)]
    pub batch: BatchConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8000,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}

/// Behaviour of the target service stub.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct StubConfig {
    /// Simulated work applied to every accepted request.
    #[validate(range(max = 3_600_000))]
    pub delay_ms: u64,
    /// Write the received counter back as the response body.
    pub echo: bool,
    /// Reject requests without a `counter` field with 400.
    pub require_counter: bool,
}

impl Default for StubConfig {
    fn default() -> Self {
        Self {
            delay_ms: 10_000,
            echo: true,
            require_counter: true,
        }
    }
}

impl StubConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestMethod {
    Get,
    Post,
}

/// How each request unit obtains its `counter` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierStrategy {
    None,
    Sequence,
    Uuid,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct BatchConfig {
    #[validate(range(min = 1, max = 1_000_000))]
    pub concurrency: usize,
    pub method: RequestMethod,
    pub identifier: IdentifierStrategy,
    /// Overrides the address derived from the bound stub listener.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(url)]
    pub target_url: Option<String>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: 10_000,
            method: RequestMethod::Post,
            identifier: IdentifierStrategy::Sequence,
            target_url: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            filter: "info,hyper=warn,reqwest=warn,tower_http=info".into(),
        }
    }
}

impl Config {
    /// Defaults, then the TOML file, then `STRESS__*` environment overrides.
    pub fn load() -> Result<Self> {
        let path = std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        let figment = Self::base()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("STRESS__").split("__"));
        Self::extract(figment)
            .with_context(|| format!("loading configuration from {}", path.display()))
    }

    /// Defaults overlaid with an in-memory TOML document.
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        Self::extract(Self::base().merge(Toml::string(toml)))
    }

    fn base() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
    }

    fn extract(figment: Figment) -> Result<Self> {
        let cfg: Config = figment.extract()?;
        cfg.validate().context("invalid configuration")?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_validated_experiment() {
        let cfg = Config::from_toml_str("").unwrap();
        assert_eq!(cfg.batch.concurrency, 10_000);
        assert_eq!(cfg.batch.method, RequestMethod::Post);
        assert_eq!(cfg.batch.identifier, IdentifierStrategy::Sequence);
        assert!(cfg.stub.require_counter);
        assert_eq!(cfg.stub.delay(), Duration::from_secs(10));
        assert_eq!(cfg.server.socket_addr().unwrap(), "127.0.0.1:8000".parse().unwrap());
    }

    #[test]
    fn test_toml_overrides_nested_sections() {
        let cfg = Config::from_toml_str(
            r#"
            [stub]
            delay_ms = 250
            require_counter = false

            [batch]
            concurrency = 1000
            method = "get"
            identifier = "none"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.stub.delay_ms, 250);
        assert!(!cfg.stub.require_counter);
        assert!(cfg.stub.echo);
        assert_eq!(cfg.batch.concurrency, 1000);
        assert_eq!(cfg.batch.method, RequestMethod::Get);
        assert_eq!(cfg.batch.identifier, IdentifierStrategy::None);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let err = Config::from_toml_str("[batch]\nconcurrency = 0\n").unwrap_err();
        assert!(format!("{err:#}").contains("concurrency"));
    }

    #[test]
    fn test_bad_target_url_rejected() {
        assert!(Config::from_toml_str("[batch]\ntarget_url = \"not a url\"\n").is_err());
    }

    #[test]
    fn test_unknown_method_rejected() {
        assert!(Config::from_toml_str("[batch]\nmethod = \"patch\"\n").is_err());
    }

    #[test]
    fn test_invalid_host_reported() {
        let server = ServerConfig { host: "not a host".into(), port: 80 };
        assert!(server.socket_addr().is_err());
    }
}
