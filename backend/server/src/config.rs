use std::env;
use std::fs;

use anyhow::{bail, Context, Result};
use portauthority_services::crawler::K8sCrawlCredential;
use serde::Deserialize;

/// YAML configuration file; everything lives under the top-level
/// `portauthority` key.
#[derive(Debug, Clone, Deserialize)]
struct File {
    portauthority: Config,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(rename = "type", default = "default_backend")]
    pub backend: String,
    #[serde(default)]
    pub options: DatabaseOptions,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabaseOptions {
    #[serde(default)]
    pub source: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_health_port")]
    pub healthport: u16,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default)]
    pub clairurl: String,
    /// Analyzer client timeout in seconds.
    #[serde(default = "default_clair_timeout")]
    pub clairtimeout: u64,
    #[serde(default)]
    pub certfile: String,
    #[serde(default)]
    pub keyfile: String,
    #[serde(default)]
    pub cafile: String,
    #[serde(default)]
    pub imagewebhookdefaultblock: bool,
    #[serde(default)]
    pub k8scrawlcredentials: Vec<K8sCrawlCredential>,
}

fn default_backend() -> String {
    "pgsql".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_health_port() -> u16 {
    8081
}

fn default_timeout() -> u64 {
    900
}

fn default_clair_timeout() -> u64 {
    10
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            healthport: default_health_port(),
            timeout: default_timeout(),
            clairurl: String::new(),
            clairtimeout: default_clair_timeout(),
            certfile: String::new(),
            keyfile: String::new(),
            cafile: String::new(),
            imagewebhookdefaultblock: false,
            k8scrawlcredentials: Vec::new(),
        }
    }
}

impl Config {
    /// Reads the config file named by `PA_CONFIG`, defaulting to
    /// `config.yml`.
    pub fn load() -> Result<Self> {
        let path = env::var("PA_CONFIG").unwrap_or_else(|_| "config.yml".to_string());
        Self::from_file(&path)
    }

    pub fn from_file(path: &str) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("could not read configuration file {path}"))?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        let file: File = serde_yaml::from_str(raw).context("could not parse configuration")?;
        let config = file.portauthority;

        if config.database.backend != "pgsql" {
            bail!("no datastore backend for type {}", config.database.backend);
        }
        if config.database.options.source.is_empty() {
            bail!("could not load configuration: no database source specified");
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config() {
        let config = Config::from_yaml(
            r#"
portauthority:
  database:
    type: pgsql
    options:
      source: postgresql://pa:pa@localhost:5432/portauthority
  api:
    port: 9000
    healthport: 9001
    timeout: 60
    clairurl: http://clair:6060
    clairtimeout: 30
    imagewebhookdefaultblock: true
    k8scrawlcredentials:
      - url: registry.example.com
        username: REG_USER
        password: REG_PASS
"#,
        )
        .expect("config should parse");

        assert_eq!(config.api.port, 9000);
        assert_eq!(config.api.healthport, 9001);
        assert_eq!(config.api.timeout, 60);
        assert_eq!(config.api.clairtimeout, 30);
        assert!(config.api.imagewebhookdefaultblock);
        assert_eq!(config.api.k8scrawlcredentials.len(), 1);
        assert_eq!(
            config.api.k8scrawlcredentials[0].url,
            "registry.example.com"
        );
    }

    #[test]
    fn applies_defaults() {
        let config = Config::from_yaml(
            r#"
portauthority:
  database:
    type: pgsql
    options:
      source: postgresql://localhost/pa
  api:
    clairurl: http://clair:6060
"#,
        )
        .expect("config should parse");

        assert_eq!(config.api.port, 8080);
        assert_eq!(config.api.healthport, 8081);
        assert_eq!(config.api.timeout, 900);
        assert_eq!(config.api.clairtimeout, 10);
        assert!(!config.api.imagewebhookdefaultblock);
    }

    #[test]
    fn rejects_unknown_backend() {
        let err = Config::from_yaml(
            r#"
portauthority:
  database:
    type: mysql
    options:
      source: mysql://localhost/pa
  api:
    clairurl: http://clair:6060
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("no datastore backend"));
    }

    #[test]
    fn requires_database_source() {
        let err = Config::from_yaml(
            r#"
portauthority:
  database:
    type: pgsql
  api:
    clairurl: http://clair:6060
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("no database source"));
    }
}
