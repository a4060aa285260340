//! Named-connection configuration.
//!
//! Connections live in `<config_dir>/uniquery/config.toml`. A connection
//! entry carries the descriptor the core keys its cache on plus the
//! credentials the SQL drivers need; credentials stay out of the cache key
//! and are never serialized back to disk.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::adapter::{ConnectionDescriptor, SqlCredentials};
use crate::error::GatewayError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSettings {
    pub name: String,
    pub backend_type: String,
    pub host: String,
    #[serde(default)]
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password: String,
}

impl ConnectionSettings {
    pub fn descriptor(&self) -> ConnectionDescriptor {
        ConnectionDescriptor::new(self.backend_type.clone(), self.host.clone())
    }

    pub fn credentials(&self) -> SqlCredentials {
        SqlCredentials {
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }
}

fn default_query_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub connections: Vec<ConnectionSettings>,
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            connections: Vec::new(),
            query_timeout_secs: default_query_timeout_secs(),
        }
    }
}

impl GatewayConfig {
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("uniquery")
            .join("config.toml")
    }

    /// Load the default config file. A missing file is an empty config,
    /// not an error.
    pub fn load() -> Result<Self, GatewayError> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self, GatewayError> {
        if !path.exists() {
            return Ok(GatewayConfig::default());
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| GatewayError::config(e.to_string()))
    }

    pub fn save(&self) -> Result<(), GatewayError> {
        let path = Self::config_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| GatewayError::config(e.to_string()))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    pub fn find_connection(&self, name: &str) -> Option<&ConnectionSettings> {
        self.connections
            .iter()
            .find(|connection| connection.name.eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        query_timeout_secs = 10

        [[connections]]
        name = "warehouse"
        backend_type = "postgresql"
        host = "db.internal:5432"
        username = "reporting"

        [[connections]]
        name = "triples"
        backend_type = "sparql"
        host = "triples.internal:3030"
    "#;

    #[test]
    fn test_parse_sample_config() {
        let config: GatewayConfig = toml::from_str(SAMPLE).unwrap();
        assert_eq!(config.query_timeout_secs, 10);
        assert_eq!(config.connections.len(), 2);

        let warehouse = config.find_connection("warehouse").unwrap();
        assert_eq!(warehouse.backend_type, "postgresql");
        assert_eq!(warehouse.username, "reporting");
        assert_eq!(warehouse.password, "");
    }

    #[test]
    fn test_find_connection_is_case_insensitive() {
        let config: GatewayConfig = toml::from_str(SAMPLE).unwrap();
        assert!(config.find_connection("WAREHOUSE").is_some());
        assert!(config.find_connection("missing").is_none());
    }

    #[test]
    fn test_descriptor_from_settings() {
        let config: GatewayConfig = toml::from_str(SAMPLE).unwrap();
        let descriptor = config.find_connection("triples").unwrap().descriptor();
        assert_eq!(descriptor.backend_type, "sparql");
        assert_eq!(descriptor.host, "triples.internal:3030");
    }

    #[test]
    fn test_defaults() {
        let config: GatewayConfig = toml::from_str("").unwrap();
        assert!(config.connections.is_empty());
        assert_eq!(config.query_timeout_secs, 30);
    }

    #[test]
    fn test_password_not_serialized() {
        let config = GatewayConfig {
            connections: vec![ConnectionSettings {
                name: "warehouse".into(),
                backend_type: "mysql".into(),
                host: "db.internal".into(),
                username: "reporting".into(),
                password: "hunter2".into(),
            }],
            ..Default::default()
        };
        let encoded = toml::to_string_pretty(&config).unwrap();
        assert!(!encoded.contains("hunter2"));
    }
}
