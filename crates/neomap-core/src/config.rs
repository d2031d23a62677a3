//! Configuration for the backend connection and create-mode defaults

use dotenv::dotenv;
use std::env;
use std::time::Duration;

use crate::data::{CoreError, DataPacket, Properties};

pub const ENV_API_ENDPOINT: &str = "NEO4J_API_ENDPOINT";
pub const ENV_USERNAME: &str = "NEO4J_USERNAME";
pub const ENV_PASSWORD: &str = "NEO4J_PASSWORD";
pub const ENV_TIMEOUT_SECS: &str = "NEO4J_TIMEOUT_SECS";
pub const ENV_DEFAULT_LABELS: &str = "NEOMAP_DEFAULT_LABELS";
pub const ENV_DEFAULT_PROPERTIES: &str = "NEOMAP_DEFAULT_PROPERTIES";
pub const ENV_DEFAULT_RELATIONSHIP_TYPE: &str = "NEOMAP_DEFAULT_RELATIONSHIP_TYPE";

/// Connection settings for the Neo4j transactional HTTP endpoint.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Transaction endpoint base, e.g. `http://localhost:7474/db/neo4j/tx`.
    pub api_endpoint: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_endpoint: "http://localhost:7474/db/neo4j/tx".to_string(),
            username: None,
            password: None,
            timeout: Duration::from_secs(30),
        }
    }
}

impl BackendConfig {
    /// URL of the single-request commit endpoint.
    pub fn commit_url(&self) -> String {
        format!("{}/commit", self.api_endpoint.trim_end_matches('/'))
    }
}

/// Content given to optimistic placeholders and to relationships drawn without a type.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateDefaults {
    pub labels: Vec<String>,
    pub properties: Properties,
    pub relationship_type: String,
}

impl Default for CreateDefaults {
    fn default() -> Self {
        Self {
            labels: Vec::new(),
            properties: Properties::new(),
            relationship_type: "RELATED_TO".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NeomapConfig {
    pub backend: BackendConfig,
    pub defaults: CreateDefaults,
}

impl NeomapConfig {
    /// Reads the configuration from the process environment, after loading `.env` if present.
    pub fn from_env() -> Result<Self, CoreError> {
        dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup. Unset variables keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = NeomapConfig::default();
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(endpoint) = get(ENV_API_ENDPOINT) {
            config.backend.api_endpoint = endpoint;
        }
        config.backend.username = get(ENV_USERNAME);
        config.backend.password = get(ENV_PASSWORD);
        if let Some(secs) = get(ENV_TIMEOUT_SECS) {
            let secs: u64 = secs.parse().map_err(|_| {
                CoreError::Configuration(format!("{} must be a whole number of seconds, got {:?}", ENV_TIMEOUT_SECS, secs))
            })?;
            config.backend.timeout = Duration::from_secs(secs);
        }

        if let Some(labels) = get(ENV_DEFAULT_LABELS) {
            config.defaults.labels = labels
                .split(',')
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(raw) = get(ENV_DEFAULT_PROPERTIES) {
            let value: serde_json::Value = serde_json::from_str(&raw).map_err(|e| {
                CoreError::Configuration(format!("{} is not valid JSON: {}", ENV_DEFAULT_PROPERTIES, e))
            })?;
            match DataPacket::from(value) {
                DataPacket::Object(props) => config.defaults.properties = props,
                _ => {
                    return Err(CoreError::Configuration(format!(
                        "{} must be a JSON object",
                        ENV_DEFAULT_PROPERTIES
                    )))
                }
            }
        }
        if let Some(rel_type) = get(ENV_DEFAULT_RELATIONSHIP_TYPE) {
            config.defaults.relationship_type = rel_type;
        }

        Ok(config)
    }
}
