//! Configuration management for the client.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Credentials for the shared remote store.
///
/// A connection is only attempted once all three fields are present; the
/// struct is persisted locally so a configured client reconnects on the
/// next start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConfig {
    /// Backend endpoint URL
    pub database_url: String,
    /// API key or token
    pub api_key: String,
    /// Project namespace the datasets live under
    pub project_id: String,
}

impl RemoteConfig {
    /// Create a remote configuration.
    pub fn new(
        database_url: impl Into<String>,
        api_key: impl Into<String>,
        project_id: impl Into<String>,
    ) -> Self {
        Self {
            database_url: database_url.into(),
            api_key: api_key.into(),
            project_id: project_id.into(),
        }
    }

    /// Whether every field needed for a connection attempt is present.
    pub fn is_complete(&self) -> bool {
        !self.database_url.trim().is_empty()
            && !self.api_key.trim().is_empty()
            && !self.project_id.trim().is_empty()
    }
}

/// Client configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the persisted catalog
    pub data_dir: PathBuf,
    /// Remote credentials, when all three variables are set
    pub remote: Option<RemoteConfig>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Every variable is optional: `CREMA_DATA_DIR` defaults to
    /// `./crema-data`, and the remote is only configured when
    /// `CREMA_DATABASE_URL`, `CREMA_API_KEY` and `CREMA_PROJECT_ID` are all
    /// present.
    pub fn from_env() -> Self {
        let data_dir = env::var("CREMA_DATA_DIR")
            .unwrap_or_else(|_| "./crema-data".to_string())
            .into();

        let remote = RemoteConfig::new(
            env::var("CREMA_DATABASE_URL").unwrap_or_default(),
            env::var("CREMA_API_KEY").unwrap_or_default(),
            env::var("CREMA_PROJECT_ID").unwrap_or_default(),
        );

        Self {
            data_dir,
            remote: remote.is_complete().then_some(remote),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incomplete_config_is_detected() {
        let config = RemoteConfig::new("https://db.example.com", "", "crema-prod");
        assert!(!config.is_complete());

        let config = RemoteConfig::new("  ", "key", "crema-prod");
        assert!(!config.is_complete());

        let config = RemoteConfig::new("https://db.example.com", "key", "crema-prod");
        assert!(config.is_complete());
    }

    #[test]
    fn serialization_format() {
        let config = RemoteConfig::new("https://db.example.com", "key", "crema-prod");
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("databaseUrl")); // camelCase
        assert!(json.contains("apiKey"));
        assert!(json.contains("projectId"));
    }

    #[test]
    fn serialization_roundtrip() {
        let config = RemoteConfig::new("https://db.example.com", "key", "crema-prod");
        let json = serde_json::to_string(&config).unwrap();
        let parsed: RemoteConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, parsed);
    }
}
