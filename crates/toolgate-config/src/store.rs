use crate::endpoint::{ServiceConfig, StoredConfig};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::sync::RwLock;
use toolgate_core::{ToolGateError, ToolGateResult};
use tracing::info;

/// Persistence boundary for the service configuration document.
///
/// Legacy-format detection and one-time migration happen inside `load`.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Load the current configuration, migrating legacy documents.
    async fn load(&self) -> ToolGateResult<ServiceConfig>;
    /// Persist the configuration.
    async fn save(&self, config: &ServiceConfig) -> ToolGateResult<()>;
}

/// File-based configuration store (pretty-printed JSON on disk).
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    /// Create a store backed by the given file path. A missing file loads as
    /// the default (disabled, empty) configuration.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    async fn load(&self) -> ToolGateResult<ServiceConfig> {
        if !self.path.exists() {
            return Ok(ServiceConfig::default());
        }

        let data = tokio::fs::read_to_string(&self.path).await?;
        let stored: StoredConfig = serde_json::from_str(&data)
            .map_err(|e| ToolGateError::Config(format!("Failed to parse bridge config: {e}")))?;

        let (config, migrated) = stored.into_service_config();
        if migrated {
            info!(
                path = %self.path.display(),
                "Migrated legacy single-URL config to the endpoint list form"
            );
            self.save(&config).await?;
        }

        Ok(config)
    }

    async fn save(&self, config: &ServiceConfig) -> ToolGateResult<()> {
        let json = serde_json::to_string_pretty(config)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}

/// In-memory configuration store, for tests and embedded setups.
pub struct MemoryConfigStore {
    config: RwLock<ServiceConfig>,
}

impl MemoryConfigStore {
    /// Create a store seeded with the given configuration.
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config: RwLock::new(config),
        }
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn load(&self) -> ToolGateResult<ServiceConfig> {
        Ok(self.config.read().await.clone())
    }

    async fn save(&self, config: &ServiceConfig) -> ToolGateResult<()> {
        *self.config.write().await = config.clone();
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::endpoint::{EndpointStatus, MIGRATED_ENDPOINT_ID};

    #[tokio::test]
    async fn test_missing_file_loads_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConfigStore::new(dir.path().join("bridge.json"));

        let config = store.load().await.unwrap();
        assert!(!config.enabled);
        assert!(config.endpoints.is_empty());
    }

    #[tokio::test]
    async fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConfigStore::new(dir.path().join("bridge.json"));

        let mut config = ServiceConfig {
            enabled: true,
            ..ServiceConfig::default()
        };
        config.endpoints.push(crate::Endpoint::from_draft(
            serde_json::from_str(r#"{"name":"A","webSocketUrl":"wss://a.example/ws"}"#).unwrap(),
        ));

        store.save(&config).await.unwrap();
        let loaded = store.load().await.unwrap();
        assert!(loaded.enabled);
        assert_eq!(loaded.endpoints.len(), 1);
        assert_eq!(loaded.endpoints[0].name, "A");
    }

    #[tokio::test]
    async fn test_legacy_file_migrates_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.json");
        std::fs::write(
            &path,
            r#"{"enabled": true, "webSocketUrl": "wss://legacy.example/ws?token=t"}"#,
        )
        .unwrap();

        let store = FileConfigStore::new(&path);
        let config = store.load().await.unwrap();
        assert_eq!(config.endpoints.len(), 1);
        assert_eq!(config.endpoints[0].id, MIGRATED_ENDPOINT_ID);
        assert_eq!(
            config.endpoints[0].web_socket_url,
            "wss://legacy.example/ws?token=t"
        );
        assert_eq!(config.endpoints[0].status, EndpointStatus::Disconnected);

        // The migrated form was written back; the legacy field is gone.
        let raw = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert!(value.get("webSocketUrl").is_none());
        assert_eq!(value["endpoints"][0]["id"], MIGRATED_ENDPOINT_ID);

        // A second load does not migrate again.
        let config = store.load().await.unwrap();
        assert_eq!(config.endpoints.len(), 1);
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryConfigStore::new(ServiceConfig::default());
        let mut config = store.load().await.unwrap();
        assert!(!config.enabled);

        config.enabled = true;
        store.save(&config).await.unwrap();
        assert!(store.load().await.unwrap().enabled);
    }
}
