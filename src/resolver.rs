//! Two-tier setting lookup.
//!
//! Slack settings are resolved through a chain of sources in priority order:
//! an external integration manager (when one could be loaded), then the local
//! [`SlackConfig`]. The first source yielding a non-empty value wins; an
//! empty string falls through exactly like a missing value.

use crate::config::{SlackConfig, API_KEY, CHANNEL};
use crate::error::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Namespace the Slack settings live under in the integration manager
pub const SLACK_NAMESPACE: &str = "slack";

/// External credential/config provider consulted before local configuration
#[async_trait]
pub trait IntegrationManager: Send + Sync {
    async fn get_integration_config(&self, namespace: &str, key: &str) -> Option<String>;
}

pub type DynIntegrationManager = Arc<dyn IntegrationManager>;

/// Integration manager backed by a YAML file of `namespace -> key -> value`
///
/// ```yaml
/// slack:
///   apiKey: xoxb-...
///   channel: C0123456
/// ```
///
/// Namespaces are kept as raw YAML so a nested section belonging to another
/// integration never prevents the file from loading.
#[derive(Debug, Default, Deserialize)]
#[serde(transparent)]
pub struct FileIntegrationManager {
    integrations: HashMap<String, serde_yaml::Value>,
}

impl FileIntegrationManager {
    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }
}

#[async_trait]
impl IntegrationManager for FileIntegrationManager {
    async fn get_integration_config(&self, namespace: &str, key: &str) -> Option<String> {
        match self.integrations.get(namespace)?.get(key)? {
            serde_yaml::Value::String(value) => Some(value.clone()),
            serde_yaml::Value::Number(value) => Some(value.to_string()),
            serde_yaml::Value::Bool(value) => Some(value.to_string()),
            _ => None,
        }
    }
}

/// Load the integration manager if its file exists and parses
///
/// Any failure leaves the capability absent; local configuration still works.
pub fn load_integration_manager(path: &Path) -> Option<DynIntegrationManager> {
    if !path.exists() {
        tracing::debug!("No integration manager at {:?}", path);
        return None;
    }

    match FileIntegrationManager::load(path) {
        Ok(manager) => {
            tracing::info!("Loaded integration manager from {:?}", path);
            Some(Arc::new(manager))
        }
        Err(e) => {
            tracing::warn!("Integration manager unavailable ({:?}): {}", path, e);
            None
        }
    }
}

/// One tier of the setting lookup
#[async_trait]
pub trait SettingSource: Send + Sync {
    async fn lookup(&self, key: &str) -> Option<String>;

    /// Short label used in diagnostics
    fn name(&self) -> &'static str;
}

pub type DynSettingSource = Arc<dyn SettingSource>;

/// Reads settings from an integration manager under a fixed namespace
pub struct IntegrationSource {
    manager: DynIntegrationManager,
    namespace: &'static str,
}

impl IntegrationSource {
    pub fn new(manager: DynIntegrationManager) -> Self {
        Self {
            manager,
            namespace: SLACK_NAMESPACE,
        }
    }
}

#[async_trait]
impl SettingSource for IntegrationSource {
    async fn lookup(&self, key: &str) -> Option<String> {
        self.manager
            .get_integration_config(self.namespace, key)
            .await
    }

    fn name(&self) -> &'static str {
        "integration-manager"
    }
}

#[async_trait]
impl SettingSource for SlackConfig {
    async fn lookup(&self, key: &str) -> Option<String> {
        self.get(key)
    }

    fn name(&self) -> &'static str {
        "local-config"
    }
}

/// Resolves settings across sources, first non-empty value wins
#[derive(Clone)]
pub struct SettingResolver {
    sources: Vec<DynSettingSource>,
}

impl SettingResolver {
    /// Sources ordered by precedence (highest priority first)
    pub fn new(sources: Vec<DynSettingSource>) -> Self {
        Self { sources }
    }

    /// Standard chain: integration manager (if loaded), then local config
    pub fn chain(integration: Option<DynIntegrationManager>, local: Arc<SlackConfig>) -> Self {
        let mut sources: Vec<DynSettingSource> = Vec::new();

        if let Some(manager) = integration {
            sources.push(Arc::new(IntegrationSource::new(manager)));
        }

        sources.push(local);

        Self::new(sources)
    }

    pub async fn resolve(&self, key: &str) -> Option<String> {
        for source in &self.sources {
            match source.lookup(key).await {
                Some(value) if !value.is_empty() => {
                    tracing::trace!("Resolved '{}' from {}", key, source.name());
                    return Some(value);
                }
                _ => continue,
            }
        }
        None
    }

    pub async fn api_key(&self) -> Option<String> {
        self.resolve(API_KEY).await
    }

    pub async fn channel(&self) -> Option<String> {
        self.resolve(CHANNEL).await
    }
}

/// Result of [`initialize_slack_config`]
pub struct InitializedConfig {
    /// Integration manager handle, absent when none could be loaded
    pub integration: Option<DynIntegrationManager>,
    pub config: Arc<SlackConfig>,
}

impl InitializedConfig {
    pub fn resolver(&self) -> SettingResolver {
        SettingResolver::chain(self.integration.clone(), self.config.clone())
    }
}

/// Seed and load the local configuration, and try to load the integration manager
pub fn initialize_slack_config(
    initial: HashMap<String, String>,
    config: SlackConfig,
    integrations_file: &Path,
) -> InitializedConfig {
    config.init(initial);
    InitializedConfig {
        integration: load_integration_manager(integrations_file),
        config: Arc::new(config),
    }
}
