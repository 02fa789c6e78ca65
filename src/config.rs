use crate::error::{BindingError, Result};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Configuration key holding the Slack bot token
pub const API_KEY: &str = "apiKey";

/// Configuration key holding the target channel id
pub const CHANNEL: &str = "channel";

/// File the persisted configuration map is stored under
pub const CONFIG_FILE_NAME: &str = "slack-config.json";

pub const DEFAULT_API_BASE_URL: &str = "https://slack.com/api";
const DEFAULT_CONFIG_DIR: &str = ".slack-binding";
const DEFAULT_INTEGRATIONS_FILE: &str = "config/integrations.yaml";

/// Process settings for the binding daemon
#[derive(Debug, Clone)]
pub struct Settings {
    pub api_base_url: String,
    pub config_dir: PathBuf,
    pub integrations_file: PathBuf,
    /// Explicit configuration seeds, passed to [`SlackConfig::init`]
    pub initial: HashMap<String, String>,
}

impl Settings {
    /// Build settings from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_base_url = lookup("SLACK_API_BASE_URL")
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        if !api_base_url.starts_with("http://") && !api_base_url.starts_with("https://") {
            return Err(BindingError::ConfigError(format!(
                "SLACK_API_BASE_URL must be an http(s) URL, got {}",
                api_base_url
            )));
        }

        let config_dir = lookup("SLACK_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_DIR));

        let integrations_file = lookup("SLACK_INTEGRATIONS_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_INTEGRATIONS_FILE));

        // Seeds are optional; empty values are treated as unset
        let mut initial = HashMap::new();
        for (var, key) in [("SLACK_API_KEY", API_KEY), ("SLACK_CHANNEL", CHANNEL)] {
            if let Some(value) = lookup(var).filter(|v| !v.is_empty()) {
                initial.insert(key.to_string(), value);
            }
        }

        Ok(Settings {
            api_base_url,
            config_dir,
            integrations_file,
            initial,
        })
    }
}

/// Load settings from environment variables
pub fn load_settings() -> Result<Settings> {
    Settings::from_lookup(|name| env::var(name).ok())
}

/// Durable backend for the configuration map
///
/// The payload is a single serialized JSON object holding the whole map.
pub trait ConfigStore: Send + Sync {
    /// Returns `None` when nothing has been persisted yet
    fn load(&self) -> Result<Option<String>>;

    fn save(&self, payload: &str) -> Result<()>;
}

/// Stores the configuration as `slack-config.json` inside a directory
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(CONFIG_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path).map_err(|e| {
            BindingError::PersistenceError(format!("Failed to read {:?}: {}", self.path, e))
        })?;
        Ok(Some(content))
    }

    fn save(&self, payload: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, payload).map_err(|e| {
            BindingError::PersistenceError(format!("Failed to write {:?}: {}", self.path, e))
        })
    }
}

/// In-process backend, useful when embedding the binding
#[derive(Default)]
pub struct MemoryConfigStore {
    payload: Mutex<Option<String>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_payload(payload: impl Into<String>) -> Self {
        Self {
            payload: Mutex::new(Some(payload.into())),
        }
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load(&self) -> Result<Option<String>> {
        Ok(self
            .payload
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, payload: &str) -> Result<()> {
        *self.payload.lock().unwrap_or_else(PoisonError::into_inner) = Some(payload.to_string());
        Ok(())
    }
}

/// Local key/value configuration for the Slack integration
///
/// Values passed explicitly to [`SlackConfig::init`] always win over
/// persisted ones. Every [`SlackConfig::set`] rewrites the whole map to the
/// attached store. Concurrent `set` calls are last-write-wins.
pub struct SlackConfig {
    values: RwLock<HashMap<String, String>>,
    store: Option<Arc<dyn ConfigStore>>,
}

impl SlackConfig {
    pub fn new(store: Option<Arc<dyn ConfigStore>>) -> Self {
        Self {
            values: RwLock::new(HashMap::new()),
            store,
        }
    }

    pub fn with_store(store: Arc<dyn ConfigStore>) -> Self {
        Self::new(Some(store))
    }

    /// Configuration without durable storage; `set` only touches memory
    pub fn in_memory() -> Self {
        Self::new(None)
    }

    /// Merge explicit values, then fill remaining gaps from the store
    pub fn init(&self, initial: HashMap<String, String>) {
        {
            let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
            values.extend(initial);
        }
        self.load_persisted();
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn set(&self, key: &str, value: &str) {
        let snapshot = {
            let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
            values.insert(key.to_string(), value.to_string());
            values.clone()
        };
        tracing::debug!("Updated Slack config key '{}'", key);
        self.persist(&snapshot);
    }

    /// Copy of the current map
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn load_persisted(&self) {
        let Some(store) = &self.store else {
            return;
        };

        let payload = match store.load() {
            Ok(Some(payload)) => payload,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!("Failed to load persisted Slack config: {}", e);
                return;
            }
        };

        let persisted: HashMap<String, String> = match serde_json::from_str(&payload) {
            Ok(persisted) => persisted,
            Err(e) => {
                tracing::warn!("Ignoring corrupt persisted Slack config: {}", e);
                return;
            }
        };

        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        let mut added = 0;
        for (key, value) in persisted {
            if !values.contains_key(&key) {
                values.insert(key, value);
                added += 1;
            }
        }
        tracing::debug!("Loaded {} persisted Slack config entries", added);
    }

    fn persist(&self, snapshot: &HashMap<String, String>) {
        let Some(store) = &self.store else {
            return;
        };

        let result = serde_json::to_string(snapshot)
            .map_err(BindingError::from)
            .and_then(|payload| store.save(&payload));

        if let Err(e) = result {
            tracing::error!("Failed to persist Slack config: {}", e);
        }
    }
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}
