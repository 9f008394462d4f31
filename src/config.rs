use anyhow::{Context as AnyhowContext, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::constants;

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub server_url: Option<String>,
    pub token: Option<String>,
    pub use_system_proxy: Option<bool>,
    #[serde(default)]
    pub endpoints: EndpointConfig,
    #[serde(default)]
    pub stream: StreamConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct EndpointConfig {
    /// Path of the streaming search endpoint
    pub search: String,
    /// Path of the CSV export endpoint
    pub export: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            search: constants::DEFAULT_SEARCH_PATH.to_string(),
            export: constants::DEFAULT_EXPORT_PATH.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct StreamConfig {
    pub timeout_ms: u64,
    pub channel_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            timeout_ms: constants::SEARCH_TIMEOUT_MS,
            channel_capacity: constants::DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// One config file as written. Keys it leaves out keep the lower layer's value.
#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct ConfigLayer {
    pub server_url: Option<String>,
    pub token: Option<String>,
    pub use_system_proxy: Option<bool>,
    #[serde(default)]
    pub endpoints: EndpointLayer,
    #[serde(default)]
    pub stream: StreamLayer,
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct EndpointLayer {
    pub search: Option<String>,
    pub export: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct StreamLayer {
    pub timeout_ms: Option<u64>,
    pub channel_capacity: Option<usize>,
}

impl Config {
    /// Override every key `layer` sets.
    pub fn apply(&mut self, layer: &ConfigLayer) {
        if let Some(url) = &layer.server_url {
            self.server_url = Some(url.clone());
        }
        if let Some(token) = &layer.token {
            self.token = Some(token.clone());
        }
        if let Some(enabled) = layer.use_system_proxy {
            self.use_system_proxy = Some(enabled);
        }
        if let Some(search) = &layer.endpoints.search {
            self.endpoints.search = search.clone();
        }
        if let Some(export) = &layer.endpoints.export {
            self.endpoints.export = export.clone();
        }
        if let Some(timeout_ms) = layer.stream.timeout_ms {
            self.stream.timeout_ms = timeout_ms;
        }
        if let Some(capacity) = layer.stream.channel_capacity {
            self.stream.channel_capacity = capacity;
        }
    }
}

pub struct ConfigManager {
    global_config: Config,
    local_config: Option<ConfigLayer>,
    merged_config: Config,
    pub global_config_path: PathBuf,
    pub local_config_path: Option<PathBuf>,
}

const DEFAULT_CONFIG: &str = r#"# findstream configuration file

# Server hosting the find/replace API
# server_url = "http://localhost:8080"

# Optional: bearer token sent with every request
# token = "..."

# Optional: set to false to ignore HTTP_PROXY/HTTPS_PROXY
# use_system_proxy = true

# Optional: endpoint paths
# [endpoints]
# search = "/api/find-replace/search"
# export = "/api/find-replace/export"

# Optional: stream session tuning
# [stream]
# timeout_ms = 300000
# channel_capacity = 64
"#;

impl ConfigManager {
    /// Load the global config (creating it on first run) and the local one under `workspace_path`.
    pub fn new(workspace_path: Option<&Path>) -> Result<Self> {
        let global_config_dir = dirs::config_dir()
            .context("Could not find config directory")?
            .join(constants::GLOBAL_CONFIG_DIR_NAME);

        fs::create_dir_all(&global_config_dir)?;
        let global_config_path = global_config_dir.join(constants::CONFIG_FILENAME);
        if !global_config_path.exists() {
            fs::write(&global_config_path, DEFAULT_CONFIG).with_context(|| {
                format!(
                    "Failed to write default config to {}",
                    global_config_path.display()
                )
            })?;
        }

        let local_config_path = workspace_path.map(|workspace_path| {
            workspace_path
                .join(constants::FINDSTREAM_DIR_NAME)
                .join(constants::CONFIG_FILENAME)
        });

        Self::from_paths(global_config_path, local_config_path)
    }

    /// Load from explicit file locations; missing files count as empty configs.
    pub fn from_paths(global_config_path: PathBuf, local_config_path: Option<PathBuf>) -> Result<Self> {
        let mut global_config = Config::default();
        if let Some(layer) = load_config(&global_config_path)? {
            global_config.apply(&layer);
        }

        let local_config = match &local_config_path {
            Some(path) => load_config(path)?,
            None => None,
        };

        // Merge configs: local overrides global key by key
        let mut merged_config = global_config.clone();
        if let Some(ref local_config) = local_config {
            merged_config.apply(local_config);
        }

        Ok(Self {
            global_config,
            local_config,
            merged_config,
            global_config_path,
            local_config_path,
        })
    }

    /// Apply `FINDSTREAM_SERVER_URL` / `FINDSTREAM_TOKEN` on top of the files.
    pub fn with_env(self) -> Self {
        let server_url = std::env::var(constants::SERVER_URL_ENV).ok();
        let token = std::env::var(constants::TOKEN_ENV).ok();
        self.with_overrides(server_url, token)
    }

    /// Override server and token, e.g. from the command line. Empty values are ignored.
    pub fn with_overrides(mut self, server_url: Option<String>, token: Option<String>) -> Self {
        if let Some(url) = server_url.filter(|s| !s.trim().is_empty()) {
            debug!("Server URL overridden: {}", url);
            self.merged_config.server_url = Some(url);
        }
        if let Some(token) = token.filter(|s| !s.trim().is_empty()) {
            self.merged_config.token = Some(token);
        }
        self
    }

    pub fn global_config(&self) -> &Config {
        &self.global_config
    }

    /// Keys set by the local file, if there is one.
    pub fn local_config(&self) -> Option<&ConfigLayer> {
        self.local_config.as_ref()
    }

    /// Get the merged configuration (local overrides global)
    pub fn config(&self) -> &Config {
        &self.merged_config
    }
}

fn load_config(path: &Path) -> Result<Option<ConfigLayer>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config = toml::from_str(&content).unwrap_or_else(|e| {
        warn!("Ignoring invalid config {}: {}", path.display(), e);
        ConfigLayer::default()
    });
    debug!("Loaded config from {}", path.display());
    Ok(Some(config))
}
