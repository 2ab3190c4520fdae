use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub nasa: NasaConfig,
    pub gemini: GeminiConfig,
    pub prompt: PromptConfig,
    pub storage: StorageConfig,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct NasaConfig {
    pub api_key: String,
    pub apod_base_url: String,
    pub library_base_url: String,
}

impl Default for NasaConfig {
    fn default() -> Self {
        Self {
            api_key: nasa::DEMO_API_KEY.to_string(),
            apod_base_url: nasa::DEFAULT_APOD_BASE_URL.to_string(),
            library_base_url: nasa::DEFAULT_LIBRARY_BASE_URL.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: gemini::DEFAULT_MODEL.to_string(),
            base_url: gemini::DEFAULT_BASE_URL.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct PromptConfig {
    pub template: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

impl Config {
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("spacelog")
            .join("config.toml")
    }

    /// Reads the config file (missing file means defaults), then applies
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let config_path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::default_path);

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path).map_err(|e| {
                anyhow::anyhow!(
                    "failed to read config file at {}: {}",
                    config_path.display(),
                    e
                )
            })?;
            Self::from_toml_str(&content)?
        } else {
            if path.is_some() {
                anyhow::bail!("config file not found at {}", config_path.display());
            }
            Self::default()
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).map_err(|e| anyhow::anyhow!("failed to parse config file: {}", e))
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        if let Some(key) = non_empty("NASA_API_KEY") {
            self.nasa.api_key = key;
        }
        if let Some(key) = non_empty("GEMINI_API_KEY") {
            self.gemini.api_key = Some(key);
        }
        if let Some(db) = non_empty("SPACELOG_DB") {
            self.storage.db_path = Some(PathBuf::from(db));
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.storage
            .db_path
            .clone()
            .unwrap_or_else(store_sqlite::SqliteStore::default_path)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_secs.max(1))
    }

    pub fn gemini_api_key(&self) -> anyhow::Result<&str> {
        self.gemini
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "no Gemini API key configured; set GEMINI_API_KEY or gemini.api_key in {}",
                    Self::default_path().display()
                )
            })
    }
}
