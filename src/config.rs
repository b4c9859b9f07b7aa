use serde::Deserialize;
use std::path::Path;

use crate::entry_cache::DEFAULT_MAX_ENTRIES;
use crate::feed_cache::DEFAULT_MAX_ITEMS;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Refresh interval in minutes
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: u64,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Categories used when neither the request nor the session names any
    #[serde(default)]
    pub default_categories: Vec<String>,
    #[serde(default)]
    pub news: NewsConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub content: ContentConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

fn default_refresh_interval() -> u64 {
    15
}

fn default_bind_address() -> String {
    "0.0.0.0:3000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NewsConfig {
    pub base_url: String,
    pub timespan: String,
    pub sort: String,
    /// Broad query used when every selected category comes back empty
    pub fallback_query: String,
    pub page_size: usize,
    pub timeout_secs: u64,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.gdeltproject.org/api/v2/doc/doc".to_string(),
            timespan: "7days".to_string(),
            sort: "HybridRel".to_string(),
            fallback_query: "breaking news world technology business sports".to_string(),
            page_size: 10,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub max_items: usize,
    /// Cap for the readable-content, summary and translation caches
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_items: DEFAULT_MAX_ITEMS,
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ContentConfig {
    /// Readability proxy; the article URL is appended as `/http://host/path`
    pub proxy_base_url: String,
    /// Deadline for the readable-content fetch, in seconds
    pub timeout_secs: u64,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            proxy_base_url: "https://r.jina.ai".to_string(),
            timeout_secs: 12,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChatConfig {
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.sarvam.ai".to_string(),
            model: "sarvam-m".to_string(),
            api_key_env: "DAILY_TRENDS_CHAT_API_KEY".to_string(),
        }
    }
}

impl ChatConfig {
    /// The API key from the environment, if set and not blank.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Parse config from a TOML string (useful for testing)
    pub fn from_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            refresh_interval: default_refresh_interval(),
            bind_address: default_bind_address(),
            default_categories: Vec::new(),
            news: NewsConfig::default(),
            cache: CacheConfig::default(),
            content: ContentConfig::default(),
            chat: ChatConfig::default(),
        }
    }
}
