use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

use crate::driver::WaitPolicy;
use crate::error::ConfigError;
use crate::schema::{builtin, RetryLadder, Tier};

/// Environment variable holding the OpenAI credential.
pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub catalog: CatalogConfig,
    pub storage: StorageConfig,
    pub db: DbConfig,
    #[serde(default)]
    pub navigation: NavigationConfig,
    #[serde(default)]
    pub tiers: Vec<Tier>,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CatalogConfig {
    pub base_url: String,
    #[serde(default = "default_start_path")]
    pub start_path: String,
    #[serde(default = "default_category_selectors")]
    pub category_selectors: Vec<String>,
    #[serde(default = "default_product_selectors")]
    pub product_selectors: Vec<String>,
    #[serde(default = "default_internal_link_selectors")]
    pub internal_link_selectors: Vec<String>,
    #[serde(default = "default_content_selectors")]
    pub content_selectors: Vec<String>,
}

fn default_start_path() -> String {
    "/".to_string()
}
fn default_category_selectors() -> Vec<String> {
    vec![
        "nav .category-menu a[href]".to_string(),
        ".category-list a[href]".to_string(),
        "a.category-link[href]".to_string(),
    ]
}
fn default_product_selectors() -> Vec<String> {
    vec![
        ".product-grid .product-card a[href]".to_string(),
        ".product-list a[href]".to_string(),
        "a.product-link[href]".to_string(),
    ]
}
fn default_internal_link_selectors() -> Vec<String> {
    vec![
        ".resource-list a[href]".to_string(),
        ".product-documents a[href]".to_string(),
        ".downloads a[href]".to_string(),
    ]
}
fn default_content_selectors() -> Vec<String> {
    vec![
        "main".to_string(),
        "article".to_string(),
        "body".to_string(),
    ]
}

impl CatalogConfig {
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// The catalog origin as a directory URL, so relative paths join beneath it.
    pub fn origin(&self) -> Result<Url, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidUrl {
            field: "catalog.base_url",
            value: self.base_url.clone(),
            reason,
        };
        let url = Url::parse(&format!("{}/", self.base_url().trim()))
            .map_err(|e| invalid(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") || !url.has_host() {
            return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
        }
        Ok(url)
    }

    pub fn start_url(&self) -> Result<String, ConfigError> {
        let path = self.start_path.trim().trim_start_matches('/');
        self.origin()?
            .join(path)
            .map(String::from)
            .map_err(|e| ConfigError::InvalidUrl {
                field: "catalog.start_path",
                value: self.start_path.clone(),
                reason: e.to_string(),
            })
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NavigationConfig {
    #[serde(default)]
    pub wait: WaitPolicy,
    /// Primary pass timeout; `0` waits indefinitely.
    #[serde(default)]
    pub primary_timeout_secs: u64,
    #[serde(default = "default_retry_timeout_secs")]
    pub retry_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            wait: WaitPolicy::default(),
            primary_timeout_secs: 0,
            retry_timeout_secs: default_retry_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_retry_timeout_secs() -> u64 {
    30
}
fn default_user_agent() -> String {
    concat!("catalog-harvest/", env!("CARGO_PKG_VERSION")).to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

impl EmbeddingConfig {
    pub fn is_remote(&self) -> bool {
        self.provider == "openai"
    }
}

fn default_embedding_provider() -> String {
    "vocabulary".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: None,
            system_prompt: default_system_prompt(),
            top_k: default_top_k(),
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

fn default_generation_provider() -> String {
    "disabled".to_string()
}
fn default_system_prompt() -> String {
    "You answer questions about a product catalog. Use only the provided context. \
     If the context does not contain the answer, say so."
        .to_string()
}
fn default_top_k() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

impl Config {
    /// The configured retry ladder, or the built-in one when no tiers are declared.
    pub fn ladder(&self) -> Result<RetryLadder> {
        if self.tiers.is_empty() {
            return Ok(builtin::ladder());
        }
        RetryLadder::new(self.tiers.clone()).context("Invalid [[tiers]] configuration")
    }

    /// True when any configured provider calls OpenAI.
    pub fn needs_openai(&self) -> bool {
        self.embedding.is_remote() || self.generation.provider == "openai"
    }
}

/// Read a required credential from the environment.
pub fn credential(name: &'static str) -> Result<String, ConfigError> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::MissingCredential { name }),
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate catalog
    config.catalog.start_url()?;
    for (name, chain) in [
        ("category_selectors", &config.catalog.category_selectors),
        ("product_selectors", &config.catalog.product_selectors),
        ("internal_link_selectors", &config.catalog.internal_link_selectors),
        ("content_selectors", &config.catalog.content_selectors),
    ] {
        if chain.is_empty() || chain.iter().any(|s| s.trim().is_empty()) {
            anyhow::bail!("catalog.{} must be a non-empty list of selectors", name);
        }
    }

    // Validate tiers
    config.ladder()?;

    // Validate embedding
    match config.embedding.provider.as_str() {
        "vocabulary" => {}
        "openai" => {
            if config.embedding.model.is_none() {
                anyhow::bail!("embedding.model must be specified when provider is 'openai'");
            }
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                anyhow::bail!("embedding.dims must be > 0 when provider is 'openai'");
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be vocabulary or openai.",
            other
        ),
    }
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }

    // Validate generation
    match config.generation.provider.as_str() {
        "disabled" => {}
        "openai" => {
            if config.generation.model.is_none() {
                anyhow::bail!("generation.model must be specified when provider is 'openai'");
            }
        }
        other => anyhow::bail!(
            "Unknown generation provider: '{}'. Must be disabled or openai.",
            other
        ),
    }
    if config.generation.top_k == 0 {
        anyhow::bail!("generation.top_k must be >= 1");
    }

    Ok(config)
}
