//! Application configuration for Voice Bolt.
//!
//! User config lives at `~/.voicebolt/voicebolt.toml`.
//! CLI flags override config file values, which override defaults.
//! API keys are never stored here, only the names of the env vars holding them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::backoff::BackoffPolicy;
use crate::error::{Result, VoiceBoltError};
use crate::keys::EnvKeySource;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "voicebolt.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".voicebolt";

/// Default ledger database file name.
const LEDGER_FILE_NAME: &str = "voicebolt.db";

// ---------------------------------------------------------------------------
// Config structs (matching voicebolt.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Voice platform settings.
    #[serde(default)]
    pub platform: PlatformConfig,

    /// Content-extraction service settings.
    #[serde(default)]
    pub firecrawl: FirecrawlConfig,

    /// Multi-page crawl defaults.
    #[serde(default)]
    pub crawl: CrawlConfig,

    /// Knowledge association reconciler settings.
    #[serde(default)]
    pub association: AssociationConfig,

    /// End-to-end creation pipeline settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// `[platform]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    #[serde(default = "default_platform_url")]
    pub base_url: String,

    /// Name of the env var holding the API key.
    #[serde(default = "default_platform_key_env")]
    pub api_key_env: String,

    /// Agent conversation language.
    #[serde(default = "default_language")]
    pub language: String,

    /// Optional TTS voice; the platform picks its default when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,

    #[serde(default = "default_platform_timeout")]
    pub timeout_secs: u64,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            base_url: default_platform_url(),
            api_key_env: default_platform_key_env(),
            language: default_language(),
            voice_id: None,
            timeout_secs: default_platform_timeout(),
        }
    }
}

impl PlatformConfig {
    /// Key source reading [`api_key_env`](Self::api_key_env).
    pub fn key_source(&self) -> EnvKeySource {
        EnvKeySource::new("voice platform", &self.api_key_env)
    }
}

fn default_platform_url() -> String {
    "https://api.elevenlabs.io/v1".into()
}
fn default_platform_key_env() -> String {
    "ELEVENLABS_API_KEY".into()
}
fn default_language() -> String {
    "en".into()
}
fn default_platform_timeout() -> u64 {
    30
}

/// `[firecrawl]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirecrawlConfig {
    #[serde(default = "default_firecrawl_url")]
    pub base_url: String,

    /// Name of the env var holding the API key.
    #[serde(default = "default_firecrawl_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_firecrawl_timeout")]
    pub timeout_secs: u64,
}

impl Default for FirecrawlConfig {
    fn default() -> Self {
        Self {
            base_url: default_firecrawl_url(),
            api_key_env: default_firecrawl_key_env(),
            timeout_secs: default_firecrawl_timeout(),
        }
    }
}

impl FirecrawlConfig {
    /// Key source reading [`api_key_env`](Self::api_key_env).
    pub fn key_source(&self) -> EnvKeySource {
        EnvKeySource::new("firecrawl", &self.api_key_env)
    }
}

fn default_firecrawl_url() -> String {
    "https://api.firecrawl.dev/v1".into()
}
fn default_firecrawl_key_env() -> String {
    "FIRECRAWL_API_KEY".into()
}
fn default_firecrawl_timeout() -> u64 {
    60
}

/// `[crawl]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// Maximum number of pages per crawl job.
    #[serde(default = "default_crawl_limit")]
    pub limit: u32,

    /// Maximum link-following depth from the root URL.
    #[serde(default = "default_crawl_depth")]
    pub max_depth: u32,

    /// Path patterns a page must match (empty means all).
    #[serde(default)]
    pub include_paths: Vec<String>,

    /// Path patterns that exclude a page.
    #[serde(default)]
    pub exclude_paths: Vec<String>,

    /// Status polling schedule.
    #[serde(default = "BackoffPolicy::crawl_poll")]
    pub poll: BackoffPolicy,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            limit: default_crawl_limit(),
            max_depth: default_crawl_depth(),
            include_paths: Vec::new(),
            exclude_paths: Vec::new(),
            poll: BackoffPolicy::crawl_poll(),
        }
    }
}

fn default_crawl_limit() -> u32 {
    25
}
fn default_crawl_depth() -> u32 {
    2
}

/// `[association]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssociationConfig {
    /// Wait schedule before re-checking that a link propagated.
    #[serde(default = "BackoffPolicy::settle")]
    pub settle: BackoffPolicy,
}

impl Default for AssociationConfig {
    fn default() -> Self {
        Self {
            settle: BackoffPolicy::settle(),
        }
    }
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Abort agent creation when the knowledge upload fails.
    #[serde(default)]
    pub require_knowledge: bool,

    /// Record created agents in the local ledger.
    #[serde(default = "default_true")]
    pub ledger: bool,

    /// Ledger database path (defaults to `~/.voicebolt/voicebolt.db`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_path: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            require_knowledge: false,
            ledger: true,
            ledger_path: None,
        }
    }
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.voicebolt/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| VoiceBoltError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.voicebolt/voicebolt.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Resolve the ledger database path from config, falling back to the config dir.
pub fn ledger_path(config: &AppConfig) -> Result<PathBuf> {
    match &config.pipeline.ledger_path {
        Some(p) => Ok(PathBuf::from(p)),
        None => Ok(config_dir()?.join(LEDGER_FILE_NAME)),
    }
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| VoiceBoltError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| VoiceBoltError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| VoiceBoltError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| VoiceBoltError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| VoiceBoltError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
