use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub vault: VaultConfig,
    #[serde(default)]
    pub hosting: HostingConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VaultConfig {
    #[serde(default = "default_vault_root")]
    pub root: PathBuf,
    /// Folder for status/log/overview notes.
    #[serde(default = "default_git_folder")]
    pub git_folder: String,
    /// Folder for branch comparison notes.
    #[serde(default = "default_branch_folder")]
    pub branch_folder: String,
    /// Folder for issue and pull-request digest notes.
    #[serde(default = "default_digest_folder")]
    pub digest_folder: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            root: default_vault_root(),
            git_folder: default_git_folder(),
            branch_folder: default_branch_folder(),
            digest_folder: default_digest_folder(),
        }
    }
}

fn default_vault_root() -> PathBuf {
    PathBuf::from("./vault")
}
fn default_git_folder() -> String {
    "Git Analysis".to_string()
}
fn default_branch_folder() -> String {
    "Branch Analysis".to_string()
}
fn default_digest_folder() -> String {
    "Hosting Digests".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct HostingConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Environment variable holding the bearer credential. Absence of the
    /// variable is legal; the client runs in the lower-quota anonymous mode.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HostingConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            token_env: default_token_env(),
            per_page: default_per_page(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}
fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}
fn default_per_page() -> u32 {
    50
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    500
}

impl Config {
    /// Defaults for tests and for running without a config file.
    pub fn minimal() -> Self {
        Config::default()
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.hosting.api_base.is_empty() {
        anyhow::bail!("hosting.api_base must not be empty");
    }

    if config.hosting.per_page == 0 || config.hosting.per_page > 100 {
        anyhow::bail!("hosting.per_page must be in 1..=100");
    }

    if config.retry.max_attempts == 0 || config.retry.max_attempts > 10 {
        anyhow::bail!("retry.max_attempts must be in 1..=10");
    }

    Ok(config)
}
