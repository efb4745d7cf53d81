use crate::presets::DEFAULT_HISTORY_LIMIT;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformSetting {
    /// Validate for the platform the engine runs on
    #[default]
    Auto,
    Windows,
    Macos,
    Linux,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CasePolicySetting {
    /// Follow the platform's usual volume behavior
    #[default]
    Platform,
    Sensitive,
    Insensitive,
    /// Probe the working directory
    Detect,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortSetting {
    #[default]
    Lexicographic,
    Natural,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DefaultsConfig {
    /// Naming rules to validate against
    #[serde(default)]
    pub platform: PlatformSetting,

    /// How names are compared for collisions
    #[serde(default)]
    pub case_policy: CasePolicySetting,

    /// Whether new batches keep themselves sorted
    #[serde(default = "default_true")]
    pub autosort: bool,

    #[serde(default)]
    pub sort: SortSetting,

    /// Maximum undo entries kept (None = unbounded)
    #[serde(default)]
    pub undo_limit: Option<usize>,

    /// Maximum applied rules remembered
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Reject adding folders to a batch of files and vice versa
    #[serde(default = "default_true")]
    pub enforce_uniform_type: bool,

    /// Append a line per filesystem step to this file
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            platform: PlatformSetting::Auto,
            case_policy: CasePolicySetting::Platform,
            autosort: true,
            sort: SortSetting::Lexicographic,
            undo_limit: None,
            history_limit: DEFAULT_HISTORY_LIMIT,
            enforce_uniform_type: true,
            log_file: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_history_limit() -> usize {
    DEFAULT_HISTORY_LIMIT
}

impl Config {
    /// Load config from .rerename/config.toml if it exists
    pub fn load() -> Result<Self> {
        if let Ok(cwd) = std::env::current_dir() {
            let config_path = cwd.join(".rerename").join("config.toml");
            if config_path.exists() {
                return Self::load_from_path(&config_path);
            }
        }

        Ok(Self::default())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))
    }
}
