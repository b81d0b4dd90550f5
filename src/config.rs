//! Configuration loading and validation.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then the
//! process environment (which `.env` is loaded into at startup). The result is
//! validated once into [`Config`] and never mutated afterwards.

use crate::UserId;
use crate::error::{ConfigError, Result};

use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// File name of the optional TOML config inside the instance config directory.
const CONFIG_FILE_NAME: &str = "config.toml";

/// monitor-study configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Data directory path. Holds the persisted toggle.
    pub data_dir: PathBuf,

    /// Who is watched and who may flip the switch.
    pub monitor: MonitorConfig,

    /// Completion endpoint coordinates.
    pub llm: LlmConfig,
}

/// Monitoring behavior configuration.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Toggle value used when no persisted state exists.
    pub enabled_by_default: bool,

    /// Accounts subject to monitoring.
    pub watched_users: Arc<HashSet<UserId>>,

    /// Authorization policy for the admin commands.
    pub admin_policy: AdminPolicy,
}

/// Which actors may run the enable/disable commands. Fixed per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminPolicy {
    /// Only the configured administrator.
    AllowList { admin: UserId },
    /// Anyone who is not on the watch-list.
    DenyWatched,
}

/// Completion endpoint configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Base URL without a trailing slash, e.g. `https://api.example.com/v1`.
    pub base_url: String,

    /// Bearer token.
    pub api_token: String,

    /// Model name sent with every request.
    pub model: String,

    /// System prompt sent with every request.
    pub system_prompt: String,
}

/// Unvalidated configuration as read from one source. Every field is optional
/// so sources can be layered.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    pub data_dir: Option<PathBuf>,
    pub monitor_status: Option<bool>,
    pub monitor_qq_numbers: Option<Vec<UserId>>,
    pub admin_policy: Option<String>,
    pub monitor_admin_qq: Option<UserId>,
    pub prompt: Option<String>,
    pub one_api_url: Option<String>,
    pub one_api_token: Option<String>,
    pub one_api_model: Option<String>,
}

impl RawConfig {
    /// Parse a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|error| ConfigError::Load {
            path: path.display().to_string(),
            source: Arc::new(error),
        })?;

        toml::from_str(&content).map_err(|error| {
            ConfigError::Parse {
                path: path.display().to_string(),
                message: error.to_string(),
            }
            .into()
        })
    }

    /// Read values from an environment lookup. Keys are upper-case
    /// (`ONE_API_URL`); the lower-case form is accepted as well.
    pub fn from_env_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| {
            lookup(&key.to_ascii_uppercase())
                .or_else(|| lookup(key))
                .filter(|value| !value.trim().is_empty())
        };

        let monitor_status = get("monitor_status")
            .map(|value| parse_bool("monitor_status", &value))
            .transpose()?;
        let monitor_qq_numbers = get("monitor_qq_numbers")
            .map(|value| parse_user_ids("monitor_qq_numbers", &value))
            .transpose()?;
        let monitor_admin_qq = get("monitor_admin_qq")
            .map(|value| parse_user_id("monitor_admin_qq", &value))
            .transpose()?;

        Ok(Self {
            data_dir: get("monitor_data_dir").map(PathBuf::from),
            monitor_status,
            monitor_qq_numbers,
            admin_policy: get("admin_policy"),
            monitor_admin_qq,
            prompt: get("prompt"),
            one_api_url: get("one_api_url"),
            one_api_token: get("one_api_token"),
            one_api_model: get("one_api_model"),
        })
    }

    /// Read values from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Overlay `other` on top of `self`; values present in `other` win.
    pub fn merge(self, other: RawConfig) -> Self {
        Self {
            data_dir: other.data_dir.or(self.data_dir),
            monitor_status: other.monitor_status.or(self.monitor_status),
            monitor_qq_numbers: other.monitor_qq_numbers.or(self.monitor_qq_numbers),
            admin_policy: other.admin_policy.or(self.admin_policy),
            monitor_admin_qq: other.monitor_admin_qq.or(self.monitor_admin_qq),
            prompt: other.prompt.or(self.prompt),
            one_api_url: other.one_api_url.or(self.one_api_url),
            one_api_token: other.one_api_token.or(self.one_api_token),
            one_api_model: other.one_api_model.or(self.one_api_model),
        }
    }
}

impl Config {
    /// Load configuration from the default config file (if present) and the environment.
    pub fn load() -> Result<Self> {
        let default_path = Self::default_instance_dir().join(CONFIG_FILE_NAME);
        let file = if default_path.exists() {
            RawConfig::from_file(&default_path)?
        } else {
            RawConfig::default()
        };
        Self::from_raw(file.merge(RawConfig::from_env()?))
    }

    /// Load from a specific config file path, with environment overrides.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let file = RawConfig::from_file(path)?;
        Self::from_raw(file.merge(RawConfig::from_env()?))
    }

    /// Validate raw values into a configuration.
    pub fn from_raw(raw: RawConfig) -> Result<Self> {
        let base_url = raw
            .one_api_url
            .unwrap_or_default()
            .trim()
            .trim_end_matches('/')
            .to_string();
        if base_url.is_empty() {
            return Err(ConfigError::MissingKey("one_api_url".into()).into());
        }
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Invalid(format!(
                "one_api_url must be an http(s) URL, got {base_url:?}"
            ))
            .into());
        }

        let model = raw.one_api_model.unwrap_or_default().trim().to_string();
        if model.is_empty() {
            return Err(ConfigError::MissingKey("one_api_model".into()).into());
        }

        let api_token = raw.one_api_token.unwrap_or_default().trim().to_string();
        if api_token.is_empty() {
            tracing::warn!("one_api_token is empty, requests will carry an empty bearer token");
        }

        let system_prompt = raw.prompt.unwrap_or_default().trim().to_string();

        let watched_users: HashSet<UserId> =
            raw.monitor_qq_numbers.unwrap_or_default().into_iter().collect();

        let admin_policy = match raw.admin_policy.as_deref().map(str::trim) {
            None | Some("allow_list") => {
                let admin = raw.monitor_admin_qq.ok_or_else(|| {
                    ConfigError::Invalid(
                        "admin_policy \"allow_list\" requires monitor_admin_qq".into(),
                    )
                })?;
                AdminPolicy::AllowList { admin }
            }
            Some("deny_watched") => AdminPolicy::DenyWatched,
            Some(other) => {
                return Err(ConfigError::Invalid(format!(
                    "unknown admin_policy {other:?}, expected \"allow_list\" or \"deny_watched\""
                ))
                .into());
            }
        };

        let data_dir = raw.data_dir.unwrap_or_else(Self::default_data_dir);

        Ok(Self {
            data_dir,
            monitor: MonitorConfig {
                enabled_by_default: raw.monitor_status.unwrap_or(true),
                watched_users: Arc::new(watched_users),
                admin_policy,
            },
            llm: LlmConfig {
                base_url,
                api_token,
                model,
                system_prompt,
            },
        })
    }

    /// Directory searched for `config.toml` when no path is given.
    pub fn default_instance_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("monitor-study"))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .map(|d| d.join("monitor-study"))
            .unwrap_or_else(|| PathBuf::from("./data"))
    }

    /// Get the persisted toggle path.
    pub fn state_path(&self) -> PathBuf {
        self.data_dir.join(crate::settings::STATE_FILE_NAME)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(ConfigError::Invalid(format!("{key}: expected a boolean, got {other:?}")).into()),
    }
}

fn parse_user_id(key: &str, value: &str) -> Result<UserId> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{key}: {value:?} is not a user id")).into())
}

/// Accepts a JSON list (`[1, 2]`) or a comma/whitespace separated list (`1, 2`).
fn parse_user_ids(key: &str, value: &str) -> Result<Vec<UserId>> {
    let trimmed = value.trim();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).map_err(|error| {
            ConfigError::Invalid(format!("{key}: invalid JSON list: {error}")).into()
        });
    }

    trimmed
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .map(|part| parse_user_id(key, part))
        .collect()
}
