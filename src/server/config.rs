use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::db::retention::{RetentionMode, RetentionPolicy};
use crate::monitoring::prober::DEFAULT_USER_AGENT;
use crate::monitoring::SchedulerSettings;
use crate::notifications::service::DEFAULT_ALERT_TEMPLATE;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse TOML from config file at {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("Failed to load config from environment: {0}")]
    Env(#[from] envy::Error),
    #[error("{0} is required")]
    Missing(&'static str),
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub database_url: String,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,

    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    #[serde(default = "default_min_check_interval_minutes")]
    pub min_check_interval_minutes: i32,

    #[serde(default = "default_retention_keep_recent")]
    pub retention_keep_recent: usize,

    #[serde(default = "default_retention_max_records")]
    pub retention_max_records: usize,

    #[serde(default)]
    pub retention_mode: RetentionMode,

    #[serde(default = "default_retention_sweep_interval_secs")]
    pub retention_sweep_interval_secs: u64,

    #[serde(default = "default_snippet_limit")]
    pub snippet_limit: usize,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_alert_message_template")]
    pub alert_message_template: String,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
struct PartialServerConfig {
    database_url: Option<String>,
    log_dir: Option<String>,
    sweep_interval_secs: Option<u64>,
    probe_timeout_secs: Option<u64>,
    worker_count: Option<usize>,
    min_check_interval_minutes: Option<i32>,
    retention_keep_recent: Option<usize>,
    retention_max_records: Option<usize>,
    retention_mode: Option<RetentionMode>,
    retention_sweep_interval_secs: Option<u64>,
    snippet_limit: Option<usize>,
    user_agent: Option<String>,
    alert_message_template: Option<String>,
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_sweep_interval_secs() -> u64 {
    300
}

fn default_probe_timeout_secs() -> u64 {
    10
}

fn default_worker_count() -> usize {
    8
}

fn default_min_check_interval_minutes() -> i32 {
    1
}

fn default_retention_keep_recent() -> usize {
    10
}

fn default_retention_max_records() -> usize {
    15
}

fn default_retention_sweep_interval_secs() -> u64 {
    3600
}

fn default_snippet_limit() -> usize {
    500
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_alert_message_template() -> String {
    DEFAULT_ALERT_TEMPLATE.to_string()
}

impl ServerConfig {
    /// File first, then environment (which wins), then per-field defaults.
    /// A missing file is not an error.
    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        let env_config: PartialServerConfig = envy::from_env()?;
        Self::layer(config_path, env_config)
    }

    fn layer(config_path: Option<&str>, env_config: PartialServerConfig) -> Result<Self, ConfigError> {
        let file_config: PartialServerConfig = match config_path.map(Path::new) {
            Some(path) if path.exists() => {
                let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                })?;
                toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                    path: path.display().to_string(),
                    source,
                })?
            }
            _ => PartialServerConfig::default(),
        };

        Ok(ServerConfig {
            database_url: env_config
                .database_url
                .or(file_config.database_url)
                .ok_or(ConfigError::Missing("DATABASE_URL"))?,
            log_dir: env_config
                .log_dir
                .or(file_config.log_dir)
                .unwrap_or_else(default_log_dir),
            sweep_interval_secs: env_config
                .sweep_interval_secs
                .or(file_config.sweep_interval_secs)
                .unwrap_or_else(default_sweep_interval_secs)
                .max(1),
            probe_timeout_secs: env_config
                .probe_timeout_secs
                .or(file_config.probe_timeout_secs)
                .unwrap_or_else(default_probe_timeout_secs)
                .max(1),
            worker_count: env_config
                .worker_count
                .or(file_config.worker_count)
                .unwrap_or_else(default_worker_count)
                .max(1),
            min_check_interval_minutes: env_config
                .min_check_interval_minutes
                .or(file_config.min_check_interval_minutes)
                .unwrap_or_else(default_min_check_interval_minutes)
                .max(1),
            retention_keep_recent: env_config
                .retention_keep_recent
                .or(file_config.retention_keep_recent)
                .unwrap_or_else(default_retention_keep_recent),
            retention_max_records: env_config
                .retention_max_records
                .or(file_config.retention_max_records)
                .unwrap_or_else(default_retention_max_records),
            retention_mode: env_config
                .retention_mode
                .or(file_config.retention_mode)
                .unwrap_or_default(),
            retention_sweep_interval_secs: env_config
                .retention_sweep_interval_secs
                .or(file_config.retention_sweep_interval_secs)
                .unwrap_or_else(default_retention_sweep_interval_secs)
                .max(1),
            snippet_limit: env_config
                .snippet_limit
                .or(file_config.snippet_limit)
                .unwrap_or_else(default_snippet_limit),
            user_agent: env_config
                .user_agent
                .or(file_config.user_agent)
                .unwrap_or_else(default_user_agent),
            alert_message_template: env_config
                .alert_message_template
                .or(file_config.alert_message_template)
                .unwrap_or_else(default_alert_message_template),
        })
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
            worker_count: self.worker_count,
            min_check_interval_minutes: self.min_check_interval_minutes,
        }
    }

    pub fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy::new(self.retention_keep_recent, self.retention_max_records)
    }

    pub fn retention_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.retention_sweep_interval_secs)
    }
}
