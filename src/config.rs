use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

const DEFAULT_PATH: &str = "config.json";

#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("update_hour must be between 0 and 23, got {0}")]
    UpdateHour(u32),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Falls back to `TELOXIDE_TOKEN` when absent.
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default = "default_subs_file")]
    pub subs_file: PathBuf,
    #[serde(default = "default_scan_params_file")]
    pub scan_params_file: PathBuf,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_startup_secs")]
    pub startup_secs: u64,
    #[serde(default = "default_update_hour")]
    pub update_hour: u32,
    #[serde(default = "default_timezone", deserialize_with = "deserialize_timezone")]
    pub timezone: Tz,
}

fn default_subs_file() -> PathBuf {
    "subs.json".into()
}

fn default_scan_params_file() -> PathBuf {
    "scan_params.json".into()
}

fn default_database_url() -> String {
    "sqlite://posts.db".to_string()
}

fn default_startup_secs() -> u64 {
    10
}

fn default_update_hour() -> u32 {
    9
}

fn default_timezone() -> Tz {
    chrono_tz::Europe::Madrid
}

fn deserialize_timezone<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Tz, D::Error> {
    let name = String::deserialize(deserializer)?;
    name.parse()
        .map_err(|_| serde::de::Error::custom(format!("unknown timezone {name}")))
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let config: Config = serde_json::from_str(json)?;
        if config.update_hour > 23 {
            return Err(Error::UpdateHour(config.update_hour));
        }
        Ok(config)
    }

    pub async fn load(path: &Path) -> Result<Self, Error> {
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| Error::Read {
                path: path.display().to_string(),
                source,
            })?;
        Self::from_json(&json)
    }

    /// Config file named by the first argument, `NOTIFIER_CONFIG`, or `config.json`.
    pub fn path_from_env() -> PathBuf {
        std::env::args_os()
            .nth(1)
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("NOTIFIER_CONFIG").map(PathBuf::from))
            .unwrap_or_else(|| DEFAULT_PATH.into())
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.startup_secs)
    }
}
