//! Service configuration, loaded from YAML with env overrides.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::reconcile::MatchPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TfgateConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Root directory holding configuration directories, the log
    /// directory, and the action store.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_terraform_bin")]
    pub terraform_bin: String,
    #[serde(default = "default_terraformer_bin")]
    pub terraformer_bin: String,
    /// Hard wall-clock bound on every operation, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub operation_timeout_secs: u64,
    #[serde(default)]
    pub match_policy: MatchPolicy,
}

fn default_listen_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9080
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_terraform_bin() -> String {
    "terraform".to_string()
}

fn default_terraformer_bin() -> String {
    "terraformer".to_string()
}

fn default_timeout_secs() -> u64 {
    // Matches the original's one-hour plan timeout.
    3600
}

impl Default for TfgateConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            port: default_port(),
            data_dir: default_data_dir(),
            terraform_bin: default_terraform_bin(),
            terraformer_bin: default_terraformer_bin(),
            operation_timeout_secs: default_timeout_secs(),
            match_policy: MatchPolicy::default(),
        }
    }
}

impl TfgateConfig {
    /// Load from a YAML file, falling back to defaults when the file is
    /// absent, then apply `TFGATE_PORT` / `TFGATE_DATA_DIR` env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) if p.exists() => {
                let raw = std::fs::read_to_string(p)?;
                serde_yaml::from_str(&raw)?
            }
            _ => Self::default(),
        };
        if let Ok(port) = std::env::var("TFGATE_PORT") {
            if let Ok(port) = port.parse() {
                config.port = port;
            }
        }
        if let Ok(dir) = std::env::var("TFGATE_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        Ok(config)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }
}
