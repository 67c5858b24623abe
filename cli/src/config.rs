//! `chainscan.toml` loading.
//!
//! ```toml
//! rpc_url  = "http://localhost:8545"
//! data_dir = "./data"
//!
//! [sync]
//! chain      = "ethereum"
//! fork_depth = 12
//! workers    = 16
//!
//! [log]
//! level = "info"
//! components = { chainscan-evm = "debug" }
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use chainscan_core::config::SyncConfig;

use crate::logging::LogConfig;

pub const ENV_RPC_URL: &str = "CHAINSCAN_RPC_URL";
pub const ENV_DATA_DIR: &str = "CHAINSCAN_DATA_DIR";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub rpc_url: String,
    /// Holds `full.db` and `fork.db`.
    pub data_dir: PathBuf,
    pub sync: SyncConfig,
    pub log: LogConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://localhost:8545".into(),
            data_dir: PathBuf::from("./data"),
            sync: SyncConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl AppConfig {
    /// Read `path` (if given), then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut cfg = match path {
            Some(p) => {
                let raw = std::fs::read_to_string(p)
                    .with_context(|| format!("reading config {}", p.display()))?;
                Self::parse(&raw).with_context(|| format!("parsing config {}", p.display()))?
            }
            None => Self::default(),
        };
        cfg.apply_env(|k| std::env::var(k).ok());
        Ok(cfg)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_RPC_URL) {
            self.rpc_url = url;
        }
        if let Some(dir) = lookup(ENV_DATA_DIR) {
            self.data_dir = PathBuf::from(dir);
        }
    }

    pub fn full_db(&self) -> PathBuf {
        self.data_dir.join("full.db")
    }

    pub fn fork_db(&self) -> PathBuf {
        self.data_dir.join("fork.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_file() {
        let cfg = AppConfig::parse(
            r#"
            rpc_url = "https://rpc.example:8545"

            [sync]
            fork_depth = 64
            to_block = 2000

            [log]
            json = true
            "#,
        )
        .unwrap();
        assert_eq!(cfg.rpc_url, "https://rpc.example:8545");
        assert_eq!(cfg.data_dir, PathBuf::from("./data"));
        assert_eq!(cfg.sync.fork_depth, 64);
        assert_eq!(cfg.sync.to_block, Some(2000));
        assert_eq!(cfg.sync.workers, 16);
        assert!(cfg.log.json);
        assert_eq!(cfg.log.level, "info");
    }

    #[test]
    fn env_overrides_file_values() {
        let mut cfg = AppConfig::default();
        cfg.apply_env(|k| match k {
            ENV_RPC_URL => Some("http://node:8545".into()),
            ENV_DATA_DIR => Some("/var/lib/chainscan".into()),
            _ => None,
        });
        assert_eq!(cfg.rpc_url, "http://node:8545");
        assert_eq!(cfg.full_db(), PathBuf::from("/var/lib/chainscan/full.db"));
        assert_eq!(cfg.fork_db(), PathBuf::from("/var/lib/chainscan/fork.db"));
    }

    #[test]
    fn rejects_unknown_types() {
        assert!(AppConfig::parse("[sync]\nfork_depth = \"deep\"").is_err());
    }
}
