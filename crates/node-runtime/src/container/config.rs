//! # Node Configuration
//!
//! Settings for a local validator network, grouped by concern.
//!
//! ## Environment overrides
//!
//! | Variable | Field |
//! |----------|-------|
//! | `PBFT_VALIDATORS` | `network.validators` |
//! | `PBFT_VIEW_TIMEOUT_MS` | `consensus.view_timeout_ms` |
//! | `PBFT_DATA_DIR` | `storage.data_dir` |
//! | `PBFT_OMIT_EMPTY_BLOCK` | `consensus.omit_empty_block` |

use pbft_consensus::domain::BackupConfig;
use pbft_consensus::PbftConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Complete node configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Validator set layout.
    pub network: NetworkConfig,
    /// Engine parameters shared by every validator.
    pub consensus: PbftConfig,
    /// Backup storage.
    pub storage: StorageConfig,
    /// Block production.
    pub sealer: SealerConfig,
}

impl NodeConfig {
    /// Reject settings no network can run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.network.validators == 0 {
            return Err(ConfigError::NoValidators);
        }
        if self.consensus.view_timeout_ms == 0 {
            return Err(ConfigError::ZeroViewTimeout);
        }
        if self.network.local_index >= self.network.validators {
            return Err(ConfigError::LocalIndexOutOfRange {
                index: self.network.local_index,
                validators: self.network.validators,
            });
        }
        Ok(())
    }

    /// Apply overrides from `lookup`, usually the process environment.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(validators) = parse_var(&lookup, "PBFT_VALIDATORS")? {
            self.network.validators = validators;
        }
        if let Some(timeout) = parse_var(&lookup, "PBFT_VIEW_TIMEOUT_MS")? {
            self.consensus.view_timeout_ms = timeout;
        }
        if let Some(dir) = lookup("PBFT_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }
        if let Some(value) = lookup("PBFT_OMIT_EMPTY_BLOCK") {
            self.consensus.omit_empty_block =
                parse_flag(&value).ok_or_else(|| ConfigError::InvalidEnv {
                    var: "PBFT_OMIT_EMPTY_BLOCK",
                    value,
                })?;
        }
        Ok(())
    }
}

/// Defaults plus environment overrides, validated.
pub fn load_config() -> Result<NodeConfig, ConfigError> {
    let mut config = NodeConfig::default();
    config.apply_overrides(|name| std::env::var(name).ok())?;
    config.validate()?;
    Ok(config)
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { var, value }),
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("At least one validator is required")]
    NoValidators,

    #[error("View timeout must be greater than zero")]
    ZeroViewTimeout,

    #[error("Local index {index} is outside a set of {validators} validators")]
    LocalIndexOutOfRange { index: usize, validators: usize },

    #[error("Invalid value {value:?} for {var}")]
    InvalidEnv { var: &'static str, value: String },
}

/// Network configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Number of in-process validators.
    pub validators: usize,
    /// Validator whose status the node reports.
    pub local_index: usize,
    /// Seed the validator keys are derived from.
    pub key_seed: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            validators: 4,
            local_index: 0,
            key_seed: "pbft-node".to_string(),
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory; each validator gets `node-<idx>` below it.
    pub data_dir: PathBuf,
    /// Keep the committed prepare in RocksDB rather than in memory.
    /// Needs the `rocksdb` feature.
    pub persistent_backup: bool,
    pub min_free_bytes: u64,
    pub sync_writes: bool,
}

impl StorageConfig {
    /// Backup settings of validator `idx`.
    pub fn backup_for(&self, idx: usize) -> BackupConfig {
        BackupConfig {
            min_free_bytes: self.min_free_bytes,
            sync_writes: self.sync_writes,
            ..BackupConfig::under(self.data_dir.join(format!("node-{idx}")))
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let backup = BackupConfig::default();
        Self {
            data_dir: PathBuf::from("./data"),
            persistent_backup: cfg!(feature = "rocksdb"),
            min_free_bytes: backup.min_free_bytes,
            sync_writes: backup.sync_writes,
        }
    }
}

/// Sealer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealerConfig {
    /// How often an idle sealer asks whether it should seal.
    pub interval_ms: u64,
    /// Propose blocks without transactions.
    pub seal_empty_blocks: bool,
}

impl Default for SealerConfig {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            seal_empty_blocks: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = NodeConfig::default();
        assert_eq!(config.network.validators, 4);
        assert_eq!(config.consensus.view_timeout_ms, 3_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = NodeConfig::default();
        config
            .apply_overrides(env(&[
                ("PBFT_VALIDATORS", "7"),
                ("PBFT_VIEW_TIMEOUT_MS", " 500 "),
                ("PBFT_DATA_DIR", "/tmp/pbft"),
                ("PBFT_OMIT_EMPTY_BLOCK", "off"),
            ]))
            .unwrap();

        assert_eq!(config.network.validators, 7);
        assert_eq!(config.consensus.view_timeout_ms, 500);
        assert_eq!(config.storage.data_dir, PathBuf::from("/tmp/pbft"));
        assert!(!config.consensus.omit_empty_block);
    }

    #[test]
    fn test_malformed_override_rejected() {
        let mut config = NodeConfig::default();
        let err = config
            .apply_overrides(env(&[("PBFT_VALIDATORS", "four")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidEnv {
                var: "PBFT_VALIDATORS",
                value: "four".to_string()
            }
        );
        assert_eq!(config.network.validators, 4);
    }

    #[test]
    fn test_validate_rejects_unusable_settings() {
        let mut config = NodeConfig::default();
        config.network.validators = 0;
        assert_eq!(config.validate(), Err(ConfigError::NoValidators));

        let mut config = NodeConfig::default();
        config.consensus.view_timeout_ms = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroViewTimeout));

        let mut config = NodeConfig::default();
        config.network.local_index = 4;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::LocalIndexOutOfRange { index: 4, .. })
        ));
    }

    #[test]
    fn test_backup_path_per_validator() {
        let storage = StorageConfig {
            data_dir: PathBuf::from("/data"),
            ..StorageConfig::default()
        };
        let backup = storage.backup_for(2);
        assert_eq!(
            backup.path,
            PathBuf::from("/data/node-2/pbftMsgBackup/RocksDB")
        );
        assert_eq!(backup.min_free_bytes, storage.min_free_bytes);
    }
}
