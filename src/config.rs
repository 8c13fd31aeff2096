use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::{env, fs};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("can't read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("can't parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("remap rule {index} is invalid: {reason}")]
    InvalidRule { index: usize, reason: &'static str },
}

/// Sync settings loaded once at startup from `config.yaml`.
///
/// Every section is optional; an empty file syncs every secret in the
/// namespace to `/certs` under its original key names.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncConfig {
    pub filter: FilterConfig,
    pub remap: Vec<RemapRule>,
    pub sync_dir: PathBuf,
    pub namespace: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct FilterConfig {
    pub annotations: BTreeMap<String, String>,
}

/// Rewrites the data key `name` to the file name rendered from `value`.
/// Rules apply in configured order and later rules see earlier outputs.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct RemapRule {
    pub name: String,
    pub value: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            filter: FilterConfig::default(),
            remap: Vec::new(),
            sync_dir: PathBuf::from("/certs"),
            namespace: None,
        }
    }
}

impl SyncConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        let mut config = Self::parse(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })?;
        config.apply_env_overrides(env::var("SYNCDIR").ok(), env::var("NAMESPACE").ok());
        config.validate()?;
        Ok(config)
    }

    fn parse(raw: &str) -> Result<Self, serde_yaml::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
    }

    // SYNCDIR and NAMESPACE take precedence over the file, matching how the
    // container image has always been configured.
    fn apply_env_overrides(&mut self, sync_dir: Option<String>, namespace: Option<String>) {
        if let Some(dir) = sync_dir {
            self.sync_dir = PathBuf::from(dir);
        }
        if let Some(ns) = namespace {
            self.namespace = Some(ns);
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (index, rule) in self.remap.iter().enumerate() {
            if rule.name.is_empty() {
                return Err(ConfigError::InvalidRule {
                    index,
                    reason: "empty source key",
                });
            }
            if rule.value.is_empty() {
                return Err(ConfigError::InvalidRule {
                    index,
                    reason: "empty destination template",
                });
            }
        }
        Ok(())
    }
}
