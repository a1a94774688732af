use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use corefence_core::aggregate::Aggregator;
use corefence_core::dataset::CoreDataset;
use corefence_core::CoreResult;

use crate::auth::IdentityConfig;
use crate::gateway::WriteGateway;

pub const DEFAULT_MAX_BODY_BYTES: usize = 65_536;
pub const DEFAULT_HMAC_MAX_SKEW_SECS: i64 = 300;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read auth config: {0}")]
    Io(#[from] std::io::Error),
    #[error("auth config must be valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// On-disk auth material: token bindings plus the HMAC policy. Loaded
/// once in `main`; components only ever see the resulting
/// [`IdentityConfig`] value.
#[derive(Debug, Deserialize)]
pub struct AuthFile {
    #[serde(default)]
    pub tokens: BTreeMap<String, String>,
    #[serde(default)]
    pub hmac_secrets: BTreeMap<String, String>,
    #[serde(default)]
    pub require_hmac: bool,
    #[serde(default = "default_skew")]
    pub hmac_max_skew_secs: i64,
}

fn default_skew() -> i64 {
    DEFAULT_HMAC_MAX_SKEW_SECS
}

impl AuthFile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let payload = fs::read(path)?;
        Ok(serde_json::from_slice(&payload)?)
    }

    pub fn into_identity(self) -> IdentityConfig {
        IdentityConfig {
            token_to_namespace: self.tokens,
            hmac_secrets: self.hmac_secrets,
            require_hmac: self.require_hmac,
            hmac_max_skew_secs: self.hmac_max_skew_secs,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub data_dir: PathBuf,
    pub core_file: PathBuf,
    pub core_pin_file: PathBuf,
    pub max_body_bytes: usize,
    pub identity: IdentityConfig,
}

impl DaemonConfig {
    pub fn new(
        data_dir: impl Into<PathBuf>,
        core_file: impl Into<PathBuf>,
        core_pin_file: impl Into<PathBuf>,
        identity: IdentityConfig,
    ) -> Self {
        Self {
            data_dir: data_dir.into(),
            core_file: core_file.into(),
            core_pin_file: core_pin_file.into(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            identity,
        }
    }

    pub fn agents_root(&self) -> PathBuf {
        self.data_dir.join("agents")
    }

    pub fn core_dir(&self) -> PathBuf {
        self.core_file
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf()
    }

    pub fn dataset(&self) -> CoreResult<CoreDataset> {
        CoreDataset::open(&self.core_file, &self.core_pin_file)
    }

    pub fn gateway(&self) -> WriteGateway {
        WriteGateway::new(self.agents_root(), self.core_dir())
    }

    pub fn aggregator(&self) -> Aggregator {
        Aggregator::new(&self.core_file, self.agents_root())
    }
}
