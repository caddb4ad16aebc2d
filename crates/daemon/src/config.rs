//! Daemon configuration
//!
//! Optional TOML file (`HARVEST_CONFIG`, default `~/.harvest/config.toml`)
//! overlaid by `HARVEST_*` environment variables, `__` between sections:
//!
//! ```text
//! HARVEST_RPC__PORT=9700
//! HARVEST_JANITOR__MAX_JOB_AGE_HOURS=48
//! ```

use anyhow::{bail, Context, Result};
use config::builder::DefaultState;
use config::{ConfigBuilder, Environment, File, FileFormat};
use harvest_core::application::{BroadcastPolicy, JanitorConfig};
use harvest_infra_system::CommandSpec;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "~/.harvest/config.toml";
const DEFAULT_DB_PATH: &str = "~/.harvest/records.db";
const DEFAULT_RPC_HOST: &str = "127.0.0.1";
const DEFAULT_RPC_PORT: u16 = 9630;
const ENV_PREFIX: &str = "HARVEST";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub database: DatabaseConfig,
    pub rpc: RpcConfig,
    pub janitor: JanitorSettings,
    pub broadcast: BroadcastSettings,
    pub shutdown_grace_secs: u64,
    pub jsonl: JsonlSettings,
    /// External scrapers, keyed by extraction kind
    pub producers: BTreeMap<String, CommandSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JanitorSettings {
    pub interval_minutes: u64,
    pub max_job_age_hours: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BroadcastSettings {
    pub every_n_records: u64,
    pub max_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JsonlSettings {
    pub enabled: bool,
    pub base_dir: Option<String>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            rpc: RpcConfig::default(),
            janitor: JanitorSettings::default(),
            broadcast: BroadcastSettings::default(),
            shutdown_grace_secs: 10,
            jsonl: JsonlSettings::default(),
            producers: BTreeMap::new(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_DB_PATH.to_string(),
        }
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RPC_HOST.to_string(),
            port: DEFAULT_RPC_PORT,
        }
    }
}

impl Default for JanitorSettings {
    fn default() -> Self {
        Self {
            interval_minutes: 60,
            max_job_age_hours: 24,
        }
    }
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        let policy = BroadcastPolicy::default();
        Self {
            every_n_records: policy.every_n_records,
            max_interval_secs: policy.max_interval.as_secs(),
        }
    }
}

impl Default for JsonlSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            base_dir: None,
        }
    }
}

impl DaemonConfig {
    /// Load from the config file and the process environment
    pub fn load() -> Result<Self> {
        let path = std::env::var("HARVEST_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let path = shellexpand::tilde(&path).into_owned();

        let builder = config::Config::builder()
            .add_source(File::new(&path, FileFormat::Toml).required(false))
            .add_source(env_source());

        Self::from_builder(builder).with_context(|| format!("Invalid configuration ({})", path))
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let mut cfg: DaemonConfig = builder.build()?.try_deserialize()?;
        cfg.database.path = shellexpand::tilde(&cfg.database.path).into_owned();
        if let Some(dir) = cfg.jsonl.base_dir.take() {
            cfg.jsonl.base_dir = Some(shellexpand::tilde(&dir).into_owned());
        }
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.janitor.interval_minutes == 0 {
            bail!("janitor.interval_minutes must be greater than 0");
        }
        if self.janitor.max_job_age_hours == 0 {
            bail!("janitor.max_job_age_hours must be greater than 0");
        }
        if self.broadcast.every_n_records == 0 {
            bail!("broadcast.every_n_records must be greater than 0");
        }
        for (kind, spec) in &self.producers {
            if spec.command.trim().is_empty() {
                bail!("producers.{}.command cannot be empty", kind);
            }
        }
        Ok(())
    }

    pub fn database_url(&self) -> String {
        format!("sqlite://{}", self.database.path)
    }

    pub fn database_dir(&self) -> Option<PathBuf> {
        PathBuf::from(&self.database.path)
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(PathBuf::from)
    }

    pub fn janitor_config(&self) -> JanitorConfig {
        JanitorConfig {
            interval: Duration::from_secs(self.janitor.interval_minutes * 60),
            max_age: Duration::from_secs(self.janitor.max_job_age_hours * 3600),
        }
    }

    pub fn broadcast_policy(&self) -> BroadcastPolicy {
        BroadcastPolicy {
            every_n_records: self.broadcast.every_n_records,
            max_interval: Duration::from_secs(self.broadcast.max_interval_secs),
        }
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}
