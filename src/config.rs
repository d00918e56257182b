//! Runtime configuration, loaded from a JSON file with per-field defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::recon::ReconConfig;
use crate::store::change_tracker::DEFAULT_TRACKED_FIELDS;
use crate::store::StoreSettings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    9000
}

fn default_min_request_spacing_ms() -> u64 {
    200
}

fn default_sync_interval_secs() -> u64 {
    60
}

fn default_master_interval_secs() -> u64 {
    300
}

fn default_tracked_fields() -> Vec<String> {
    DEFAULT_TRACKED_FIELDS.iter().map(|f| f.to_string()).collect()
}

fn default_payment_tolerance() -> f64 {
    0.5
}

fn default_conversion_amount_tolerance() -> f64 {
    1.0
}

fn default_paid_tolerance() -> f64 {
    0.005
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Tenant (company) name sent with every request. Empty means the
    /// engine's currently open tenant.
    #[serde(default)]
    pub tenant: String,
    #[serde(default = "default_min_request_spacing_ms")]
    pub min_request_spacing_ms: u64,
    /// Voucher sync period. Zero disables the timer; cycles then run only
    /// when triggered manually.
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,
    #[serde(default = "default_master_interval_secs")]
    pub master_interval_secs: u64,
    #[serde(default = "default_tracked_fields")]
    pub tracked_fields: Vec<String>,
    #[serde(default = "default_payment_tolerance")]
    pub payment_tolerance: f64,
    #[serde(default = "default_conversion_amount_tolerance")]
    pub conversion_amount_tolerance: f64,
    #[serde(default = "default_paid_tolerance")]
    pub paid_tolerance: f64,
    #[serde(default)]
    pub reconciliation: ReconConfig,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            tenant: String::new(),
            min_request_spacing_ms: default_min_request_spacing_ms(),
            sync_interval_secs: default_sync_interval_secs(),
            master_interval_secs: default_master_interval_secs(),
            tracked_fields: default_tracked_fields(),
            payment_tolerance: default_payment_tolerance(),
            conversion_amount_tolerance: default_conversion_amount_tolerance(),
            paid_tolerance: default_paid_tolerance(),
            reconciliation: ReconConfig::default(),
            data_dir: default_data_dir(),
        }
    }
}

impl AppConfig {
    /// Loads the config file, falling back to defaults when it is absent.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!(path = %path.display(), "No config file found, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn endpoint(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn min_request_spacing(&self) -> Duration {
        Duration::from_millis(self.min_request_spacing_ms)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn master_interval(&self) -> Duration {
        Duration::from_secs(self.master_interval_secs)
    }

    pub fn store_settings(&self) -> StoreSettings {
        StoreSettings {
            tracked_fields: self.tracked_fields.clone(),
            payment_tolerance: self.payment_tolerance,
            conversion_amount_tolerance: self.conversion_amount_tolerance,
            paid_tolerance: self.paid_tolerance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let config: AppConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 9000);
        assert_eq!(config.sync_interval_secs, 60);
        assert_eq!(config.tracked_fields, default_tracked_fields());
    }

    #[test]
    fn partial_file_overrides_only_named_fields() {
        let config: AppConfig =
            serde_json::from_str(r#"{"host": "10.0.0.5", "sync_interval_secs": 0}"#).unwrap();
        assert_eq!(config.endpoint(), "http://10.0.0.5:9000");
        assert_eq!(config.sync_interval_secs, 0);
        assert_eq!(config.min_request_spacing_ms, 200);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = AppConfig::load(Path::new("/nonexistent/ledgerbridge.json")).unwrap();
        assert_eq!(config.port, 9000);
    }
}
