use std::{collections::HashMap, time::Duration};

use config::{Config as ConfigLib, ConfigError, Environment, File};
use serde::Deserialize;

use crate::pki::crl::UpdaterConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub updater: UpdaterSettings,
    pub metrics: MetricsServerConfig,
}

/// Raw updater settings as read from file and environment.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdaterSettings {
    pub num_shards: u64,
    pub lookback_secs: u64,
    pub lookforward_secs: u64,
    pub update_period_secs: u64,
    /// Issuer certificate files, PEM or DER.
    #[serde(default)]
    pub issuer_certs: Vec<String>,
}

impl UpdaterSettings {
    /// Converts to the updater's config. Validation happens when the updater
    /// is constructed.
    pub fn to_updater_config(&self) -> UpdaterConfig {
        UpdaterConfig {
            num_shards: self.num_shards,
            lookback: Duration::from_secs(self.lookback_secs),
            lookforward: Duration::from_secs(self.lookforward_secs),
            update_period: Duration::from_secs(self.update_period_secs),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsServerConfig {
    pub host: String,
    pub port: u16,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_sources(None)
    }

    pub fn load_with_sources(
        env_vars: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = ConfigLib::builder()
            .set_default("updater.num_shards", 10)?
            .set_default("updater.lookback_secs", 24 * 60 * 60)?
            .set_default("updater.lookforward_secs", 100 * 24 * 60 * 60)?
            .set_default("updater.update_period_secs", 6 * 60 * 60)?
            .set_default("updater.issuer_certs", Vec::<String>::new())?
            .set_default("metrics.host", "localhost")?
            .set_default("metrics.port", 9102)?
            .add_source(File::with_name("config/settings").required(false));

        // If env_vars is provided, we use it instead of system environment
        // This is to avoid systems variables pollution across tests
        if let Some(vars) = env_vars {
            for (key, value) in vars {
                builder = builder.set_override(&key, value)?;
            }
        } else {
            // Should be in the format APP_UPDATER__NUM_SHARDS or APP_METRICS__PORT
            builder = builder.add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("updater.issuer_certs")
                    .try_parsing(true),
            );
        }

        builder.build()?.try_deserialize()
    }
}
