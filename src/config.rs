use std::{error::Error, fs};

use ron::{Options, extensions::Extensions};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize)]
pub struct BurrowConfig {
    pub version: f32,
    pub backend: BackendConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    /// Pull refresh cadence for the device cache
    #[serde(default = "default_refresh_secs")]
    pub refresh_secs: u64,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct BackendConfig {
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct StorageConfig {
    pub path: String,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct HistoryConfig {
    /// Buffer sensor events locally when the remote store is unreachable
    #[serde(default)]
    pub offline_fallback: bool,
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_refresh_secs() -> u64 {
    60
}

impl BurrowConfig {
    pub fn from_file(file_path: &str) -> Result<Self, Box<dyn Error>> {
        Self::parse(&fs::read_to_string(file_path)?)
    }

    pub fn parse(s: &str) -> Result<Self, Box<dyn Error>> {
        let options = Options::default()
            .with_default_extension(Extensions::IMPLICIT_SOME)
            .with_default_extension(Extensions::UNWRAP_NEWTYPES)
            .with_default_extension(Extensions::UNWRAP_VARIANT_NEWTYPES);
        Ok(options.from_str(s)?)
    }
}
