pub mod http;
#[cfg(test)]
pub(crate) mod mock;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    device::model::{BackendDevice, DeviceUpdate, NewDevice},
    history::{HistoryEntry, NewHistoryEntry},
};

/// Fire-and-forget request/response command for one device. Not persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub command: String,
    pub parameters: BTreeMap<String, String>,
}

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("device already exists")]
    Duplicate,
    #[error("not found")]
    NotFound,
    #[error("backend returned status {0}")]
    Status(u16),
    #[error("transport: {0}")]
    Transport(String),
    #[error("decode: {0}")]
    Decode(#[from] serde_json::Error),
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

impl BackendError {
    /// Network/timeout/5xx failures, as opposed to rejections the backend
    /// made deliberately (409, 404).
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Status(500..=599))
    }
}

/// One telemetry sample from the humidity/temperature history endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryPoint {
    pub ts: i64,
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckCount {
    pub acknowledged_count: u64,
}

/// The authoritative device registry, behind whatever transport the embedder
/// wires in. All requests and responses are JSON. Authentication and
/// interceptor behavior live inside the implementation.
#[async_trait]
pub trait DeviceBackend: Send + Sync {
    async fn fetch_devices(&self) -> Result<Vec<BackendDevice>, BackendError>;
    async fn fetch_device(&self, id: &str) -> Result<BackendDevice, BackendError>;
    async fn create_device(&self, device: &NewDevice) -> Result<BackendDevice, BackendError>;
    async fn update_device(
        &self,
        id: &str,
        update: &DeviceUpdate,
    ) -> Result<BackendDevice, BackendError>;
    async fn delete_device(&self, id: &str) -> Result<(), BackendError>;
    async fn send_command(
        &self,
        id: &str,
        cmd: &Command,
    ) -> Result<serde_json::Value, BackendError>;
    async fn device_status(&self, id: &str) -> Result<serde_json::Value, BackendError>;
    async fn available_devices(&self) -> Result<Vec<BackendDevice>, BackendError>;
    async fn sync_thingsboard(&self, id: &str) -> Result<(), BackendError>;

    /// Device-scoped history when `device_id` is given, global otherwise
    async fn sensor_history(
        &self,
        device_id: Option<&str>,
    ) -> Result<Vec<HistoryEntry>, BackendError>;
    async fn append_sensor_entry(
        &self,
        device_id: &str,
        entry: &NewHistoryEntry,
    ) -> Result<HistoryEntry, BackendError>;
    async fn acknowledge_entry(&self, entry_id: &str) -> Result<HistoryEntry, BackendError>;
    async fn acknowledge_all(&self, device_id: Option<&str>) -> Result<u64, BackendError>;
    async fn lock_history(
        &self,
        device_id: Option<&str>,
    ) -> Result<Vec<HistoryEntry>, BackendError>;
    async fn append_lock_entry(
        &self,
        device_id: &str,
        entry: &NewHistoryEntry,
    ) -> Result<HistoryEntry, BackendError>;

    async fn humidity_history(
        &self,
        device_id: &str,
        interval: &str,
    ) -> Result<Vec<TelemetryPoint>, BackendError>;
    async fn temperature_history(
        &self,
        device_id: &str,
        interval: &str,
    ) -> Result<Vec<TelemetryPoint>, BackendError>;
}
