use std::sync::Arc;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use uuid::Uuid;

use crate::{
    backend::{BackendError, DeviceBackend},
    device::{
        error::DeviceError,
        model::{Device, SensorKind},
    },
    store::{self, Persistence, SENSOR_HISTORY_KEY},
};

/// Local fallback buffer never grows past this; oldest entries drop off
pub const LOCAL_BUFFER_CAP: usize = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    Medium,
    High,
    Critical,
}

/// One security/sensor event. Append-only; `acknowledged` is the only field
/// that may change after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub device_id: String,
    pub device_name: String,
    #[serde(default)]
    pub room: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub acknowledged: bool,
    pub timestamp: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_local_only: bool,
}

/// Entry as posted to the backend; the server assigns id and timestamp
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewHistoryEntry {
    pub device_id: String,
    pub device_name: String,
    #[serde(default)]
    pub room: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    pub value: String,
    pub message: String,
    pub priority: Priority,
    pub acknowledged: bool,
}

impl NewHistoryEntry {
    pub fn sensor(device: &Device, kind: SensorKind, active: bool) -> Self {
        Self {
            device_id: device.id.clone(),
            device_name: device.name.clone(),
            room: device.room.clone(),
            sensor_type: Some(kind.as_str().to_string()),
            action: None,
            value: kind.encode(active).to_string(),
            message: kind.message(active).to_string(),
            priority: kind.alert_priority(),
            acknowledged: false,
        }
    }

    pub fn lock(device: &Device, locked: bool) -> Self {
        Self {
            device_id: device.id.clone(),
            device_name: device.name.clone(),
            room: device.room.clone(),
            sensor_type: None,
            action: Some(if locked { "Locked" } else { "Unlocked" }.to_string()),
            value: locked.to_string(),
            message: if locked {
                "Device locked"
            } else {
                "Device unlocked"
            }
            .to_string(),
            priority: Priority::Normal,
            acknowledged: false,
        }
    }

    /// Synthesize the fields the server would have assigned
    fn into_local(self) -> HistoryEntry {
        HistoryEntry {
            id: Uuid::now_v7().to_string(),
            device_id: self.device_id,
            device_name: self.device_name,
            room: self.room,
            sensor_type: self.sensor_type,
            action: self.action,
            value: self.value,
            message: self.message,
            priority: self.priority,
            acknowledged: self.acknowledged,
            timestamp: Timestamp::now(),
            updated_at: None,
            is_local_only: true,
        }
    }
}

/// Client-side filters applied after the remote fetch. An absent filter
/// removes nothing.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub sensor_type: Option<String>,
    pub from: Option<Timestamp>,
    pub to: Option<Timestamp>,
    pub acknowledged: Option<bool>,
}

impl HistoryFilter {
    fn matches(&self, entry: &HistoryEntry) -> bool {
        if let Some(kind) = &self.sensor_type
            && entry.sensor_type.as_deref() != Some(kind.as_str())
        {
            return false;
        }
        if let Some(from) = self.from
            && entry.timestamp < from
        {
            return false;
        }
        if let Some(to) = self.to
            && entry.timestamp > to
        {
            return false;
        }
        if let Some(acknowledged) = self.acknowledged
            && entry.acknowledged != acknowledged
        {
            return false;
        }
        true
    }
}

/// Per-device append-only event log. Writes remotely; with the offline
/// fallback policy enabled, failed sensor writes land in a capped local
/// buffer instead of surfacing the error.
pub struct HistoryLog {
    backend: Arc<dyn DeviceBackend>,
    store: Arc<dyn Persistence>,
    offline_fallback: bool,
}

impl HistoryLog {
    pub fn new(
        backend: Arc<dyn DeviceBackend>,
        store: Arc<dyn Persistence>,
        offline_fallback: bool,
    ) -> Self {
        Self {
            backend,
            store,
            offline_fallback,
        }
    }

    pub async fn append(&self, entry: NewHistoryEntry) -> Result<HistoryEntry, DeviceError> {
        match self
            .backend
            .append_sensor_entry(&entry.device_id, &entry)
            .await
        {
            Ok(saved) => Ok(saved),
            Err(e) if self.offline_fallback => {
                warn!("remote history write failed, buffering locally: {e}");
                let local = entry.into_local();
                let mut buffer = self.local_buffer();
                buffer.insert(0, local.clone());
                buffer.truncate(LOCAL_BUFFER_CAP);
                self.save_local(&buffer);
                Ok(local)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Newest-first remote history with client-side filters applied. Fetch
    /// failures degrade to an empty listing.
    pub async fn list(&self, device_id: Option<&str>, filter: &HistoryFilter) -> Vec<HistoryEntry> {
        let mut entries = match self.backend.sensor_history(device_id).await {
            Ok(entries) => entries,
            Err(e) => {
                error!("fetching sensor history: {e}");
                return Vec::new();
            }
        };
        entries.retain(|e| filter.matches(e));
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries
    }

    /// Acknowledgement is monotonic: re-acknowledging is a no-op, never an
    /// error.
    pub async fn acknowledge(&self, entry_id: &str) -> Result<HistoryEntry, DeviceError> {
        match self.backend.acknowledge_entry(entry_id).await {
            Ok(entry) => Ok(entry),
            Err(e) if self.offline_fallback => {
                warn!("remote acknowledge failed, updating local buffer: {e}");
                let mut buffer = self.local_buffer();
                let Some(idx) = buffer.iter().position(|e| e.id == entry_id) else {
                    return Err(DeviceError::EntryNotFound(entry_id.to_string()));
                };
                if !buffer[idx].acknowledged {
                    buffer[idx].acknowledged = true;
                    buffer[idx].updated_at = Some(Timestamp::now());
                    let entry = buffer[idx].clone();
                    self.save_local(&buffer);
                    return Ok(entry);
                }
                Ok(buffer[idx].clone())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Returns how many entries changed state
    pub async fn acknowledge_all(&self, device_id: Option<&str>) -> Result<u64, DeviceError> {
        match self.backend.acknowledge_all(device_id).await {
            Ok(count) => Ok(count),
            Err(e) if self.offline_fallback => {
                warn!("remote acknowledge-all failed, updating local buffer: {e}");
                let mut buffer = self.local_buffer();
                let now = Timestamp::now();
                let mut count = 0;
                for entry in buffer.iter_mut() {
                    if let Some(id) = device_id
                        && entry.device_id != id
                    {
                        continue;
                    }
                    if !entry.acknowledged {
                        entry.acknowledged = true;
                        entry.updated_at = Some(now);
                        count += 1;
                    }
                }
                self.save_local(&buffer);
                Ok(count)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Lock transitions write remote-only; there is no local fallback for
    /// them, callers log and move on.
    pub async fn append_lock_entry(
        &self,
        device: &Device,
        locked: bool,
    ) -> Result<HistoryEntry, BackendError> {
        let entry = NewHistoryEntry::lock(device, locked);
        self.backend.append_lock_entry(&device.id, &entry).await
    }

    pub async fn lock_history(&self, device_id: Option<&str>) -> Vec<HistoryEntry> {
        match self.backend.lock_history(device_id).await {
            Ok(mut entries) => {
                entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
                entries
            }
            Err(e) => {
                error!("fetching lock history: {e}");
                Vec::new()
            }
        }
    }

    pub fn local_buffer(&self) -> Vec<HistoryEntry> {
        store::load_json(self.store.as_ref(), SENSOR_HISTORY_KEY).unwrap_or_default()
    }

    fn save_local(&self, buffer: &[HistoryEntry]) {
        store::save_json(self.store.as_ref(), SENSOR_HISTORY_KEY, &buffer);
    }
}
