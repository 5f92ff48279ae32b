use std::sync::{
    Mutex,
    atomic::{AtomicBool, AtomicU32, Ordering},
};

use async_trait::async_trait;
use jiff::Timestamp;

use super::{BackendError, Command, DeviceBackend, TelemetryPoint};
use crate::{
    device::model::{BackendDevice, DeviceUpdate, NewDevice},
    history::{HistoryEntry, NewHistoryEntry},
};

/// In-memory backend double. Records every command and lets tests flip
/// individual request families into transport failure.
pub(crate) struct MockBackend {
    pub commands: Mutex<Vec<(String, Command)>>,
    pub sensor_entries: Mutex<Vec<HistoryEntry>>,
    pub lock_entries: Mutex<Vec<HistoryEntry>>,
    pub records: Mutex<Vec<BackendDevice>>,
    pub telemetry: Mutex<Vec<TelemetryPoint>>,
    fail_commands: AtomicBool,
    fail_history: AtomicBool,
    fail_devices: AtomicBool,
    next_id: AtomicU32,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            commands: Mutex::new(Vec::new()),
            sensor_entries: Mutex::new(Vec::new()),
            lock_entries: Mutex::new(Vec::new()),
            records: Mutex::new(Vec::new()),
            telemetry: Mutex::new(Vec::new()),
            fail_commands: AtomicBool::new(false),
            fail_history: AtomicBool::new(false),
            fail_devices: AtomicBool::new(false),
            next_id: AtomicU32::new(1),
        }
    }

    pub fn fail_commands(&self) {
        self.fail_commands.store(true, Ordering::SeqCst);
    }

    pub fn fail_history(&self) {
        self.fail_history.store(true, Ordering::SeqCst);
    }

    pub fn fail_devices(&self) {
        self.fail_devices.store(true, Ordering::SeqCst);
    }

    fn transport() -> BackendError {
        BackendError::Transport("connection refused".to_string())
    }

    fn materialize(&self, entry: &NewHistoryEntry) -> HistoryEntry {
        HistoryEntry {
            id: format!("srv-{}", self.next_id.fetch_add(1, Ordering::SeqCst)),
            device_id: entry.device_id.clone(),
            device_name: entry.device_name.clone(),
            room: entry.room.clone(),
            sensor_type: entry.sensor_type.clone(),
            action: entry.action.clone(),
            value: entry.value.clone(),
            message: entry.message.clone(),
            priority: entry.priority,
            acknowledged: entry.acknowledged,
            timestamp: Timestamp::now(),
            updated_at: None,
            is_local_only: false,
        }
    }
}

#[async_trait]
impl DeviceBackend for MockBackend {
    async fn fetch_devices(&self) -> Result<Vec<BackendDevice>, BackendError> {
        if self.fail_devices.load(Ordering::SeqCst) {
            return Err(Self::transport());
        }
        Ok(self.records.lock().unwrap().clone())
    }

    async fn fetch_device(&self, id: &str) -> Result<BackendDevice, BackendError> {
        if self.fail_devices.load(Ordering::SeqCst) {
            return Err(Self::transport());
        }
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or(BackendError::NotFound)
    }

    async fn create_device(&self, device: &NewDevice) -> Result<BackendDevice, BackendError> {
        if self.fail_devices.load(Ordering::SeqCst) {
            return Err(Self::transport());
        }
        let mut records = self.records.lock().unwrap();
        if records.iter().any(|r| r.name == device.name) {
            return Err(BackendError::Duplicate);
        }
        let record = BackendDevice {
            id: format!("dev-{}", self.next_id.fetch_add(1, Ordering::SeqCst)),
            name: device.name.clone(),
            r#type: device.r#type.clone(),
            category: device.category.clone(),
            sub_type: device.sub_type.clone(),
            room_id: device.room_id.clone(),
            protocol: device.protocol.clone(),
            status: Some("ONLINE".to_string()),
            properties: device.properties.clone(),
            ..Default::default()
        };
        records.push(record.clone());
        Ok(record)
    }

    async fn update_device(
        &self,
        id: &str,
        update: &DeviceUpdate,
    ) -> Result<BackendDevice, BackendError> {
        if self.fail_devices.load(Ordering::SeqCst) {
            return Err(Self::transport());
        }
        let mut records = self.records.lock().unwrap();
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(BackendError::NotFound)?;
        if let Some(name) = &update.name {
            record.name = name.clone();
        }
        for (k, v) in &update.properties {
            record.properties.insert(k.clone(), v.clone());
        }
        Ok(record.clone())
    }

    async fn delete_device(&self, id: &str) -> Result<(), BackendError> {
        if self.fail_devices.load(Ordering::SeqCst) {
            return Err(Self::transport());
        }
        let mut records = self.records.lock().unwrap();
        let idx = records
            .iter()
            .position(|r| r.id == id)
            .ok_or(BackendError::NotFound)?;
        records.remove(idx);
        Ok(())
    }

    async fn send_command(
        &self,
        id: &str,
        cmd: &Command,
    ) -> Result<serde_json::Value, BackendError> {
        if self.fail_commands.load(Ordering::SeqCst) {
            return Err(Self::transport());
        }
        self.commands
            .lock()
            .unwrap()
            .push((id.to_string(), cmd.clone()));
        Ok(serde_json::json!({ "success": true }))
    }

    async fn device_status(&self, _id: &str) -> Result<serde_json::Value, BackendError> {
        Ok(serde_json::json!({ "status": "ONLINE" }))
    }

    async fn available_devices(&self) -> Result<Vec<BackendDevice>, BackendError> {
        Ok(Vec::new())
    }

    async fn sync_thingsboard(&self, _id: &str) -> Result<(), BackendError> {
        Ok(())
    }

    async fn sensor_history(
        &self,
        device_id: Option<&str>,
    ) -> Result<Vec<HistoryEntry>, BackendError> {
        if self.fail_history.load(Ordering::SeqCst) {
            return Err(Self::transport());
        }
        let entries = self.sensor_entries.lock().unwrap();
        Ok(entries
            .iter()
            .filter(|e| device_id.is_none_or(|id| e.device_id == id))
            .cloned()
            .collect())
    }

    async fn append_sensor_entry(
        &self,
        _device_id: &str,
        entry: &NewHistoryEntry,
    ) -> Result<HistoryEntry, BackendError> {
        if self.fail_history.load(Ordering::SeqCst) {
            return Err(Self::transport());
        }
        let saved = self.materialize(entry);
        self.sensor_entries.lock().unwrap().push(saved.clone());
        Ok(saved)
    }

    async fn acknowledge_entry(&self, entry_id: &str) -> Result<HistoryEntry, BackendError> {
        if self.fail_history.load(Ordering::SeqCst) {
            return Err(Self::transport());
        }
        let mut entries = self.sensor_entries.lock().unwrap();
        let entry = entries
            .iter_mut()
            .find(|e| e.id == entry_id)
            .ok_or(BackendError::NotFound)?;
        if !entry.acknowledged {
            entry.acknowledged = true;
            entry.updated_at = Some(Timestamp::now());
        }
        Ok(entry.clone())
    }

    async fn acknowledge_all(&self, device_id: Option<&str>) -> Result<u64, BackendError> {
        if self.fail_history.load(Ordering::SeqCst) {
            return Err(Self::transport());
        }
        let mut entries = self.sensor_entries.lock().unwrap();
        let mut count = 0;
        for entry in entries.iter_mut() {
            if device_id.is_some_and(|id| entry.device_id != id) {
                continue;
            }
            if !entry.acknowledged {
                entry.acknowledged = true;
                entry.updated_at = Some(Timestamp::now());
                count += 1;
            }
        }
        Ok(count)
    }

    async fn lock_history(
        &self,
        device_id: Option<&str>,
    ) -> Result<Vec<HistoryEntry>, BackendError> {
        if self.fail_history.load(Ordering::SeqCst) {
            return Err(Self::transport());
        }
        let entries = self.lock_entries.lock().unwrap();
        Ok(entries
            .iter()
            .filter(|e| device_id.is_none_or(|id| e.device_id == id))
            .cloned()
            .collect())
    }

    async fn append_lock_entry(
        &self,
        _device_id: &str,
        entry: &NewHistoryEntry,
    ) -> Result<HistoryEntry, BackendError> {
        if self.fail_history.load(Ordering::SeqCst) {
            return Err(Self::transport());
        }
        let saved = self.materialize(entry);
        self.lock_entries.lock().unwrap().push(saved.clone());
        Ok(saved)
    }

    async fn humidity_history(
        &self,
        _device_id: &str,
        _interval: &str,
    ) -> Result<Vec<TelemetryPoint>, BackendError> {
        if self.fail_history.load(Ordering::SeqCst) {
            return Err(Self::transport());
        }
        Ok(self.telemetry.lock().unwrap().clone())
    }

    async fn temperature_history(
        &self,
        _device_id: &str,
        _interval: &str,
    ) -> Result<Vec<TelemetryPoint>, BackendError> {
        if self.fail_history.load(Ordering::SeqCst) {
            return Err(Self::transport());
        }
        Ok(self.telemetry.lock().unwrap().clone())
    }
}
