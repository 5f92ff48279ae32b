use std::sync::Arc;

use jiff::Timestamp;
use tracing::{info, warn};

use crate::{
    backend::DeviceBackend,
    dashboard::{Dashboard, widget::Widget},
    device::{
        Devices,
        error::DeviceError,
        mapper,
        model::{BackendDevice, Device, DevicePatch, DeviceUpdate, NewDevice},
    },
    history::HistoryLog,
    store::Persistence,
};

/// Aggregate state: the injected capabilities plus the four subsystems.
/// Everything hangs off one `Arc` handed to the embedding UI.
pub struct BurrowState {
    pub backend: Arc<dyn DeviceBackend>,
    pub store: Arc<dyn Persistence>,
    pub devices: Devices,
    pub history: HistoryLog,
    pub dashboard: Dashboard,
}

impl BurrowState {
    pub fn init(
        backend: Arc<dyn DeviceBackend>,
        store: Arc<dyn Persistence>,
        offline_fallback: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            devices: Devices::new(),
            history: HistoryLog::new(backend.clone(), store.clone(), offline_fallback),
            dashboard: Dashboard::load(store.clone()),
            backend,
            store,
        })
    }

    /// Replaces the cache from a bulk fetch; returns the device count
    pub async fn sync_devices(&self) -> Result<usize, DeviceError> {
        let records = self.backend.fetch_devices().await?;
        let devices: Vec<Device> = records.iter().map(mapper::map_device).collect();
        let count = devices.len();
        self.devices.load(devices).await;
        info!("synced {count} devices");
        Ok(count)
    }

    /// The single entry point for authoritative backend payloads: map and
    /// merge into the cache.
    pub async fn apply_authoritative(&self, record: &BackendDevice) -> Device {
        self.devices.upsert(mapper::map_device(record)).await
    }

    pub async fn refresh_device(&self, id: &str) -> Result<Device, DeviceError> {
        let record = self.backend.fetch_device(id).await?;
        Ok(self.apply_authoritative(&record).await)
    }

    /// Validates, assigns `device_unique_id`, creates remotely and merges the
    /// echoed record (which may carry an id we already cache).
    pub async fn create_device(&self, mut new: NewDevice) -> Result<Device, DeviceError> {
        mapper::prepare_new_device(&mut new)?;
        let record = self.backend.create_device(&new).await?;
        Ok(self.apply_authoritative(&record).await)
    }

    /// Pushes a user-intent patch to the backend and merges the authoritative
    /// response. When the backend is unreachable the patch is applied
    /// locally instead, so the UI keeps tracking the user's intent.
    pub async fn update_device(&self, id: &str, patch: DevicePatch) -> Result<Device, DeviceError> {
        let update = DeviceUpdate {
            properties: mapper::patch_to_backend(&patch),
            ..Default::default()
        };
        match self.backend.update_device(id, &update).await {
            Ok(record) => Ok(self.apply_authoritative(&record).await),
            Err(e) if e.is_transport() => {
                warn!("device update failed, applying patch to `{id}` locally: {e}");
                self.devices
                    .update(id, |dev| dev.apply_patch(&patch))
                    .await
                    .ok_or_else(|| DeviceError::NotFound(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn delete_device(&self, id: &str) -> Result<bool, DeviceError> {
        self.backend.delete_device(id).await?;
        Ok(self.devices.remove(id).await)
    }

    /// Devices known to ThingsBoard but not yet registered here
    pub async fn available_devices(&self) -> Result<Vec<BackendDevice>, DeviceError> {
        Ok(self.backend.available_devices().await?)
    }

    pub async fn sync_thingsboard(&self, id: &str) -> Result<(), DeviceError> {
        Ok(self.backend.sync_thingsboard(id).await?)
    }

    /// Looks the device up and delegates to the dashboard; `Ok(None)` means
    /// the widget was rejected (duplicate binding or exhausted type).
    pub async fn add_device_widget(&self, device_id: &str) -> Result<Option<Widget>, DeviceError> {
        let device = self
            .devices
            .by_id(device_id)
            .await
            .ok_or_else(|| DeviceError::NotFound(device_id.to_string()))?;
        Ok(self.dashboard.add_widget_for_device(&device).await)
    }

    pub async fn humidity_series(
        &self,
        device_id: &str,
        interval: &str,
    ) -> Result<Vec<(Timestamp, f64)>, DeviceError> {
        let device = self.require_device(device_id).await?;
        if !device.is_humidity_sensor() {
            return Err(DeviceError::WrongKind(
                device.id,
                "humidity sensor".to_string(),
            ));
        }
        let points = self.backend.humidity_history(device_id, interval).await?;
        Ok(decode_series(points))
    }

    pub async fn temperature_series(
        &self,
        device_id: &str,
        interval: &str,
    ) -> Result<Vec<(Timestamp, f64)>, DeviceError> {
        let device = self.require_device(device_id).await?;
        if !device.is_temperature_sensor() {
            return Err(DeviceError::WrongKind(
                device.id,
                "temperature sensor".to_string(),
            ));
        }
        let points = self.backend.temperature_history(device_id, interval).await?;
        Ok(decode_series(points))
    }

    async fn require_device(&self, id: &str) -> Result<Device, DeviceError> {
        self.devices
            .by_id(id)
            .await
            .ok_or_else(|| DeviceError::NotFound(id.to_string()))
    }
}

/// Samples with unparseable values or timestamps are dropped, not surfaced
fn decode_series(points: Vec<crate::backend::TelemetryPoint>) -> Vec<(Timestamp, f64)> {
    points
        .into_iter()
        .filter_map(|p| {
            let ts = Timestamp::from_millisecond(p.ts).ok()?;
            let value = p.value.parse().ok()?;
            Some((ts, value))
        })
        .collect()
}
