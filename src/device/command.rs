use std::collections::BTreeMap;

use jiff::Timestamp;
use serde::Serialize;
use tracing::warn;

use super::{
    attrs::{self, DeviceAttributes},
    error::DeviceError,
    model::{Device, SensorKind},
};
use crate::{backend::Command, history::NewHistoryEntry, state::BurrowState};

pub const SET_STATE: &str = "setState";
pub const UPDATE_ATTRIBUTES: &str = "updateAttributes";
pub const UPDATE_TELEMETRY: &str = "updateTelemetry";

const DEFAULT_BATTERY: &str = "70";

/// Combined color/brightness intent for a light
#[derive(Debug, Clone, Default)]
pub struct LightPatch {
    pub color: Option<String>,
    pub brightness: Option<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct SensorOptions {
    pub battery: Option<String>,
}

/// Outcome of a sensor update. These run from background simulation as much
/// as from user action, so failures are folded in instead of returned as
/// errors.
#[derive(Debug, Clone, Serialize)]
pub struct SensorUpdateResult {
    pub success: bool,
    pub triggered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Sends a command to the backend and, on success, applies the
/// command-specific local reconciliation. A transport failure propagates to
/// the caller untouched.
///
/// Two in-flight commands for the same device are not serialized here; the
/// cache applies reconciliations in completion order, last write observed
/// wins.
pub async fn send_command(
    state: &BurrowState,
    device_id: &str,
    command: &str,
    params: BTreeMap<String, String>,
) -> Result<serde_json::Value, DeviceError> {
    let cmd = Command {
        command: command.to_string(),
        parameters: params.clone(),
    };
    let result = state.backend.send_command(device_id, &cmd).await?;

    if command == SET_STATE {
        let updated = state
            .devices
            .update(device_id, |dev| dev.raw_properties.merge(&params))
            .await;

        if let (Some(device), Some(locked)) = (updated, params.get(attrs::LOCKED))
            && device.is_lock()
        {
            let locked = locked == "true";
            if let Err(e) = state.history.append_lock_entry(&device, locked).await {
                warn!("recording lock transition for `{device_id}`: {e}");
            }
        }
    }

    Ok(result)
}

async fn controllable(state: &BurrowState, id: &str) -> Result<Device, DeviceError> {
    let device = state
        .devices
        .by_id(id)
        .await
        .ok_or_else(|| DeviceError::NotFound(id.to_string()))?;
    if !device.can_control {
        return Err(DeviceError::NotControllable(device.id));
    }
    Ok(device)
}

/// Power a device on or off, optimistically mirroring the result in the
/// cache once the backend accepts the command.
pub async fn toggle(state: &BurrowState, id: &str, active: bool) -> Result<(), DeviceError> {
    let device = controllable(state, id).await?;

    let mut params = DeviceAttributes::default();
    params.set_power(active);
    if device.is_humidity_sensor() {
        params.insert(attrs::LAST_UPDATED, &Timestamp::now().to_string());
    }

    send_command(state, id, SET_STATE, params.into_inner()).await?;
    state.devices.update(id, |dev| dev.active = active).await;
    Ok(())
}

pub async fn set_brightness(state: &BurrowState, id: &str, value: u8) -> Result<(), DeviceError> {
    controllable(state, id).await?;

    let mut params = DeviceAttributes::default();
    params.set_brightness(value);

    send_command(state, id, SET_STATE, params.into_inner()).await?;
    state.devices.update(id, |dev| dev.brightness = value).await;
    Ok(())
}

pub async fn set_color(state: &BurrowState, id: &str, color: &str) -> Result<(), DeviceError> {
    controllable(state, id).await?;

    let hex = color.trim_start_matches('#').to_string();
    let mut params = DeviceAttributes::default();
    params.set_color(&hex);

    send_command(state, id, SET_STATE, params.into_inner()).await?;
    state
        .devices
        .update(id, |dev| dev.color = format!("#{hex}"))
        .await;
    Ok(())
}

/// Configure color and/or brightness in one command. The backend treats
/// configuration and activation as one transaction, so the device is forced
/// into its powered-on state as a side effect.
pub async fn update_light_properties(
    state: &BurrowState,
    id: &str,
    patch: LightPatch,
) -> Result<(), DeviceError> {
    controllable(state, id).await?;

    let mut params = DeviceAttributes::default();
    params.set_power(true);
    let hex = patch.color.map(|c| c.trim_start_matches('#').to_string());
    if let Some(hex) = &hex {
        params.set_color(hex);
    }
    if let Some(brightness) = patch.brightness {
        params.set_brightness(brightness);
    }

    send_command(state, id, SET_STATE, params.into_inner()).await?;
    state
        .devices
        .update(id, |dev| {
            if let Some(hex) = &hex {
                dev.color = format!("#{hex}");
            }
            if let Some(brightness) = patch.brightness {
                dev.brightness = brightness;
            }
            dev.active = true;
        })
        .await;
    Ok(())
}

/// Inverts the lock state, treating a missing `tb_locked` as unlocked.
/// Returns the requested state; the history entry is appended by the
/// `setState` reconciliation.
pub async fn toggle_lock(state: &BurrowState, id: &str) -> Result<bool, DeviceError> {
    let device = controllable(state, id).await?;
    if !device.is_lock() {
        return Err(DeviceError::NotALock(device.id));
    }

    let locked = !device.raw_properties.locked();
    let mut params = DeviceAttributes::default();
    params.set_locked(locked);

    send_command(state, id, SET_STATE, params.into_inner()).await?;
    Ok(locked)
}

/// Applies a sensor reading: optimistic property update, `updateAttributes`
/// dispatch, and a history entry when (and only when) the sensor enters its
/// alert state.
pub async fn update_sensor(
    state: &BurrowState,
    id: &str,
    kind: SensorKind,
    active: bool,
    opts: SensorOptions,
) -> SensorUpdateResult {
    match try_update_sensor(state, id, kind, active, opts).await {
        Ok(()) => SensorUpdateResult {
            success: true,
            triggered: active,
            error: None,
        },
        Err(e) => {
            warn!("updating {kind} sensor `{id}`: {e}");
            SensorUpdateResult {
                success: false,
                triggered: active,
                error: Some(e.to_string()),
            }
        }
    }
}

async fn try_update_sensor(
    state: &BurrowState,
    id: &str,
    kind: SensorKind,
    active: bool,
    opts: SensorOptions,
) -> Result<(), DeviceError> {
    let device = controllable(state, id).await?;
    if !device.is_sensor(kind) {
        return Err(DeviceError::WrongKind(
            device.id,
            format!("{kind} sensor"),
        ));
    }

    let value = kind.encode(active);
    let battery = opts
        .battery
        .or_else(|| device.raw_properties.battery().map(str::to_string))
        .unwrap_or_else(|| DEFAULT_BATTERY.to_string());

    // optimistic; kept even if the backend rejects the command below
    state
        .devices
        .update(id, |dev| {
            dev.raw_properties.insert(kind.value_key(), value);
            dev.raw_properties.insert(attrs::BATTERY, &battery);
        })
        .await;

    let mut params = BTreeMap::new();
    params.insert(kind.value_key().to_string(), value.to_string());
    params.insert(attrs::BATTERY.to_string(), battery);
    send_command(state, id, UPDATE_ATTRIBUTES, params).await?;

    if active {
        let entry = NewHistoryEntry::sensor(&device, kind, active);
        if let Err(e) = state.history.append(entry).await {
            warn!("recording {kind} alert for `{id}`: {e}");
        }
    }

    Ok(())
}

/// Humidity sensor telemetry: dual-writes the plain telemetry keys and the
/// `tb_` property keys, stamps the update time, and dispatches
/// `updateTelemetry`.
pub async fn update_humidity(
    state: &BurrowState,
    id: &str,
    humidity: u8,
    battery: u8,
) -> Result<(), DeviceError> {
    let device = controllable(state, id).await?;
    if !device.is_humidity_sensor() {
        return Err(DeviceError::WrongKind(
            device.id,
            "humidity sensor".to_string(),
        ));
    }

    let now = Timestamp::now().to_string();
    let humidity = humidity.to_string();
    let battery = battery.to_string();

    let mut params = BTreeMap::new();
    params.insert(attrs::HUMIDITY.to_string(), humidity.clone());
    params.insert("battery".to_string(), battery.clone());
    params.insert(attrs::TB_HUMIDITY.to_string(), humidity.clone());
    params.insert(attrs::BATTERY.to_string(), battery.clone());
    params.insert(attrs::LAST_UPDATED.to_string(), now.clone());

    send_command(state, id, UPDATE_TELEMETRY, params).await?;

    state
        .devices
        .update(id, |dev| {
            dev.raw_properties.insert(attrs::TB_HUMIDITY, &humidity);
            dev.raw_properties.insert(attrs::BATTERY, &battery);
            dev.raw_properties.insert(attrs::LAST_UPDATED, &now);
        })
        .await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        backend::mock::MockBackend,
        device::{mapper, model::BackendDevice},
        state::BurrowState,
        store::MemoryStore,
    };

    async fn state_with(records: Vec<BackendDevice>) -> (Arc<BurrowState>, Arc<MockBackend>) {
        let backend = Arc::new(MockBackend::new());
        let state = BurrowState::init(
            backend.clone(),
            Arc::new(MemoryStore::new()),
            true,
        );
        state
            .devices
            .load(records.iter().map(mapper::map_device).collect())
            .await;
        (state, backend)
    }

    fn lamp(id: &str) -> BackendDevice {
        BackendDevice {
            id: id.to_string(),
            name: "Lamp".to_string(),
            r#type: "LIGHT".to_string(),
            ..Default::default()
        }
    }

    fn offline_lamp(id: &str) -> BackendDevice {
        BackendDevice {
            status: Some("OFFLINE".to_string()),
            ..lamp(id)
        }
    }

    fn smart_lock(id: &str) -> BackendDevice {
        BackendDevice {
            id: id.to_string(),
            name: "Front door".to_string(),
            r#type: "LOCK".to_string(),
            category: Some("SECURITY".to_string()),
            sub_type: Some("SMART_LOCK".to_string()),
            ..Default::default()
        }
    }

    fn motion_sensor(id: &str) -> BackendDevice {
        BackendDevice {
            id: id.to_string(),
            name: "Hallway motion".to_string(),
            r#type: "SENSOR".to_string(),
            category: Some("SECURITY".to_string()),
            sub_type: Some("MOTION_SENSOR".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn toggle_sends_dual_keys_and_updates_cache() {
        let (state, backend) = state_with(vec![lamp("a")]).await;

        toggle(&state, "a", true).await.unwrap();

        let commands = backend.commands.lock().unwrap();
        assert_eq!(commands.len(), 1);
        let (id, cmd) = &commands[0];
        assert_eq!(id, "a");
        assert_eq!(cmd.command, SET_STATE);
        assert_eq!(cmd.parameters.get("attr_server_active").unwrap(), "true");
        assert_eq!(cmd.parameters.get("tb_power").unwrap(), "on");
        drop(commands);

        let device = state.devices.by_id("a").await.unwrap();
        assert!(device.active);
        // setState reconciliation merged the params into the bag
        assert_eq!(device.raw_properties.get("tb_power"), Some("on"));
    }

    #[tokio::test]
    async fn offline_device_is_rejected_before_dispatch() {
        let (state, backend) = state_with(vec![offline_lamp("a")]).await;

        let err = set_brightness(&state, "a", 50).await.unwrap_err();
        assert!(matches!(err, DeviceError::NotControllable(_)));
        assert!(backend.commands.lock().unwrap().is_empty());
        assert_eq!(state.devices.by_id("a").await.unwrap().brightness, 0);
    }

    #[tokio::test]
    async fn virtual_offline_device_is_controllable() {
        let mut rec = offline_lamp("a");
        rec.protocol = Some("VIRTUAL".to_string());
        let (state, _) = state_with(vec![rec]).await;

        toggle(&state, "a", true).await.unwrap();
        assert!(state.devices.by_id("a").await.unwrap().active);
    }

    #[tokio::test]
    async fn transport_failure_propagates_and_leaves_cache_alone() {
        let (state, backend) = state_with(vec![lamp("a")]).await;
        backend.fail_commands();

        let err = toggle(&state, "a", true).await.unwrap_err();
        assert!(matches!(err, DeviceError::Backend(_)));
        assert!(!state.devices.by_id("a").await.unwrap().active);
    }

    #[tokio::test]
    async fn set_color_strips_hash() {
        let (state, backend) = state_with(vec![lamp("a")]).await;

        set_color(&state, "a", "#FF8800").await.unwrap();

        let commands = backend.commands.lock().unwrap();
        let (_, cmd) = &commands[0];
        assert_eq!(cmd.parameters.get("color").unwrap(), "FF8800");
        assert_eq!(cmd.parameters.get("tb_color").unwrap(), "FF8800");
        drop(commands);

        assert_eq!(state.devices.by_id("a").await.unwrap().color, "#FF8800");
    }

    #[tokio::test]
    async fn light_properties_force_power_on() {
        let (state, backend) = state_with(vec![lamp("a")]).await;

        update_light_properties(
            &state,
            "a",
            LightPatch {
                color: Some("00FF00".to_string()),
                brightness: Some(80),
            },
        )
        .await
        .unwrap();

        let commands = backend.commands.lock().unwrap();
        let (_, cmd) = &commands[0];
        assert_eq!(cmd.parameters.get("attr_server_active").unwrap(), "true");
        assert_eq!(cmd.parameters.get("tb_power").unwrap(), "on");
        assert_eq!(cmd.parameters.get("tb_brightness").unwrap(), "80");
        drop(commands);

        let device = state.devices.by_id("a").await.unwrap();
        assert!(device.active);
        assert_eq!(device.brightness, 80);
        assert_eq!(device.color, "#00FF00");
    }

    #[tokio::test]
    async fn toggle_lock_defaults_to_unlocked() {
        let (state, backend) = state_with(vec![smart_lock("l")]).await;

        let locked = toggle_lock(&state, "l").await.unwrap();
        assert!(locked);

        let commands = backend.commands.lock().unwrap();
        let (_, cmd) = &commands[0];
        assert_eq!(cmd.parameters.get("tb_locked").unwrap(), "true");
        drop(commands);

        // reconciliation recorded the transition
        let lock_entries = backend.lock_entries.lock().unwrap();
        assert_eq!(lock_entries.len(), 1);
        assert_eq!(lock_entries[0].action.as_deref(), Some("Locked"));
        drop(lock_entries);

        // second toggle inverts the now-cached state
        let locked = toggle_lock(&state, "l").await.unwrap();
        assert!(!locked);
    }

    #[tokio::test]
    async fn toggle_lock_rejects_non_locks() {
        let (state, _) = state_with(vec![lamp("a")]).await;
        let err = toggle_lock(&state, "a").await.unwrap_err();
        assert!(matches!(err, DeviceError::NotALock(_)));
    }

    #[tokio::test]
    async fn sensor_alert_lands_in_history() {
        let (state, backend) = state_with(vec![motion_sensor("m")]).await;

        let res = update_sensor(&state, "m", SensorKind::Motion, true, SensorOptions::default())
            .await;
        assert!(res.success);
        assert!(res.triggered);

        let entries = backend.sensor_entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].sensor_type.as_deref(), Some("motion"));
        assert_eq!(entries[0].priority, crate::history::Priority::Medium);
        drop(entries);

        let device = state.devices.by_id("m").await.unwrap();
        assert_eq!(device.raw_properties.get("tb_motion"), Some("true"));
        assert_eq!(device.raw_properties.get("tb_battery"), Some("70"));
    }

    #[tokio::test]
    async fn sensor_clear_skips_history() {
        let (state, backend) = state_with(vec![motion_sensor("m")]).await;

        let res =
            update_sensor(&state, "m", SensorKind::Motion, false, SensorOptions::default()).await;
        assert!(res.success);
        assert!(!res.triggered);
        assert!(backend.sensor_entries.lock().unwrap().is_empty());
        assert_eq!(
            state
                .devices
                .by_id("m")
                .await
                .unwrap()
                .raw_properties
                .get("tb_motion"),
            Some("false")
        );
    }

    #[tokio::test]
    async fn sensor_failure_folds_into_result() {
        let (state, backend) = state_with(vec![motion_sensor("m")]).await;
        backend.fail_commands();

        let res =
            update_sensor(&state, "m", SensorKind::Motion, true, SensorOptions::default()).await;
        assert!(!res.success);
        assert!(res.error.is_some());

        // the optimistic property write is kept
        assert_eq!(
            state
                .devices
                .by_id("m")
                .await
                .unwrap()
                .raw_properties
                .get("tb_motion"),
            Some("true")
        );
    }

    #[tokio::test]
    async fn sensor_kind_mismatch_folds_into_result() {
        let (state, _) = state_with(vec![motion_sensor("m")]).await;

        let res =
            update_sensor(&state, "m", SensorKind::Smoke, true, SensorOptions::default()).await;
        assert!(!res.success);
        assert!(res.error.unwrap().contains("smoke sensor"));
    }

    #[tokio::test]
    async fn contact_sensor_uses_open_closed_encoding() {
        let mut rec = motion_sensor("c");
        rec.sub_type = Some("CONTACT_SENSOR".to_string());
        let (state, backend) = state_with(vec![rec]).await;

        let res =
            update_sensor(&state, "c", SensorKind::Contact, true, SensorOptions::default()).await;
        assert!(res.success);

        let commands = backend.commands.lock().unwrap();
        let (_, cmd) = &commands[0];
        assert_eq!(cmd.command, UPDATE_ATTRIBUTES);
        assert_eq!(cmd.parameters.get("tb_contact").unwrap(), "open");
        drop(commands);

        let entries = backend.sensor_entries.lock().unwrap();
        assert_eq!(entries[0].value, "open");
        assert_eq!(entries[0].priority, crate::history::Priority::Medium);
    }

    #[tokio::test]
    async fn smoke_alert_is_critical() {
        let mut rec = motion_sensor("s");
        rec.sub_type = Some("SMOKE_SENSOR".to_string());
        let (state, backend) = state_with(vec![rec]).await;

        update_sensor(&state, "s", SensorKind::Smoke, true, SensorOptions::default()).await;
        let entries = backend.sensor_entries.lock().unwrap();
        assert_eq!(entries[0].priority, crate::history::Priority::Critical);
    }

    #[tokio::test]
    async fn humidity_telemetry_dual_writes() {
        let mut rec = lamp("h");
        rec.category = Some("CLIMATE".to_string());
        rec.sub_type = Some("HUMIDITY_SENSOR".to_string());
        let (state, backend) = state_with(vec![rec]).await;

        update_humidity(&state, "h", 45, 88).await.unwrap();

        let commands = backend.commands.lock().unwrap();
        let (_, cmd) = &commands[0];
        assert_eq!(cmd.command, UPDATE_TELEMETRY);
        assert_eq!(cmd.parameters.get("humidity").unwrap(), "45");
        assert_eq!(cmd.parameters.get("tb_humidity").unwrap(), "45");
        assert_eq!(cmd.parameters.get("battery").unwrap(), "88");
        assert_eq!(cmd.parameters.get("tb_battery").unwrap(), "88");
        assert!(cmd.parameters.contains_key("tb_last_updated"));
        drop(commands);

        let device = state.devices.by_id("h").await.unwrap();
        assert_eq!(device.raw_properties.get("tb_humidity"), Some("45"));
    }

    #[tokio::test]
    async fn humidity_rejects_other_devices() {
        let (state, _) = state_with(vec![lamp("a")]).await;
        let err = update_humidity(&state, "a", 45, 88).await.unwrap_err();
        assert!(matches!(err, DeviceError::WrongKind(_, _)));
    }
}
