use std::collections::BTreeMap;

use uuid::Uuid;

use super::{
    attrs::{self, DeviceAttributes},
    error::DeviceError,
    model::{BackendDevice, Device, DeviceCategory, DevicePatch, NewDevice},
};

/// Pure backend -> frontend translation. Never fails; missing optional
/// fields fall back to defaults.
pub fn map_device(rec: &BackendDevice) -> Device {
    let properties = DeviceAttributes::new(rec.properties.clone());
    let category = rec.category.as_deref().and_then(DeviceCategory::parse);

    let online = rec.status.as_deref() != Some("OFFLINE");
    let is_virtual = rec.protocol.as_deref() == Some("VIRTUAL");

    Device {
        active: derive_active(&properties, category, rec.sub_type.as_deref()),
        brightness: properties.brightness(),
        color: properties
            .color_hex()
            .map(|hex| format!("#{hex}"))
            .unwrap_or_else(|| "#FFFFFF".to_string()),
        has_color: has_color(rec),
        online,
        is_virtual,
        can_control: online || is_virtual,
        id: rec.id.clone(),
        name: rec.name.clone(),
        r#type: rec.r#type.to_lowercase(),
        category,
        sub_type: rec.sub_type.clone(),
        room: rec
            .room_name
            .clone()
            .unwrap_or_else(|| "Unassigned".to_string()),
        room_id: rec.room_id.clone(),
        protocol: rec.protocol.clone(),
        raw_properties: properties,
        manufacturer: rec.manufacturer.clone(),
        model: rec.model.clone(),
        thingsboard_id: rec.thingsboard_id.clone(),
        thingsboard_token: rec.thingsboard_token.clone(),
    }
}

/// Activity policy is device-class specific: TVs report two power flags that
/// drift apart, so both must agree; every other class treats either flag as
/// authoritative when both are present, mirrors a lone flag, and defaults
/// to inactive.
fn derive_active(
    properties: &DeviceAttributes,
    category: Option<DeviceCategory>,
    sub_type: Option<&str>,
) -> bool {
    let server_active = properties.server_active();
    let power_on = properties.power_on();

    if category == Some(DeviceCategory::Appliances) && sub_type == Some("TV") {
        return server_active == Some(true) && power_on == Some(true);
    }

    match (server_active, power_on) {
        (Some(a), Some(b)) => a || b,
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => false,
    }
}

fn has_color(rec: &BackendDevice) -> bool {
    rec.r#type == "LIGHT"
        || (rec.category.as_deref() == Some("LIGHTING")
            && matches!(rec.sub_type.as_deref(), Some("SMART_BULB") | Some("LED_STRIP")))
}

/// Frontend patch -> dual-keyed backend representation. Fields absent from
/// the patch produce no keys.
pub fn patch_to_backend(patch: &DevicePatch) -> BTreeMap<String, String> {
    let mut out = DeviceAttributes::default();
    if let Some(active) = patch.active {
        out.set_power(active);
    }
    if let Some(brightness) = patch.brightness {
        out.set_brightness(brightness);
    }
    if let Some(color) = &patch.color {
        out.set_color(color.trim_start_matches('#'));
    }
    out.into_inner()
}

/// Validates a creation payload and assigns `device_unique_id` when absent,
/// discriminated by sub-type (falling back to type).
pub fn prepare_new_device(new: &mut NewDevice) -> Result<(), DeviceError> {
    if new.name.trim().is_empty() {
        return Err(DeviceError::MissingField("name"));
    }
    if new.r#type.trim().is_empty() {
        return Err(DeviceError::MissingField("type"));
    }
    if !new.properties.contains_key(attrs::UNIQUE_ID) {
        let discriminator = new.sub_type.as_deref().unwrap_or(&new.r#type);
        let suffix = Uuid::now_v7().simple().to_string();
        new.properties.insert(
            attrs::UNIQUE_ID.to_string(),
            format!("{}_{}", discriminator.to_lowercase(), &suffix[..8]),
        );
    }
    Ok(())
}
