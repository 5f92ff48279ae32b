use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// Known dual-keyed and single-keyed backend property names. The dual keys
// are a backend compatibility shim: every logical attribute must be written
// under both names, and read from either.
pub const SERVER_ACTIVE: &str = "attr_server_active";
pub const POWER: &str = "tb_power";
pub const BRIGHTNESS: &str = "brightness";
pub const TB_BRIGHTNESS: &str = "tb_brightness";
pub const COLOR: &str = "color";
pub const TB_COLOR: &str = "tb_color";
pub const LOCKED: &str = "tb_locked";
pub const BATTERY: &str = "tb_battery";
pub const SENSOR_TYPE: &str = "tb_sensorType";
pub const LAST_UPDATED: &str = "tb_last_updated";
pub const UNIQUE_ID: &str = "device_unique_id";
pub const MOTION: &str = "tb_motion";
pub const CONTACT: &str = "tb_contact";
pub const SMOKE: &str = "tb_smoke";
pub const LEAK: &str = "tb_leak";
pub const HUMIDITY: &str = "humidity";
pub const TB_HUMIDITY: &str = "tb_humidity";

/// The untyped backend property bag, kept verbatim for round-tripping fields
/// the normalized model does not understand. Named accessors cover the known
/// dual-key pairs; everything else goes through the generic map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceAttributes(BTreeMap<String, String>);

impl DeviceAttributes {
    pub fn new(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }

    pub fn into_inner(self) -> BTreeMap<String, String> {
        self.0
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: &str, value: &str) {
        self.0.insert(key.to_string(), value.to_string());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn merge(&mut self, params: &BTreeMap<String, String>) {
        for (key, value) in params {
            self.0.insert(key.clone(), value.clone());
        }
    }

    /// `attr_server_active` flag, if present
    pub fn server_active(&self) -> Option<bool> {
        self.get(SERVER_ACTIVE).map(|v| v == "true")
    }

    /// `tb_power` flag, if present
    pub fn power_on(&self) -> Option<bool> {
        self.get(POWER).map(|v| v == "on")
    }

    pub fn set_power(&mut self, on: bool) {
        self.insert(SERVER_ACTIVE, if on { "true" } else { "false" });
        self.insert(POWER, if on { "on" } else { "off" });
    }

    /// `brightness`, else `tb_brightness`, else 0; invalid strings parse to 0
    pub fn brightness(&self) -> u8 {
        self.get(BRIGHTNESS)
            .or_else(|| self.get(TB_BRIGHTNESS))
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }

    pub fn set_brightness(&mut self, value: u8) {
        let value = value.to_string();
        self.insert(BRIGHTNESS, &value);
        self.insert(TB_BRIGHTNESS, &value);
    }

    /// Raw hex color without the leading `#`, if present
    pub fn color_hex(&self) -> Option<&str> {
        self.get(COLOR).or_else(|| self.get(TB_COLOR))
    }

    /// `hex` must already be stripped of its leading `#`
    pub fn set_color(&mut self, hex: &str) {
        self.insert(COLOR, hex);
        self.insert(TB_COLOR, hex);
    }

    /// Missing `tb_locked` means unlocked
    pub fn locked(&self) -> bool {
        self.get(LOCKED) == Some("true")
    }

    pub fn set_locked(&mut self, locked: bool) {
        self.insert(LOCKED, if locked { "true" } else { "false" });
    }

    pub fn battery(&self) -> Option<&str> {
        self.get(BATTERY)
    }

    pub fn sensor_type(&self) -> Option<&str> {
        self.get(SENSOR_TYPE)
    }

    pub fn unique_id(&self) -> Option<&str> {
        self.get(UNIQUE_ID)
    }
}
