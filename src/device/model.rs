use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::attrs::{self, DeviceAttributes};
use crate::history::Priority;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceCategory {
    Appliances,
    Climate,
    Lighting,
    Security,
}

impl DeviceCategory {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "APPLIANCES" => Some(Self::Appliances),
            "CLIMATE" => Some(Self::Climate),
            "LIGHTING" => Some(Self::Lighting),
            "SECURITY" => Some(Self::Security),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    Motion,
    Contact,
    Smoke,
    Leak,
}

impl SensorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Motion => "motion",
            Self::Contact => "contact",
            Self::Smoke => "smoke",
            Self::Leak => "leak",
        }
    }

    pub fn sub_type(self) -> &'static str {
        match self {
            Self::Motion => "MOTION_SENSOR",
            Self::Contact => "CONTACT_SENSOR",
            Self::Smoke => "SMOKE_SENSOR",
            Self::Leak => "LEAK_SENSOR",
        }
    }

    /// Property-bag key carrying the sensor value
    pub fn value_key(self) -> &'static str {
        match self {
            Self::Motion => attrs::MOTION,
            Self::Contact => attrs::CONTACT,
            Self::Smoke => attrs::SMOKE,
            Self::Leak => attrs::LEAK,
        }
    }

    /// Wire encoding of the boolean sensor state
    pub fn encode(self, active: bool) -> &'static str {
        match (self, active) {
            (Self::Contact, true) => "open",
            (Self::Contact, false) => "closed",
            (_, true) => "true",
            (_, false) => "false",
        }
    }

    pub fn alert_priority(self) -> Priority {
        match self {
            Self::Smoke => Priority::Critical,
            Self::Leak => Priority::High,
            Self::Contact => Priority::Medium,
            Self::Motion => Priority::Medium,
        }
    }

    pub fn message(self, active: bool) -> &'static str {
        match (self, active) {
            (Self::Motion, true) => "Motion detected",
            (Self::Motion, false) => "Motion stopped",
            (Self::Contact, true) => "Door/window opened",
            (Self::Contact, false) => "Door/window closed",
            (Self::Smoke, true) => "Smoke detected!",
            (Self::Smoke, false) => "No smoke detected",
            (Self::Leak, true) => "Water leak detected!",
            (Self::Leak, false) => "No leak detected",
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire-format device record as the backend returns it. The property bag is
/// loosely typed strings; everything optional is defaulted so decoding a
/// sparse record never fails.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BackendDevice {
    pub id: String,
    pub name: String,
    pub r#type: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub sub_type: Option<String>,
    #[serde(default)]
    pub room_id: Option<String>,
    #[serde(default)]
    pub room_name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub thingsboard_id: Option<String>,
    #[serde(default)]
    pub thingsboard_token: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

/// Creation payload. `name` and `type` are required by the backend; the
/// mapper assigns `device_unique_id` into `properties` before posting.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NewDevice {
    pub name: String,
    pub r#type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

/// PUT body for partial device updates
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DeviceUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

/// User-intent patch over the controllable fields. Fields left `None`
/// produce no backend keys (partial patch semantics).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DevicePatch {
    pub active: Option<bool>,
    pub brightness: Option<u8>,
    pub color: Option<String>,
}

/// Frontend-normalized device. Owned by the cache; mutated only through the
/// dispatcher or by re-mapping a fresh backend payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: String,
    pub name: String,
    pub r#type: String,
    pub category: Option<DeviceCategory>,
    pub sub_type: Option<String>,
    pub room: String,
    pub room_id: Option<String>,
    pub active: bool,
    pub brightness: u8,
    pub color: String,
    pub online: bool,
    pub is_virtual: bool,
    pub can_control: bool,
    pub has_color: bool,
    pub protocol: Option<String>,
    pub raw_properties: DeviceAttributes,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub thingsboard_id: Option<String>,
    pub thingsboard_token: Option<String>,
}

impl Device {
    pub fn is_lock(&self) -> bool {
        self.r#type == "lock"
            || (self.category == Some(DeviceCategory::Security)
                && self.sub_type.as_deref() == Some("SMART_LOCK"))
    }

    pub fn is_sensor(&self, kind: SensorKind) -> bool {
        self.r#type == "sensor"
            && (self.sub_type.as_deref() == Some(kind.sub_type())
                || self.raw_properties.sensor_type() == Some(kind.as_str()))
    }

    pub fn is_humidity_sensor(&self) -> bool {
        self.category == Some(DeviceCategory::Climate)
            && self.sub_type.as_deref() == Some("HUMIDITY_SENSOR")
    }

    pub fn is_temperature_sensor(&self) -> bool {
        self.category == Some(DeviceCategory::Climate)
            && (self.sub_type.as_deref() == Some("TEMPERATURE_SENSOR") || self.is_humidity_sensor())
    }

    /// Optimistic application of a user-intent patch, used when the backend
    /// could not be reached. The authoritative path is re-mapping a fresh
    /// payload instead.
    pub fn apply_patch(&mut self, patch: &DevicePatch) {
        if let Some(active) = patch.active {
            self.active = active;
        }
        if let Some(brightness) = patch.brightness {
            self.brightness = brightness;
        }
        if let Some(color) = &patch.color {
            self.color = if color.starts_with('#') {
                color.clone()
            } else {
                format!("#{color}")
            };
        }
    }
}
