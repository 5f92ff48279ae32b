use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::device::model::{Device, DeviceCategory};

/// Catalog entry for a registrable widget type
#[derive(Debug, Clone, Serialize)]
pub struct WidgetType {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
    pub allows_multiple: bool,
    pub category: Option<DeviceCategory>,
}

pub const CATALOG: &[WidgetType] = &[
    WidgetType {
        id: "appliances",
        name: "Appliances",
        description: "Control household appliances",
        icon: "fa-tv",
        allows_multiple: true,
        category: Some(DeviceCategory::Appliances),
    },
    WidgetType {
        id: "climate",
        name: "Climate sensors",
        description: "Climate readings",
        icon: "fa-temperature-half",
        allows_multiple: true,
        category: Some(DeviceCategory::Climate),
    },
    WidgetType {
        id: "lighting",
        name: "Lighting",
        description: "Smart lighting control",
        icon: "fa-lightbulb",
        allows_multiple: true,
        category: Some(DeviceCategory::Lighting),
    },
    WidgetType {
        id: "security",
        name: "Security",
        description: "Security devices and sensors",
        icon: "fa-shield-halved",
        allows_multiple: true,
        category: Some(DeviceCategory::Security),
    },
    WidgetType {
        id: "notifications",
        name: "Notifications",
        description: "Latest system notifications",
        icon: "fa-bell",
        allows_multiple: false,
        category: None,
    },
];

pub fn catalog_entry(id: &str) -> Option<&'static WidgetType> {
    CATALOG.iter().find(|t| t.id == id)
}

/// Category -> widget type; uncategorized devices land in appliances
pub fn widget_type_for(device: &Device) -> &'static str {
    match device.category {
        Some(DeviceCategory::Climate) => "climate",
        Some(DeviceCategory::Lighting) => "lighting",
        Some(DeviceCategory::Security) => "security",
        Some(DeviceCategory::Appliances) | None => "appliances",
    }
}

/// Nested widget-type/device-subtype resolution to a rendering component
pub fn resolve_component(widget_type: &str, device_type: Option<&str>) -> &'static str {
    match widget_type {
        "appliances" => match device_type {
            Some("TV") => "TVWidget",
            _ => "GenericApplianceWidget",
        },
        "climate" => match device_type {
            Some("TEMPERATURE_SENSOR") => "TemperatureWidget",
            Some("HUMIDITY_SENSOR") => "HumidityWidget",
            _ => "GenericClimateWidget",
        },
        "lighting" => "LightWidget",
        "security" => "SecurityWidget",
        "notifications" => "NotificationsWidget",
        _ => "GenericWidget",
    }
}

/// One dashboard widget, bound to zero or one device
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Widget {
    pub id: String,
    pub r#type: String,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub device_type: Option<String>,
    #[serde(default)]
    pub settings: Map<String, Value>,
    pub component: String,
    pub created_at: Timestamp,
}

impl Widget {
    pub(crate) fn new(
        entry: &WidgetType,
        device_id: Option<String>,
        device_type: Option<String>,
        settings: Map<String, Value>,
    ) -> Self {
        Self {
            id: format!("widget_{}", Uuid::now_v7().simple()),
            r#type: entry.id.to_string(),
            component: resolve_component(entry.id, device_type.as_deref()).to_string(),
            device_id,
            device_type,
            settings,
            created_at: Timestamp::now(),
        }
    }
}

/// Grid position for one widget, matching the grid-layout contract
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WidgetLayout {
    pub widget_id: String,
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}
