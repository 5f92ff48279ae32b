pub mod widget;

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{Level, error, info, span, warn};
use widget::{Widget, WidgetLayout, catalog_entry, widget_type_for};

use crate::{
    device::model::Device,
    store::{self, LEGACY_LAYOUT_KEY, Persistence, WIDGET_LAYOUTS_KEY, WIDGETS_KEY},
};

struct Panels {
    widgets: Vec<Widget>,
    layouts: Vec<WidgetLayout>,
}

/// Owns the dashboard widget set and its grid layout, persisting both to the
/// durable store. At most one widget may reference a given device, and
/// single-instance widget types appear at most once.
pub struct Dashboard {
    store: Arc<dyn Persistence>,
    inner: Mutex<Panels>,
}

impl Dashboard {
    /// Restores persisted widgets and layouts. A store with no widget entry
    /// at all (as opposed to an empty list) gets the default seed.
    pub fn load(store: Arc<dyn Persistence>) -> Self {
        let span = span!(Level::INFO, "Dashboard");
        let _enter = span.enter();

        let saved: Option<Vec<Widget>> = store::load_json(store.as_ref(), WIDGETS_KEY);
        let layouts: Vec<WidgetLayout> =
            store::load_json(store.as_ref(), WIDGET_LAYOUTS_KEY).unwrap_or_default();

        let mut panels = Panels {
            widgets: saved.clone().unwrap_or_default(),
            layouts,
        };
        if saved.is_none() {
            seed_defaults(&mut panels);
            store::save_json(store.as_ref(), WIDGETS_KEY, &panels.widgets);
        }
        info!("loaded {} widgets", panels.widgets.len());

        Self {
            store,
            inner: Mutex::new(panels),
        }
    }

    pub async fn widgets(&self) -> Vec<Widget> {
        self.inner.lock().await.widgets.clone()
    }

    pub async fn layouts(&self) -> Vec<WidgetLayout> {
        self.inner.lock().await.layouts.clone()
    }

    pub async fn has_widget_for_device(&self, device_id: &str) -> bool {
        self.inner
            .lock()
            .await
            .widgets
            .iter()
            .any(|w| w.device_id.as_deref() == Some(device_id))
    }

    /// True when another widget of this type may still be added
    pub async fn can_add(&self, type_id: &str) -> bool {
        let Some(entry) = catalog_entry(type_id) else {
            return false;
        };
        if entry.allows_multiple {
            return true;
        }
        !self
            .inner
            .lock()
            .await
            .widgets
            .iter()
            .any(|w| w.r#type == type_id)
    }

    /// Adds a widget, or returns `None` (and logs) when the type is unknown,
    /// the device already has a widget, or a single-instance type is
    /// exhausted.
    pub async fn add_widget(
        &self,
        type_id: &str,
        device_id: Option<String>,
        device_type: Option<String>,
        settings: Map<String, Value>,
    ) -> Option<Widget> {
        let Some(entry) = catalog_entry(type_id) else {
            error!("unknown widget type `{type_id}`");
            return None;
        };

        let mut inner = self.inner.lock().await;
        if let Some(device_id) = &device_id
            && inner
                .widgets
                .iter()
                .any(|w| w.device_id.as_deref() == Some(device_id))
        {
            warn!("widget for device `{device_id}` already exists");
            return None;
        }
        if !entry.allows_multiple && inner.widgets.iter().any(|w| w.r#type == type_id) {
            warn!("widget type `{type_id}` allows a single instance");
            return None;
        }

        let widget = Widget::new(entry, device_id, device_type, settings);
        inner.widgets.push(widget.clone());
        self.save_widgets(&inner);
        Some(widget)
    }

    /// Derives the widget type from the device category and binds the widget
    /// to the device, discriminating components by sub-type (falling back to
    /// type).
    pub async fn add_widget_for_device(&self, device: &Device) -> Option<Widget> {
        let type_id = widget_type_for(device);
        let discriminator = device
            .sub_type
            .clone()
            .unwrap_or_else(|| device.r#type.clone());
        self.add_widget(
            type_id,
            Some(device.id.clone()),
            Some(discriminator),
            Map::new(),
        )
        .await
    }

    /// Removes the widget and prunes every layout entry referencing it; the
    /// two collections are persisted together.
    pub async fn remove_widget(&self, id: &str) -> bool {
        let mut inner = self.inner.lock().await;
        let Some(idx) = inner.widgets.iter().position(|w| w.id == id) else {
            return false;
        };
        inner.widgets.remove(idx);
        inner.layouts.retain(|l| l.widget_id != id);
        self.save_widgets(&inner);
        self.save_layouts(&inner);
        true
    }

    /// Merges a settings patch into an existing widget
    pub async fn update_settings(&self, id: &str, patch: Map<String, Value>) -> bool {
        let mut inner = self.inner.lock().await;
        let Some(widget) = inner.widgets.iter_mut().find(|w| w.id == id) else {
            return false;
        };
        for (key, value) in patch {
            widget.settings.insert(key, value);
        }
        self.save_widgets(&inner);
        true
    }

    /// Replaces the grid layout wholesale (the grid reports positions as one
    /// collection)
    pub async fn set_layouts(&self, layouts: Vec<WidgetLayout>) {
        let mut inner = self.inner.lock().await;
        inner.layouts = layouts;
        self.save_layouts(&inner);
    }

    /// Legacy single-layout map, persisted verbatim for old installs
    pub fn save_layout(&self, layout: &Value) {
        store::save_json(self.store.as_ref(), LEGACY_LAYOUT_KEY, layout);
    }

    pub fn load_layout(&self) -> Option<Value> {
        store::load_json(self.store.as_ref(), LEGACY_LAYOUT_KEY)
    }

    pub async fn reset_to_defaults(&self) {
        let mut inner = self.inner.lock().await;
        inner.widgets.clear();
        inner.layouts.clear();
        seed_defaults(&mut inner);
        self.save_widgets(&inner);
        self.save_layouts(&inner);
    }

    fn save_widgets(&self, inner: &Panels) {
        store::save_json(self.store.as_ref(), WIDGETS_KEY, &inner.widgets);
    }

    fn save_layouts(&self, inner: &Panels) {
        store::save_json(self.store.as_ref(), WIDGET_LAYOUTS_KEY, &inner.layouts);
    }
}

fn seed_defaults(panels: &mut Panels) {
    if let Some(entry) = catalog_entry("notifications") {
        panels
            .widgets
            .push(Widget::new(entry, None, None, Map::new()));
    }
}
