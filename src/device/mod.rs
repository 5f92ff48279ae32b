pub mod attrs;
pub mod command;
pub mod error;
pub mod mapper;
pub mod model;

use model::Device;
use tokio::sync::Mutex;
use tracing::debug;

/// In-memory ordered collection of devices, keyed by id. Single source of
/// truth for the UI; every mutation funnels through [`Devices::update`] or a
/// whole-record replacement, so two write paths never race on field level.
pub struct Devices {
    list: Mutex<Vec<Device>>,
}

impl Devices {
    pub fn new() -> Self {
        Self {
            list: Mutex::new(Vec::new()),
        }
    }

    /// Replaces the full collection from a bulk fetch
    pub async fn load(&self, devices: Vec<Device>) {
        debug!("loading {} devices", devices.len());
        *self.list.lock().await = devices;
    }

    /// Update-in-place if the id already exists, else append. Create
    /// responses can echo an id that is already cached; this avoids the
    /// duplicate entry.
    pub async fn upsert(&self, device: Device) -> Device {
        let mut list = self.list.lock().await;
        match list.iter_mut().find(|d| d.id == device.id) {
            Some(existing) => *existing = device.clone(),
            None => list.push(device.clone()),
        }
        device
    }

    pub async fn remove(&self, id: &str) -> bool {
        let mut list = self.list.lock().await;
        match list.iter().position(|d| d.id == id) {
            Some(idx) => {
                list.remove(idx);
                true
            }
            None => false,
        }
    }

    pub async fn by_id(&self, id: &str) -> Option<Device> {
        self.list.lock().await.iter().find(|d| d.id == id).cloned()
    }

    /// `"all"` returns every device
    pub async fn by_room(&self, room_id: &str) -> Vec<Device> {
        let list = self.list.lock().await;
        if room_id == "all" {
            return list.clone();
        }
        list.iter()
            .filter(|d| d.room_id.as_deref() == Some(room_id))
            .cloned()
            .collect()
    }

    pub async fn by_type(&self, r#type: &str) -> Vec<Device> {
        self.list
            .lock()
            .await
            .iter()
            .filter(|d| d.r#type == r#type)
            .cloned()
            .collect()
    }

    /// Room filter plus case-insensitive containment over name, type and room
    pub async fn filter(&self, room_id: &str, search: &str) -> Vec<Device> {
        let query = search.to_lowercase();
        self.list
            .lock()
            .await
            .iter()
            .filter(|d| {
                let room_match = room_id == "all" || d.room_id.as_deref() == Some(room_id);
                let search_match = query.is_empty()
                    || d.name.to_lowercase().contains(&query)
                    || d.r#type.to_lowercase().contains(&query)
                    || d.room.to_lowercase().contains(&query);
                room_match && search_match
            })
            .cloned()
            .collect()
    }

    pub async fn all(&self) -> Vec<Device> {
        self.list.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.list.lock().await.len()
    }

    /// The one mutation entry point. Returns the device after the closure
    /// ran, or `None` for an unknown id.
    pub(crate) async fn update<F>(&self, id: &str, f: F) -> Option<Device>
    where
        F: FnOnce(&mut Device),
    {
        let mut list = self.list.lock().await;
        let device = list.iter_mut().find(|d| d.id == id)?;
        f(device);
        Some(device.clone())
    }
}

impl Default for Devices {
    fn default() -> Self {
        Self::new()
    }
}
