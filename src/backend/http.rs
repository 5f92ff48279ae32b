use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{AckCount, BackendError, Command, DeviceBackend, TelemetryPoint};
use crate::{
    config::BackendConfig,
    device::model::{BackendDevice, DeviceUpdate, NewDevice},
    history::{HistoryEntry, NewHistoryEntry},
};

/// reqwest-backed implementation of the device registry contract
pub struct HttpBackend {
    base: String,
    client: Client,
}

impl HttpBackend {
    pub fn new(cfg: &BackendConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self {
            base: cfg.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn expect_json<T: DeserializeOwned>(req: RequestBuilder) -> Result<T, BackendError> {
        let resp = check_status(req.send().await?)?;
        Ok(resp.json().await?)
    }

    async fn expect_ok(req: RequestBuilder) -> Result<(), BackendError> {
        check_status(req.send().await?)?;
        Ok(())
    }
}

fn check_status(resp: Response) -> Result<Response, BackendError> {
    let status = resp.status();
    debug!("{} {}", resp.url(), status);
    match status {
        s if s.is_success() => Ok(resp),
        StatusCode::CONFLICT => Err(BackendError::Duplicate),
        StatusCode::NOT_FOUND => Err(BackendError::NotFound),
        s => Err(BackendError::Status(s.as_u16())),
    }
}

#[async_trait]
impl DeviceBackend for HttpBackend {
    async fn fetch_devices(&self) -> Result<Vec<BackendDevice>, BackendError> {
        Self::expect_json(self.client.get(self.url("/devices"))).await
    }

    async fn fetch_device(&self, id: &str) -> Result<BackendDevice, BackendError> {
        Self::expect_json(self.client.get(self.url(&format!("/devices/{id}")))).await
    }

    async fn create_device(&self, device: &NewDevice) -> Result<BackendDevice, BackendError> {
        Self::expect_json(self.client.post(self.url("/devices")).json(device)).await
    }

    async fn update_device(
        &self,
        id: &str,
        update: &DeviceUpdate,
    ) -> Result<BackendDevice, BackendError> {
        Self::expect_json(
            self.client
                .put(self.url(&format!("/devices/{id}")))
                .json(update),
        )
        .await
    }

    async fn delete_device(&self, id: &str) -> Result<(), BackendError> {
        Self::expect_ok(self.client.delete(self.url(&format!("/devices/{id}")))).await
    }

    async fn send_command(
        &self,
        id: &str,
        cmd: &Command,
    ) -> Result<serde_json::Value, BackendError> {
        Self::expect_json(
            self.client
                .post(self.url(&format!("/devices/{id}/command")))
                .json(cmd),
        )
        .await
    }

    async fn device_status(&self, id: &str) -> Result<serde_json::Value, BackendError> {
        Self::expect_json(self.client.get(self.url(&format!("/devices/{id}/status")))).await
    }

    async fn available_devices(&self) -> Result<Vec<BackendDevice>, BackendError> {
        Self::expect_json(self.client.get(self.url("/devices/available-devices"))).await
    }

    async fn sync_thingsboard(&self, id: &str) -> Result<(), BackendError> {
        Self::expect_ok(
            self.client
                .post(self.url(&format!("/devices/{id}/sync-thingsboard"))),
        )
        .await
    }

    async fn sensor_history(
        &self,
        device_id: Option<&str>,
    ) -> Result<Vec<HistoryEntry>, BackendError> {
        let path = match device_id {
            Some(id) => format!("/devices/{id}/sensor-history"),
            None => "/devices/sensor-history".to_string(),
        };
        Self::expect_json(self.client.get(self.url(&path))).await
    }

    async fn append_sensor_entry(
        &self,
        device_id: &str,
        entry: &NewHistoryEntry,
    ) -> Result<HistoryEntry, BackendError> {
        Self::expect_json(
            self.client
                .post(self.url(&format!("/devices/{device_id}/sensor-history")))
                .json(entry),
        )
        .await
    }

    async fn acknowledge_entry(&self, entry_id: &str) -> Result<HistoryEntry, BackendError> {
        Self::expect_json(
            self.client
                .put(self.url(&format!("/devices/sensor-history/{entry_id}/acknowledge"))),
        )
        .await
    }

    async fn acknowledge_all(&self, device_id: Option<&str>) -> Result<u64, BackendError> {
        let path = match device_id {
            Some(id) => format!("/devices/{id}/sensor-history/acknowledge-all"),
            None => "/devices/sensor-history/acknowledge-all".to_string(),
        };
        let count: AckCount = Self::expect_json(self.client.post(self.url(&path))).await?;
        Ok(count.acknowledged_count)
    }

    async fn lock_history(
        &self,
        device_id: Option<&str>,
    ) -> Result<Vec<HistoryEntry>, BackendError> {
        let path = match device_id {
            Some(id) => format!("/devices/{id}/lock-history"),
            None => "/devices/lock-history".to_string(),
        };
        Self::expect_json(self.client.get(self.url(&path))).await
    }

    async fn append_lock_entry(
        &self,
        device_id: &str,
        entry: &NewHistoryEntry,
    ) -> Result<HistoryEntry, BackendError> {
        Self::expect_json(
            self.client
                .post(self.url(&format!("/devices/{device_id}/lock-history")))
                .json(entry),
        )
        .await
    }

    async fn humidity_history(
        &self,
        device_id: &str,
        interval: &str,
    ) -> Result<Vec<TelemetryPoint>, BackendError> {
        Self::expect_json(
            self.client
                .get(self.url(&format!("/devices/{device_id}/humidity-history")))
                .query(&[("interval", interval)]),
        )
        .await
    }

    async fn temperature_history(
        &self,
        device_id: &str,
        interval: &str,
    ) -> Result<Vec<TelemetryPoint>, BackendError> {
        Self::expect_json(
            self.client
                .get(self.url(&format!("/devices/{device_id}/temperature-history")))
                .query(&[("interval", interval)]),
        )
        .await
    }
}
