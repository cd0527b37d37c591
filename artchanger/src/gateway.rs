use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Device;
use crate::sources::ImageFormatTag;

/// Subset of the TV's REST device description we care about.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub device: DeviceDetails,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceDetails {
    #[serde(rename = "modelName", default)]
    pub model_name: Option<String>,
    /// The TV reports booleans as strings here.
    #[serde(rename = "FrameTVSupport", default)]
    pub frame_tv_support: Option<String>,
}

impl DeviceInfo {
    pub fn supports_art_mode(&self) -> bool {
        self.device.frame_tv_support.as_deref() == Some("true")
    }
}

/// Remote control of the display's art mode.
#[async_trait]
pub trait DeviceGateway: Send + Sync {
    async fn device_info(&self) -> Result<DeviceInfo>;
    async fn supports_art_mode(&self) -> Result<bool>;
    /// Identifier of the artwork currently shown.
    async fn current_selection(&self) -> Result<String>;
    /// Store an image on the device, returning the identifier it was assigned.
    async fn upload(&self, bytes: &[u8], format: ImageFormatTag) -> Result<String>;
    async fn select(&self, remote_id: &str, show: bool) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct ContentRef {
    content_id: String,
}

#[derive(Debug, Serialize)]
struct SelectRequest<'a> {
    content_id: &'a str,
    show: bool,
}

/// Gateway for a Frame TV: device info over the TV's REST port, art operations via
/// an HTTP bridge that holds the art channel.
pub struct FrameTvGateway {
    client: reqwest::Client,
    rest_url: String,
    art_bridge: String,
    matte: String,
}

impl FrameTvGateway {
    pub fn new(address: &str, cfg: &Device) -> Result<Self> {
        let art_bridge = cfg
            .art_bridge
            .clone()
            .context("device.art_bridge is not configured")?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs()))
            .build()
            .context("building http client")?;
        Ok(Self {
            client,
            rest_url: format!("http://{}:{}/api/v2/", address, cfg.rest_port()),
            art_bridge: art_bridge.trim_end_matches('/').to_string(),
            matte: cfg.matte().to_string(),
        })
    }

    fn art_url(&self, path: &str) -> String {
        format!("{}/art/{}", self.art_bridge, path)
    }
}

async fn ensure_success(resp: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        bail!("{what} responded with status {status}: {text}");
    }
    Ok(resp)
}

#[async_trait]
impl DeviceGateway for FrameTvGateway {
    async fn device_info(&self) -> Result<DeviceInfo> {
        let resp = self
            .client
            .get(&self.rest_url)
            .send()
            .await
            .with_context(|| format!("requesting {}", self.rest_url))?;
        let resp = ensure_success(resp, "device info").await?;
        resp.json::<DeviceInfo>()
            .await
            .context("decoding device info")
    }

    async fn supports_art_mode(&self) -> Result<bool> {
        Ok(self.device_info().await?.supports_art_mode())
    }

    async fn current_selection(&self) -> Result<String> {
        let resp = self
            .client
            .get(self.art_url("current"))
            .send()
            .await
            .context("art current")?;
        let resp = ensure_success(resp, "art current").await?;
        Ok(resp.json::<ContentRef>().await?.content_id)
    }

    async fn upload(&self, bytes: &[u8], format: ImageFormatTag) -> Result<String> {
        let resp = self
            .client
            .post(self.art_url("upload"))
            .query(&[("file_type", format.as_str()), ("matte", self.matte.as_str())])
            .header(reqwest::header::CONTENT_TYPE, format.mime().essence_str())
            .body(bytes.to_vec())
            .send()
            .await
            .context("art upload")?;
        let resp = ensure_success(resp, "art upload").await?;
        let content = resp
            .json::<ContentRef>()
            .await
            .context("decoding art upload response")?;
        Ok(content.content_id)
    }

    async fn select(&self, remote_id: &str, show: bool) -> Result<()> {
        let resp = self
            .client
            .post(self.art_url("select"))
            .json(&SelectRequest {
                content_id: remote_id,
                show,
            })
            .send()
            .await
            .context("art select")?;
        ensure_success(resp, "art select").await?;
        Ok(())
    }
}

/// Logs instead of talking to a device; hands out sequential `MY-F` identifiers.
#[derive(Debug, Default)]
pub struct DummyGateway {
    uploads: AtomicUsize,
    selected: parking_lot::Mutex<Option<String>>,
}

#[async_trait]
impl DeviceGateway for DummyGateway {
    async fn device_info(&self) -> Result<DeviceInfo> {
        Ok(DeviceInfo {
            name: Some("[dummy] Frame".into()),
            device: DeviceDetails {
                model_name: Some("dummy".into()),
                frame_tv_support: Some("true".into()),
            },
        })
    }

    async fn supports_art_mode(&self) -> Result<bool> {
        Ok(true)
    }

    async fn current_selection(&self) -> Result<String> {
        Ok(self.selected.lock().clone().unwrap_or_default())
    }

    async fn upload(&self, bytes: &[u8], format: ImageFormatTag) -> Result<String> {
        let n = self.uploads.fetch_add(1, Ordering::Relaxed) + 1;
        let id = format!("MY-F{n:04}");
        tracing::info!(len = bytes.len(), format = format.as_str(), remote = %id, "[dummy] would upload image");
        Ok(id)
    }

    async fn select(&self, remote_id: &str, show: bool) -> Result<()> {
        tracing::info!(remote = %remote_id, show, "[dummy] would select image");
        *self.selected.lock() = Some(remote_id.to_string());
        Ok(())
    }
}
