use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::Deserialize;

use crate::chooser::{Chooser, pick_one};
use crate::config::{BingSource, CatalogSource};

/// The sources a run can draw from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceKind {
    GoogleArt,
    BingWallpapers,
    MediaFolder,
}

impl SourceKind {
    /// Short tag used in debug image filenames.
    pub fn debug_tag(self) -> &'static str {
        match self {
            SourceKind::GoogleArt => "googleart",
            SourceKind::BingWallpapers => "bing",
            SourceKind::MediaFolder => "custom",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SourceKind::GoogleArt => "Google Arts & Culture",
            SourceKind::BingWallpapers => "Bing Wallpapers",
            SourceKind::MediaFolder => "Media Folder",
        })
    }
}

/// Encoding of the image bytes as understood by the TV.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormatTag {
    Jpeg,
    Png,
}

impl ImageFormatTag {
    /// Name the TV expects as `file_type`.
    pub fn as_str(self) -> &'static str {
        match self {
            ImageFormatTag::Jpeg => "JPEG",
            ImageFormatTag::Png => "PNG",
        }
    }

    pub fn mime(self) -> mime::Mime {
        match self {
            ImageFormatTag::Jpeg => mime::IMAGE_JPEG,
            ImageFormatTag::Png => mime::IMAGE_PNG,
        }
    }

    /// Sniff the format from magic bytes; anything not PNG is sent as JPEG.
    pub fn sniff(bytes: &[u8]) -> Self {
        match image::guess_format(bytes) {
            Ok(image::ImageFormat::Png) => ImageFormatTag::Png,
            _ => ImageFormatTag::Jpeg,
        }
    }
}

/// An image fetched from a source, not yet confirmed uploaded.
#[derive(Clone)]
pub struct Candidate {
    pub bytes: Vec<u8>,
    pub format: ImageFormatTag,
    /// Remote identifier already known to be on the TV.
    pub identity_hint: Option<String>,
    /// Local file the bytes came from.
    pub origin: Option<PathBuf>,
    /// Names debug artifacts.
    pub label: String,
}

impl fmt::Debug for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Candidate")
            .field("len", &self.bytes.len())
            .field("format", &self.format)
            .field("identity_hint", &self.identity_hint)
            .field("origin", &self.origin)
            .field("label", &self.label)
            .finish()
    }
}

/// Why a source had nothing to offer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoCandidate {
    EmptyFolder,
    NothingNew,
    Unavailable(String),
}

/// Outcome of asking a source for an image. Failures travel in the `Err` arm.
#[derive(Debug)]
pub enum Fetch {
    Candidate(Candidate),
    Nothing(NoCandidate),
}

/// A remote image source.
#[async_trait]
pub trait ImageSource: Send + Sync {
    fn kind(&self) -> SourceKind;
    /// Fetch one candidate. Implementors make a single bounded attempt.
    async fn fetch(&self) -> Result<Fetch>;
}

#[derive(Debug, Deserialize)]
struct BingArchive {
    #[serde(default)]
    images: Vec<BingImage>,
}

#[derive(Debug, Deserialize)]
struct BingImage {
    url: String,
    urlbase: Option<String>,
    startdate: Option<String>,
}

const BING_BASE: &str = "https://www.bing.com";

/// Download URL and label of the current wallpaper, preferring the UHD rendition.
fn bing_image_url(archive: &BingArchive) -> Option<(String, String)> {
    let img = archive.images.first()?;
    let url = match &img.urlbase {
        Some(base) => format!("{BING_BASE}{base}_UHD.jpg"),
        None => format!("{BING_BASE}{}", img.url),
    };
    let label = img.startdate.clone().unwrap_or_else(|| "today".into());
    Some((url, label))
}

/// Bing image-of-the-day feed.
pub struct BingWallpaperSource {
    client: reqwest::Client,
    market: String,
}

impl BingWallpaperSource {
    pub fn new(client: reqwest::Client, cfg: &BingSource) -> Self {
        Self {
            client,
            market: cfg.market.clone().unwrap_or_else(|| "en-US".into()),
        }
    }
}

#[async_trait]
impl ImageSource for BingWallpaperSource {
    fn kind(&self) -> SourceKind {
        SourceKind::BingWallpapers
    }

    async fn fetch(&self) -> Result<Fetch> {
        let resp = self
            .client
            .get(format!("{BING_BASE}/HPImageArchive.aspx"))
            .query(&[
                ("format", "js"),
                ("idx", "0"),
                ("n", "1"),
                ("mkt", self.market.as_str()),
            ])
            .send()
            .await
            .context("bing image archive")?;
        if !resp.status().is_success() {
            bail!("bing image archive responded with status {}", resp.status());
        }
        let archive: BingArchive = resp.json().await.context("decoding bing image archive")?;
        let Some((url, label)) = bing_image_url(&archive) else {
            return Ok(Fetch::Nothing(NoCandidate::Unavailable(
                "bing archive listed no images".into(),
            )));
        };
        tracing::debug!(%url, "downloading bing wallpaper");
        let bytes = download(&self.client, &url).await?;
        Ok(Fetch::Candidate(Candidate {
            format: ImageFormatTag::sniff(&bytes),
            bytes,
            identity_hint: None,
            origin: None,
            label,
        }))
    }
}

/// Curated art catalog (Google Arts & Culture image CDN URLs).
pub struct CatalogArtSource {
    client: reqwest::Client,
    images: Vec<String>,
    size_suffix: String,
    chooser: Arc<dyn Chooser>,
}

impl CatalogArtSource {
    pub fn new(
        client: reqwest::Client,
        cfg: &CatalogSource,
        high_res: bool,
        display_width: u32,
        chooser: Arc<dyn Chooser>,
    ) -> Self {
        let size_suffix = if high_res {
            cfg.high_res_suffix.clone().unwrap_or_else(|| "=s0".into())
        } else {
            format!("=w{display_width}")
        };
        Self {
            client,
            images: cfg.images.clone(),
            size_suffix,
            chooser,
        }
    }

    fn sized_url(&self, base: &str) -> String {
        format!("{}{}", base.trim_end_matches('/'), self.size_suffix)
    }
}

/// Filename-safe tail of a URL path.
fn url_label(url: &str) -> String {
    let tail = url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();
    let cleaned: String = tail
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(64)
        .collect();
    if cleaned.is_empty() {
        "asset".into()
    } else {
        cleaned
    }
}

#[async_trait]
impl ImageSource for CatalogArtSource {
    fn kind(&self) -> SourceKind {
        SourceKind::GoogleArt
    }

    async fn fetch(&self) -> Result<Fetch> {
        let Some(base) = pick_one(self.chooser.as_ref(), &self.images) else {
            return Ok(Fetch::Nothing(NoCandidate::Unavailable(
                "no catalog images configured".into(),
            )));
        };
        let url = self.sized_url(base);
        tracing::debug!(%url, "downloading catalog artwork");
        let bytes = download(&self.client, &url).await?;
        Ok(Fetch::Candidate(Candidate {
            format: ImageFormatTag::sniff(&bytes),
            bytes,
            identity_hint: None,
            origin: None,
            label: url_label(base),
        }))
    }
}

async fn download(client: &reqwest::Client, url: &str) -> Result<Vec<u8>> {
    let resp = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("requesting {url}"))?;
    if !resp.status().is_success() {
        bail!("{url} responded with status {}", resp.status());
    }
    let bytes = resp
        .bytes()
        .await
        .with_context(|| format!("reading body of {url}"))?;
    Ok(bytes.to_vec())
}
