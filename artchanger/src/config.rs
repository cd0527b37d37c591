use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tokio::fs;
use toml_edit::DocumentMut;

#[cfg(feature = "embed_example")]
use rust_embed::RustEmbed;

#[cfg(feature = "embed_example")]
#[derive(RustEmbed)]
#[folder = "../"]
#[include = "artchanger.example.toml"]
struct ConfigAssets;

/// Default on-disk config filename
pub const DEFAULT_CONFIG_PATH: &str = "artchanger.toml";

/// Strongly typed representation of the configuration.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    pub logging: Option<Logging>,
    #[serde(default)]
    pub device: Device,
    #[serde(default)]
    pub display: Display,
    #[serde(default)]
    pub media_folder: MediaFolder,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub debug_images: DebugImages,
    #[serde(default)]
    pub sources: Sources,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Logging {
    pub filter: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Device {
    /// Address of the TV. `--tvip` takes precedence.
    pub address: Option<String>,
    pub rest_port: Option<u16>,
    /// Base URL of the HTTP bridge fronting the TV's art channel.
    pub art_bridge: Option<String>,
    pub matte: Option<String>,
    pub timeout_secs: Option<u64>,
    /// Log device calls instead of performing them.
    #[serde(default)]
    pub dummy: bool,
}

impl Device {
    pub fn rest_port(&self) -> u16 {
        self.rest_port.unwrap_or(8001)
    }

    pub fn matte(&self) -> &str {
        self.matte.as_deref().unwrap_or("none")
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs.unwrap_or(30)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Display {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub jpeg_quality: Option<u8>,
}

impl Display {
    /// Frame TVs are 16:9 UHD panels.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width.unwrap_or(3840), self.height.unwrap_or(2160))
    }

    pub fn jpeg_quality(&self) -> u8 {
        self.jpeg_quality.unwrap_or(90).clamp(1, 100)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct MediaFolder {
    pub path: Option<PathBuf>,
}

impl MediaFolder {
    pub fn path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| PathBuf::from("frame"))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct LedgerConfig {
    pub path: Option<PathBuf>,
}

impl LedgerConfig {
    pub fn path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| PathBuf::from("uploaded_files.json"))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct DebugImages {
    pub dir: Option<PathBuf>,
}

impl DebugImages {
    pub fn dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Sources {
    #[serde(default)]
    pub bing: BingSource,
    #[serde(default)]
    pub googleart: CatalogSource,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct BingSource {
    pub market: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct CatalogSource {
    /// Image base URLs served by the catalog CDN; size parameters are appended.
    #[serde(default)]
    pub images: Vec<String>,
    pub high_res_suffix: Option<String>,
}

/// Load the config file. If it does not exist, it is created from the embedded example.
pub async fn load(path: Option<&Path>) -> Result<Config> {
    let path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    if !path.exists() {
        #[cfg(feature = "embed_example")]
        {
            if let Some(example_file) = ConfigAssets::get("artchanger.example.toml") {
                let example_content = std::str::from_utf8(&example_file.data)
                    .with_context(|| "embedded example config is not valid UTF-8")?;

                fs::write(&path, example_content)
                    .await
                    .with_context(|| format!("writing example config to {}", path.display()))?;

                println!("Created default config file: {}", path.display());
                println!("   Edit it to point at your TV and media folder.");
            } else {
                bail!(
                    "config file {} not found and embedded example is not available",
                    path.display()
                );
            }
        }
        #[cfg(not(feature = "embed_example"))]
        {
            bail!("config file {} not found", path.display());
        }
    }

    let text = fs::read_to_string(&path)
        .await
        .with_context(|| format!("reading config file {}", path.display()))?;
    parse(&text).with_context(|| format!("parsing config file {}", path.display()))
}

/// Parse TOML text into the typed config.
pub fn parse(text: &str) -> Result<Config> {
    let doc = text.parse::<DocumentMut>()?;
    let typed: Config = toml_edit::de::from_document(doc)?;
    Ok(typed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let cfg = parse("").unwrap();
        assert_eq!(cfg.display.dimensions(), (3840, 2160));
        assert_eq!(cfg.media_folder.path(), PathBuf::from("frame"));
        assert_eq!(cfg.ledger.path(), PathBuf::from("uploaded_files.json"));
        assert_eq!(cfg.device.rest_port(), 8001);
        assert_eq!(cfg.device.matte(), "none");
        assert!(!cfg.device.dummy);
    }

    #[test]
    fn parses_sections() {
        let cfg = parse(
            r#"
            [logging]
            filter = "debug"

            [device]
            address = "192.168.1.20"
            art_bridge = "http://localhost:8700"
            dummy = true

            [display]
            width = 1920
            height = 1080
            jpeg_quality = 250

            [media_folder]
            path = "/srv/art"

            [sources.googleart]
            images = ["https://lh3.googleusercontent.com/abc"]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.logging.unwrap().filter.as_deref(), Some("debug"));
        assert_eq!(cfg.device.address.as_deref(), Some("192.168.1.20"));
        assert!(cfg.device.dummy);
        assert_eq!(cfg.display.dimensions(), (1920, 1080));
        assert_eq!(cfg.display.jpeg_quality(), 100);
        assert_eq!(cfg.media_folder.path(), PathBuf::from("/srv/art"));
        assert_eq!(cfg.sources.googleart.images.len(), 1);
        assert!(cfg.sources.bing.market.is_none());
    }

    #[test]
    fn example_config_parses() {
        let text = include_str!("../../artchanger.example.toml");
        let cfg = parse(text).unwrap();
        assert_eq!(cfg.ledger.path(), PathBuf::from("uploaded_files.json"));
    }
}
