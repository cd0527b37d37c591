use std::collections::BTreeSet;
use std::path::PathBuf;

use clap::Parser;

use crate::config::Config;
use crate::coordinator::RunConfig;
use crate::sources::SourceKind;

/// Upload artwork to a Samsung Frame TV.
#[derive(Debug, Parser)]
#[command(name = "artchanger", version)]
pub struct Args {
    /// Upload all new media-folder images at once
    #[arg(long)]
    pub upload_all: bool,
    /// Only check whether the TV is reachable, then exit
    #[arg(long)]
    pub debug: bool,
    /// IP address of the Frame TV
    #[arg(long, value_name = "ADDR")]
    pub tvip: Option<String>,
    /// Download and upload an image from Google Arts & Culture
    #[arg(long)]
    pub googleart: bool,
    /// Request the full-resolution catalog image
    #[arg(long)]
    pub download_high_res: bool,
    /// Download and upload the Bing wallpaper of the day
    #[arg(long)]
    pub bing_wallpapers: bool,
    /// Use images from the local media folder
    #[arg(long)]
    pub media_folder: bool,
    /// Save downloaded and resized images for inspection
    #[arg(long)]
    pub debugimage: bool,
    /// Config file path
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

impl Args {
    pub fn enabled_sources(&self) -> BTreeSet<SourceKind> {
        let mut set = BTreeSet::new();
        if self.bing_wallpapers {
            set.insert(SourceKind::BingWallpapers);
        }
        if self.googleart {
            set.insert(SourceKind::GoogleArt);
        }
        if self.media_folder {
            set.insert(SourceKind::MediaFolder);
        }
        set
    }

    /// `--tvip` wins over `device.address`.
    pub fn run_config(&self, cfg: &Config) -> RunConfig {
        RunConfig {
            sources: self.enabled_sources(),
            upload_all: self.upload_all,
            device_address: self.tvip.clone().or_else(|| cfg.device.address.clone()),
            debug_images: self.debugimage,
        }
    }
}
