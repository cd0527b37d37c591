mod chooser;
mod cli;
mod config;
mod coordinator;
mod error;
mod gateway;
mod ledger;
mod media;
mod sources;
mod transform;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt};

use crate::chooser::{Chooser, ThreadRngChooser};
use crate::coordinator::{Coordinator, RunConfig};
use crate::gateway::{DeviceGateway, DummyGateway, FrameTvGateway};
use crate::sources::{BingWallpaperSource, CatalogArtSource, SourceKind};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    let args = cli::Args::parse();
    // Load config first so we can honor logging.filter directive.
    let cfg = config::load(args.config.as_deref()).await?;
    let filter_directive = cfg
        .logging
        .as_ref()
        .and_then(|l| l.filter.clone())
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| "info,artchanger=debug".to_string());
    fmt()
        .with_env_filter(EnvFilter::new(filter_directive))
        .init();

    let run_cfg = args.run_config(&cfg);
    let gateway = build_gateway(&cfg, &run_cfg)?;

    if args.debug {
        tracing::info!("checking if the TV can be reached");
        return match gateway.device_info().await {
            Ok(info) => {
                tracing::info!(name = ?info.name, model = ?info.device.model_name, art_mode = info.supports_art_mode(), "TV could be reached");
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => {
                tracing::error!(error = %format!("{e:#}"), "could not reach the TV");
                Ok(ExitCode::FAILURE)
            }
        };
    }

    let coordinator = build_coordinator(&cfg, &args, gateway)?;
    match coordinator.run(&run_cfg).await {
        Ok(outcome) => {
            tracing::info!(outcome = ?outcome, "run finished");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            let e = anyhow::Error::new(e);
            tracing::error!(error = %format!("{e:#}"), "run failed");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn build_gateway(
    cfg: &config::Config,
    run_cfg: &RunConfig,
) -> anyhow::Result<Arc<dyn DeviceGateway>> {
    if cfg.device.dummy {
        tracing::info!("device.dummy is set; no device calls will be made");
        return Ok(Arc::new(DummyGateway::default()));
    }
    let Some(address) = run_cfg.device_address.as_deref() else {
        bail!("no TV address; pass --tvip or set device.address");
    };
    Ok(Arc::new(FrameTvGateway::new(address, &cfg.device)?))
}

fn build_coordinator(
    cfg: &config::Config,
    args: &cli::Args,
    gateway: Arc<dyn DeviceGateway>,
) -> anyhow::Result<Coordinator> {
    let chooser: Arc<dyn Chooser> = Arc::new(ThreadRngChooser);
    let (width, height) = cfg.display.dimensions();
    let transform = transform::CoverCrop {
        width,
        height,
        jpeg_quality: cfg.display.jpeg_quality(),
    };
    let ledger_store = ledger::JsonLedgerStore::new(cfg.ledger.path());
    tracing::debug!(ledger = %ledger_store.path().display(), "using upload ledger");

    let mut coordinator = Coordinator::new(
        gateway,
        Box::new(ledger_store),
        Box::new(transform),
        chooser.clone(),
    )
    .with_debug_dir(cfg.debug_images.dir());

    let enabled = args.enabled_sources();
    if enabled.contains(&SourceKind::BingWallpapers) || enabled.contains(&SourceKind::GoogleArt) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.device.timeout_secs()))
            .build()
            .context("building http client")?;
        if enabled.contains(&SourceKind::BingWallpapers) {
            coordinator = coordinator.with_source(Box::new(BingWallpaperSource::new(
                client.clone(),
                &cfg.sources.bing,
            )));
        }
        if enabled.contains(&SourceKind::GoogleArt) {
            coordinator = coordinator.with_source(Box::new(CatalogArtSource::new(
                client,
                &cfg.sources.googleart,
                args.download_high_res,
                width,
                chooser,
            )));
        }
    }
    if enabled.contains(&SourceKind::MediaFolder) {
        coordinator =
            coordinator.with_media_folder(media::MediaFolder::new(cfg.media_folder.path()));
    }
    Ok(coordinator)
}
