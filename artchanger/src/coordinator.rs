use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use tokio::fs;
use tracing::info;

use crate::chooser::{Chooser, pick_one};
use crate::error::RunError;
use crate::gateway::DeviceGateway;
use crate::ledger::{Ledger, LedgerStore, UploadRecord};
use crate::media::{MediaFolder, Selection};
use crate::sources::{Candidate, Fetch, ImageFormatTag, ImageSource, NoCandidate, SourceKind};
use crate::transform::ImageTransform;

/// Everything a single run needs to know from the command line.
#[derive(Debug, Clone, Default)]
pub struct RunConfig {
    pub sources: BTreeSet<SourceKind>,
    /// Upload every media-folder file not yet in the ledger.
    pub upload_all: bool,
    pub device_address: Option<String>,
    /// Write pre- and post-transform images to disk.
    pub debug_images: bool,
}

/// How a run ended when nothing went wrong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// A new image was uploaded and is now shown.
    Uploaded { remote: String },
    /// The image was already on the device and has been selected again.
    Reselected { remote: String },
    /// Bulk mode uploaded `count` images and shows the last one.
    BulkUploaded { count: usize, last: String },
    /// Bulk mode found no file missing from the ledger.
    NothingNew,
    /// A remote source had nothing to offer right now.
    NoCandidate { source: SourceKind },
}

/// Picks a source, avoids re-uploading what the device already has, and records uploads.
pub struct Coordinator {
    gateway: Arc<dyn DeviceGateway>,
    ledger_store: Box<dyn LedgerStore>,
    transform: Box<dyn ImageTransform>,
    chooser: Arc<dyn Chooser>,
    sources: HashMap<SourceKind, Box<dyn ImageSource>>,
    media: Option<MediaFolder>,
    debug_dir: PathBuf,
}

impl Coordinator {
    pub fn new(
        gateway: Arc<dyn DeviceGateway>,
        ledger_store: Box<dyn LedgerStore>,
        transform: Box<dyn ImageTransform>,
        chooser: Arc<dyn Chooser>,
    ) -> Self {
        Self {
            gateway,
            ledger_store,
            transform,
            chooser,
            sources: HashMap::new(),
            media: None,
            debug_dir: PathBuf::from("."),
        }
    }

    pub fn with_source(mut self, source: Box<dyn ImageSource>) -> Self {
        self.sources.insert(source.kind(), source);
        self
    }

    pub fn with_media_folder(mut self, media: MediaFolder) -> Self {
        self.media = Some(media);
        self
    }

    pub fn with_debug_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.debug_dir = dir.into();
        self
    }

    /// Execute one tick: preflight, pick a source, then show or upload one image
    /// (or, in bulk mode, every untracked media-folder image).
    pub async fn run(&self, cfg: &RunConfig) -> Result<RunOutcome, RunError> {
        self.preflight(cfg).await?;

        let enabled: Vec<SourceKind> = cfg.sources.iter().copied().collect();
        let Some(&kind) = pick_one(self.chooser.as_ref(), &enabled) else {
            return Err(RunError::NoSourceConfigured);
        };
        info!(source = %kind, enabled = ?enabled, "selected source");

        let mut ledger = self.ledger_store.load().await.map_err(RunError::Ledger)?;

        match kind {
            SourceKind::MediaFolder => self.run_media_folder(cfg, &mut ledger).await,
            other => self.run_remote(cfg, other).await,
        }
    }

    async fn preflight(&self, cfg: &RunConfig) -> Result<(), RunError> {
        info!(device = ?cfg.device_address, "checking art mode support");
        let supported = self
            .gateway
            .supports_art_mode()
            .await
            .map_err(RunError::DeviceUnreachable)?;
        if !supported {
            return Err(RunError::DeviceUnsupported);
        }
        match self.gateway.current_selection().await {
            Ok(current) => tracing::debug!(%current, "current artwork"),
            Err(e) => tracing::warn!(error = %e, "could not query current artwork"),
        }
        Ok(())
    }

    async fn run_remote(&self, cfg: &RunConfig, kind: SourceKind) -> Result<RunOutcome, RunError> {
        let Some(source) = self.sources.get(&kind) else {
            return Err(RunError::UpstreamFetch {
                kind,
                cause: anyhow::anyhow!("source is not available"),
            });
        };
        info!(source = %kind, "fetching image");
        let fetched = source
            .fetch()
            .await
            .map_err(|cause| RunError::UpstreamFetch { kind, cause })?;
        let candidate = match fetched {
            Fetch::Candidate(c) => c,
            Fetch::Nothing(reason) => {
                info!(source = %kind, reason = ?reason, "no image available");
                return Ok(RunOutcome::NoCandidate { source: kind });
            }
        };
        if let Some(remote) = candidate.identity_hint.as_deref() {
            self.select_existing(remote).await?;
            return Ok(RunOutcome::Reselected {
                remote: remote.to_string(),
            });
        }
        let remote = self.upload(cfg, kind, &candidate).await?;
        self.show(&remote).await?;
        Ok(RunOutcome::Uploaded { remote })
    }

    async fn run_media_folder(
        &self,
        cfg: &RunConfig,
        ledger: &mut Ledger,
    ) -> Result<RunOutcome, RunError> {
        let kind = SourceKind::MediaFolder;
        let Some(media) = self.media.as_ref() else {
            return Err(RunError::UpstreamFetch {
                kind,
                cause: anyhow::anyhow!("media folder is not configured"),
            });
        };
        info!(folder = %media.root().display(), bulk = cfg.upload_all, "fetching image from media folder");
        let selection = media
            .choose(ledger, cfg.upload_all, self.chooser.as_ref())
            .map_err(|cause| RunError::UpstreamFetch { kind, cause })?;

        match selection {
            Selection::Nothing(NoCandidate::NothingNew) => {
                info!("no new images to upload");
                Ok(RunOutcome::NothingNew)
            }
            Selection::Nothing(_) => Err(RunError::EmptyMediaFolder {
                path: media.root().to_path_buf(),
            }),
            Selection::Single(identity) => {
                if let Some(remote) = ledger.lookup(&identity) {
                    let remote = remote.to_string();
                    info!(file = %identity, %remote, "image already on the TV");
                    self.select_existing(&remote).await?;
                    return Ok(RunOutcome::Reselected { remote });
                }
                let candidate = media
                    .read(&identity)
                    .await
                    .map_err(|cause| RunError::UpstreamFetch { kind, cause })?;
                let remote = self.upload(cfg, kind, &candidate).await?;
                self.show(&remote).await?;
                self.record(ledger, identity, &remote).await?;
                Ok(RunOutcome::Uploaded { remote })
            }
            Selection::Batch(identities) => {
                info!(count = identities.len(), "bulk uploading all new images, this may take a while");
                let mut count = 0;
                let mut last = String::new();
                for identity in identities {
                    let candidate = media
                        .read(&identity)
                        .await
                        .map_err(|cause| RunError::UpstreamFetch { kind, cause })?;
                    let remote = self.upload(cfg, kind, &candidate).await?;
                    self.record(ledger, identity, &remote).await?;
                    count += 1;
                    last = remote;
                }
                // Only the final upload is shown.
                self.show(&last).await?;
                Ok(RunOutcome::BulkUploaded { count, last })
            }
        }
    }

    async fn select_existing(&self, remote: &str) -> Result<(), RunError> {
        info!(%remote, "setting existing image, skipping upload");
        self.gateway
            .select(remote, true)
            .await
            .map_err(RunError::Upload)
    }

    /// Transform and upload one candidate, returning the device's identifier for it.
    async fn upload(
        &self,
        cfg: &RunConfig,
        kind: SourceKind,
        candidate: &Candidate,
    ) -> Result<String, RunError> {
        if cfg.debug_images {
            self.save_debug_image(kind, "original", candidate, &candidate.bytes)
                .await;
        }
        info!(source = %kind, label = %candidate.label, "resizing and cropping image");
        let prepared = self
            .transform
            .transform(&candidate.bytes, candidate.format)
            .map_err(RunError::Transform)?;
        if cfg.debug_images {
            self.save_debug_image(kind, "resized", candidate, &prepared)
                .await;
        }

        info!(len = prepared.len(), format = candidate.format.as_str(), "uploading image");
        let remote = self
            .gateway
            .upload(&prepared, candidate.format)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "upload failed");
                RunError::Upload(e)
            })?;
        info!(%remote, "image uploaded");
        Ok(remote)
    }

    async fn show(&self, remote: &str) -> Result<(), RunError> {
        self.gateway.select(remote, true).await.map_err(|e| {
            tracing::error!(%remote, error = %e, "select failed");
            RunError::Upload(e)
        })?;
        info!(%remote, "image selected");
        Ok(())
    }

    async fn record(
        &self,
        ledger: &mut Ledger,
        identity: String,
        remote: &str,
    ) -> Result<(), RunError> {
        self.ledger_store
            .append_and_persist(ledger, UploadRecord::new(identity.clone(), remote))
            .await
            .map_err(RunError::Ledger)?;
        tracing::debug!(file = %identity, %remote, records = ledger.len(), "ledger persisted");
        Ok(())
    }

    /// Inspection artifact; failures are logged and never affect the run.
    async fn save_debug_image(
        &self,
        kind: SourceKind,
        stage: &str,
        candidate: &Candidate,
        bytes: &[u8],
    ) {
        let path = self
            .debug_dir
            .join(debug_image_name(kind, stage, candidate));
        match fs::write(&path, bytes).await {
            Ok(()) => info!(path = %path.display(), "debug image saved"),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed saving debug image")
            }
        }
    }
}

/// `debug_{source}_{stage}_{label}`, with an image extension when the label has none.
fn debug_image_name(kind: SourceKind, stage: &str, candidate: &Candidate) -> String {
    let label = &candidate.label;
    if label.ends_with(".jpg") || label.ends_with(".png") {
        format!("debug_{}_{stage}_{label}", kind.debug_tag())
    } else {
        let ext = match candidate.format {
            ImageFormatTag::Jpeg => "jpg",
            ImageFormatTag::Png => "png",
        };
        format!("debug_{}_{stage}_{label}.{ext}", kind.debug_tag())
    }
}
