use std::path::PathBuf;

use thiserror::Error;

use crate::sources::SourceKind;

/// Fatal run terminations. Collaborator failures are wrapped here at the coordinator boundary.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("no image source specified; use --googleart, --bing-wallpapers or --media-folder")]
    NoSourceConfigured,
    #[error("the TV does not support art mode")]
    DeviceUnsupported,
    #[error("could not reach the TV")]
    DeviceUnreachable(#[source] anyhow::Error),
    #[error("fetching an image from {kind} failed")]
    UpstreamFetch {
        kind: SourceKind,
        #[source]
        cause: anyhow::Error,
    },
    #[error("no images found in the media folder {}", .path.display())]
    EmptyMediaFolder { path: PathBuf },
    #[error("resizing the image failed")]
    Transform(#[source] anyhow::Error),
    #[error("there was an error uploading the image")]
    Upload(#[source] anyhow::Error),
    #[error("persisting the upload ledger failed")]
    Ledger(#[source] anyhow::Error),
}
