use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use glob::{Pattern, glob};
use tokio::fs;

use crate::chooser::{Chooser, pick_one};
use crate::ledger::Ledger;
use crate::sources::{Candidate, ImageFormatTag, NoCandidate};

/// Suffixes picked up from the media folder. Matching is case-sensitive.
const IMAGE_SUFFIXES: [&str; 2] = ["jpg", "png"];

/// What the media folder offers for this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// One file picked at random from everything in the folder.
    Single(String),
    /// Every file not yet in the ledger, in path order.
    Batch(Vec<String>),
    Nothing(NoCandidate),
}

/// Local folder of JPG/PNG files, searched recursively.
#[derive(Debug, Clone)]
pub struct MediaFolder {
    root: PathBuf,
}

impl MediaFolder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Local identities (paths) of every image under the folder, sorted.
    pub fn list_candidates(&self) -> Result<Vec<String>> {
        let escaped = Pattern::escape(&self.root.to_string_lossy());
        let mut files = Vec::new();
        for suffix in IMAGE_SUFFIXES {
            let pattern = format!("{escaped}/**/*.{suffix}");
            let paths = glob(&pattern).with_context(|| format!("evaluating glob {pattern}"))?;
            for path in paths.flatten() {
                if path.is_file() {
                    files.push(path.to_string_lossy().into_owned());
                }
            }
        }
        files.sort();
        files.dedup();
        tracing::debug!(folder = %self.root.display(), total = files.len(), "media folder scanned");
        Ok(files)
    }

    /// Decide what to upload. Single mode draws from all files, including ones already
    /// uploaded; bulk mode returns everything the ledger does not know yet.
    pub fn choose(&self, ledger: &Ledger, bulk: bool, chooser: &dyn Chooser) -> Result<Selection> {
        let files = self.list_candidates()?;
        Ok(select_from(files, ledger, bulk, chooser))
    }

    /// Read one file into a candidate.
    pub async fn read(&self, identity: &str) -> Result<Candidate> {
        let bytes = fs::read(identity)
            .await
            .with_context(|| format!("reading {identity}"))?;
        let format = if identity.ends_with(".jpg") {
            ImageFormatTag::Jpeg
        } else {
            ImageFormatTag::Png
        };
        let label = self.label_for(Path::new(identity));
        Ok(Candidate {
            bytes,
            format,
            identity_hint: None,
            origin: Some(PathBuf::from(identity)),
            label,
        })
    }

    /// Path below the root with separators flattened, so `a/x.jpg` and `b/x.jpg` stay apart.
    fn label_for(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        let parts: Vec<String> = rel
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        if parts.is_empty() {
            path.to_string_lossy().into_owned()
        } else {
            parts.join("_")
        }
    }
}

fn select_from(
    files: Vec<String>,
    ledger: &Ledger,
    bulk: bool,
    chooser: &dyn Chooser,
) -> Selection {
    if files.is_empty() {
        return Selection::Nothing(NoCandidate::EmptyFolder);
    }
    if bulk {
        let fresh: Vec<String> = files.into_iter().filter(|f| !ledger.contains(f)).collect();
        if fresh.is_empty() {
            return Selection::Nothing(NoCandidate::NothingNew);
        }
        return Selection::Batch(fresh);
    }
    match pick_one(chooser, &files) {
        Some(file) => Selection::Single(file.clone()),
        None => Selection::Nothing(NoCandidate::EmptyFolder),
    }
}
