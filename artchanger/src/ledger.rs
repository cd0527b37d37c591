use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;

/// One local file already uploaded to the TV, keyed by its path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRecord {
    #[serde(rename = "file")]
    pub local_identity: String,
    pub remote_filename: String,
}

impl UploadRecord {
    pub fn new(local_identity: impl Into<String>, remote_filename: impl Into<String>) -> Self {
        Self {
            local_identity: local_identity.into(),
            remote_filename: remote_filename.into(),
        }
    }
}

/// Ordered, append-only list of upload records. At most one record per local identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ledger {
    records: Vec<UploadRecord>,
}

impl Ledger {
    pub fn lookup(&self, local_identity: &str) -> Option<&str> {
        self.records
            .iter()
            .find(|r| r.local_identity == local_identity)
            .map(|r| r.remote_filename.as_str())
    }

    pub fn contains(&self, local_identity: &str) -> bool {
        self.lookup(local_identity).is_some()
    }

    #[cfg(test)]
    pub fn records(&self) -> &[UploadRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn append(&mut self, record: UploadRecord) -> Result<()> {
        if let Some(existing) = self.lookup(&record.local_identity) {
            bail!(
                "{} is already recorded as {}",
                record.local_identity,
                existing
            );
        }
        self.records.push(record);
        Ok(())
    }
}

impl From<Vec<UploadRecord>> for Ledger {
    fn from(records: Vec<UploadRecord>) -> Self {
        Self { records }
    }
}

/// Persistence for the upload ledger.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Read the persisted ledger; a missing store yields an empty ledger.
    async fn load(&self) -> Result<Ledger>;
    /// Append `record` to `ledger` and durably rewrite the whole persisted ledger.
    /// The in-memory ledger is left untouched if persisting fails.
    async fn append_and_persist(&self, ledger: &mut Ledger, record: UploadRecord) -> Result<()>;
}

/// JSON file store: `[{"file": ..., "remote_filename": ...}, ...]`.
#[derive(Debug, Clone)]
pub struct JsonLedgerStore {
    path: PathBuf,
}

impl JsonLedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Atomic write of the full ledger (best-effort durability via rename).
    async fn write(&self, ledger: &Ledger) -> Result<()> {
        let contents = serde_json::to_vec(ledger)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, contents)
            .await
            .with_context(|| format!("writing tmp ledger {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("renaming tmp ledger to {}", self.path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for JsonLedgerStore {
    async fn load(&self) -> Result<Ledger> {
        let exists = fs::try_exists(&self.path)
            .await
            .with_context(|| format!("checking ledger {}", self.path.display()))?;
        if !exists {
            tracing::debug!(path = %self.path.display(), "no ledger on disk; starting empty");
            return Ok(Ledger::default());
        }
        let bytes = fs::read(&self.path)
            .await
            .with_context(|| format!("reading ledger {}", self.path.display()))?;
        let ledger: Ledger = serde_json::from_slice(&bytes)
            .with_context(|| format!("parsing ledger {}", self.path.display()))?;
        if ledger.is_empty() {
            tracing::debug!(path = %self.path.display(), "ledger on disk has no records");
        } else {
            tracing::debug!(path = %self.path.display(), records = ledger.len(), "loaded ledger");
        }
        Ok(ledger)
    }

    async fn append_and_persist(&self, ledger: &mut Ledger, record: UploadRecord) -> Result<()> {
        let mut next = ledger.clone();
        next.append(record)?;
        self.write(&next).await?;
        *ledger = next;
        Ok(())
    }
}

/// In-memory store for tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    persisted: parking_lot::Mutex<Ledger>,
    writes: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MemoryLedgerStore {
    pub fn with_records(records: Vec<UploadRecord>) -> Self {
        Self {
            persisted: parking_lot::Mutex::new(Ledger::from(records)),
            writes: Default::default(),
        }
    }

    pub fn snapshot(&self) -> Ledger {
        self.persisted.lock().clone()
    }

    /// Number of full rewrites performed.
    pub fn writes(&self) -> usize {
        self.writes.load(std::sync::atomic::Ordering::Relaxed)
    }
}

#[cfg(test)]
#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn load(&self) -> Result<Ledger> {
        Ok(self.persisted.lock().clone())
    }

    async fn append_and_persist(&self, ledger: &mut Ledger, record: UploadRecord) -> Result<()> {
        let mut next = ledger.clone();
        next.append(record)?;
        *self.persisted.lock() = next.clone();
        self.writes
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        *ledger = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonLedgerStore::new(dir.path().join("uploaded_files.json"));
        let ledger = store.load().await.unwrap();
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn append_then_load_contains_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonLedgerStore::new(dir.path().join("uploaded_files.json"));
        let mut ledger = store.load().await.unwrap();
        let record = UploadRecord::new("frame/a.jpg", "MY-F0001");
        store
            .append_and_persist(&mut ledger, record.clone())
            .await
            .unwrap();

        let reloaded = store.load().await.unwrap();
        assert_eq!(reloaded.records(), &[record]);
        assert_eq!(reloaded.lookup("frame/a.jpg"), Some("MY-F0001"));
        assert!(!dir.path().join("uploaded_files.json.tmp").exists());
    }

    #[tokio::test]
    async fn persisted_shape_uses_file_and_remote_filename() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uploaded_files.json");
        let store = JsonLedgerStore::new(&path);
        let mut ledger = Ledger::default();
        store
            .append_and_persist(&mut ledger, UploadRecord::new("a.jpg", "R1"))
            .await
            .unwrap();
        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            raw,
            serde_json::json!([{ "file": "a.jpg", "remote_filename": "R1" }])
        );
    }

    #[tokio::test]
    async fn reads_existing_ledger_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uploaded_files.json");
        std::fs::write(
            &path,
            r#"[{"file": "frame/x.png", "remote_filename": "MY-F0042"}]"#,
        )
        .unwrap();
        let ledger = JsonLedgerStore::new(&path).load().await.unwrap();
        assert_eq!(ledger.lookup("frame/x.png"), Some("MY-F0042"));
        assert_eq!(ledger.lookup("frame/y.png"), None);
    }

    #[tokio::test]
    async fn duplicate_identity_is_rejected_and_ledger_untouched() {
        let store = MemoryLedgerStore::with_records(vec![UploadRecord::new("a.jpg", "R1")]);
        let mut ledger = store.load().await.unwrap();
        let err = store
            .append_and_persist(&mut ledger, UploadRecord::new("a.jpg", "R9"))
            .await;
        assert!(err.is_err());
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.lookup("a.jpg"), Some("R1"));
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn failed_write_keeps_memory_and_disk_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uploaded_files.json");
        std::fs::write(&path, r#"[{"file": "a.jpg", "remote_filename": "R1"}]"#).unwrap();
        // A directory in the tmp slot makes the write fail.
        std::fs::create_dir(dir.path().join("uploaded_files.json.tmp")).unwrap();

        let store = JsonLedgerStore::new(&path);
        let mut ledger = store.load().await.unwrap();
        let res = store
            .append_and_persist(&mut ledger, UploadRecord::new("b.jpg", "R2"))
            .await;
        assert!(res.is_err());
        assert_eq!(ledger.len(), 1);
        assert!(!ledger.contains("b.jpg"));

        let reloaded = store.load().await.unwrap();
        assert_eq!(reloaded.records(), &[UploadRecord::new("a.jpg", "R1")]);
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uploaded_files.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(JsonLedgerStore::new(&path).load().await.is_err());
    }
}
