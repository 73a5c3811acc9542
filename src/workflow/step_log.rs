//! Write-once step records
//!
//! The existence of a record for a step key is the only signal that the step
//! completed. Records are written once, as soon as the step's side effect
//! succeeded, and never modified.

use chrono::{DateTime, Utc};
use ckb_types::H256;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::errors::{ForgeError, ForgeResult};

/// Persisted evidence of a completed step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step_key: String,
    pub payload: Value,
    pub written_at: DateTime<Utc>,
    /// Transaction the step submitted, kept so its confirmation can be resumed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<H256>,
}

impl StepRecord {
    pub fn new(step_key: &str, payload: Value) -> Self {
        Self {
            step_key: step_key.to_string(),
            payload,
            written_at: Utc::now(),
            tx_hash: None,
        }
    }

    /// Record of a step whose transaction `tx_hash` the node accepted
    pub fn submitted(step_key: &str, tx_hash: H256, payload: Value) -> Self {
        Self {
            tx_hash: Some(tx_hash),
            ..Self::new(step_key, payload)
        }
    }
}

/// Key-value store of step records with atomic, write-once inserts
pub trait StepLog: Send + Sync {
    fn exists(&self, step_key: &str) -> ForgeResult<bool>;

    /// Insert `record` under its step key; fails with `StepAlreadyCompleted` if one exists
    fn write_record(&self, record: &StepRecord) -> ForgeResult<()>;

    fn read(&self, step_key: &str) -> ForgeResult<Option<StepRecord>>;

    fn write(&self, step_key: &str, payload: &Value) -> ForgeResult<()> {
        self.write_record(&StepRecord::new(step_key, payload.clone()))
    }
}

/// Keys become file names, so they are restricted to a safe alphabet
pub fn validate_step_key(step_key: &str) -> ForgeResult<()> {
    let valid = !step_key.is_empty()
        && step_key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !step_key.starts_with('.');
    if valid {
        Ok(())
    } else {
        Err(ForgeError::malformed(format!("invalid step key '{step_key}'")))
    }
}

fn encode(record: &StepRecord) -> ForgeResult<Vec<u8>> {
    serde_json::to_vec_pretty(record)
        .map_err(|e| ForgeError::step_log(format!("encode {}: {e}", record.step_key)))
}

fn decode(step_key: &str, bytes: &[u8]) -> ForgeResult<StepRecord> {
    serde_json::from_slice(bytes)
        .map_err(|e| ForgeError::step_log(format!("corrupt record {step_key}: {e}")))
}

/// One file per step: `<dir>/step-<key>.log`
///
/// Writes go to a temp file in the same directory, are synced, then moved
/// into place without overwriting, so a reader never sees a partial record.
#[derive(Debug, Clone)]
pub struct FileStepLog {
    dir: PathBuf,
}

impl FileStepLog {
    pub fn open(dir: impl AsRef<Path>) -> ForgeResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .map_err(|e| ForgeError::step_log(format!("create {}: {e}", dir.display())))?;
        Ok(Self { dir })
    }

    pub fn path_for(&self, step_key: &str) -> PathBuf {
        self.dir.join(format!("step-{step_key}.log"))
    }
}

impl StepLog for FileStepLog {
    fn exists(&self, step_key: &str) -> ForgeResult<bool> {
        validate_step_key(step_key)?;
        Ok(self.path_for(step_key).exists())
    }

    fn write_record(&self, record: &StepRecord) -> ForgeResult<()> {
        let step_key = record.step_key.as_str();
        validate_step_key(step_key)?;
        let path = self.path_for(step_key);
        if path.exists() {
            return Err(ForgeError::StepAlreadyCompleted(step_key.to_string()));
        }

        let bytes = encode(record)?;
        let mut tmp = NamedTempFile::new_in(&self.dir)
            .map_err(|e| ForgeError::step_log(format!("temp file in {}: {e}", self.dir.display())))?;
        tmp.write_all(&bytes)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| ForgeError::step_log(format!("write {step_key}: {e}")))?;
        tmp.persist_noclobber(&path).map_err(|e| {
            if e.error.kind() == std::io::ErrorKind::AlreadyExists {
                ForgeError::StepAlreadyCompleted(step_key.to_string())
            } else {
                ForgeError::step_log(format!("persist {}: {}", path.display(), e.error))
            }
        })?;

        debug!(step_key, path = %path.display(), "Step record written");
        Ok(())
    }

    fn read(&self, step_key: &str) -> ForgeResult<Option<StepRecord>> {
        validate_step_key(step_key)?;
        let path = self.path_for(step_key);
        match std::fs::read(&path) {
            Ok(bytes) => decode(step_key, &bytes).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ForgeError::step_log(format!("read {}: {e}", path.display()))),
        }
    }
}

/// Step records in a sled tree; inserts are compare-and-swap from empty
pub struct SledStepLog {
    tree: sled::Tree,
}

impl SledStepLog {
    pub fn open(path: impl AsRef<Path>) -> ForgeResult<Self> {
        let db = sled::open(path.as_ref())
            .map_err(|e| ForgeError::step_log(format!("open {}: {e}", path.as_ref().display())))?;
        Self::from_db(&db)
    }

    pub fn from_db(db: &sled::Db) -> ForgeResult<Self> {
        let tree = db
            .open_tree("steps")
            .map_err(|e| ForgeError::step_log(format!("open tree: {e}")))?;
        Ok(Self { tree })
    }
}

impl StepLog for SledStepLog {
    fn exists(&self, step_key: &str) -> ForgeResult<bool> {
        validate_step_key(step_key)?;
        self.tree
            .contains_key(step_key.as_bytes())
            .map_err(|e| ForgeError::step_log(format!("lookup {step_key}: {e}")))
    }

    fn write_record(&self, record: &StepRecord) -> ForgeResult<()> {
        let step_key = record.step_key.as_str();
        validate_step_key(step_key)?;
        let bytes = encode(record)?;
        let swapped = self
            .tree
            .compare_and_swap(step_key.as_bytes(), None as Option<&[u8]>, Some(bytes))
            .map_err(|e| ForgeError::step_log(format!("insert {step_key}: {e}")))?;
        if swapped.is_err() {
            return Err(ForgeError::StepAlreadyCompleted(step_key.to_string()));
        }
        self.tree
            .flush()
            .map_err(|e| ForgeError::step_log(format!("flush {step_key}: {e}")))?;
        debug!(step_key, "Step record written");
        Ok(())
    }

    fn read(&self, step_key: &str) -> ForgeResult<Option<StepRecord>> {
        validate_step_key(step_key)?;
        let value = self
            .tree
            .get(step_key.as_bytes())
            .map_err(|e| ForgeError::step_log(format!("read {step_key}: {e}")))?;
        value.map(|bytes| decode(step_key, &bytes)).transpose()
    }
}

/// Process-local step log, for dry runs and tests
#[derive(Debug, Default)]
pub struct MemoryStepLog {
    records: Mutex<HashMap<String, StepRecord>>,
}

impl MemoryStepLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl StepLog for MemoryStepLog {
    fn exists(&self, step_key: &str) -> ForgeResult<bool> {
        Ok(self.records.lock().contains_key(step_key))
    }

    fn write_record(&self, record: &StepRecord) -> ForgeResult<()> {
        validate_step_key(&record.step_key)?;
        let mut records = self.records.lock();
        if records.contains_key(&record.step_key) {
            return Err(ForgeError::StepAlreadyCompleted(record.step_key.clone()));
        }
        records.insert(record.step_key.clone(), record.clone());
        Ok(())
    }

    fn read(&self, step_key: &str) -> ForgeResult<Option<StepRecord>> {
        Ok(self.records.lock().get(step_key).cloned())
    }
}
