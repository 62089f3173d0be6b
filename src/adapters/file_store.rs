//! File-backed record and config store.
//!
//! Implements both [`RecordStore`] and [`ConfigStore`] over one JSON
//! document:
//!
//! ```json
//! { "change_id": 7,
//!   "options":  { "tare": { "value": "12.5", "change_id": 7 } },
//!   "weights":  [ { "id": "…", "timestamp": "…", "weight": 1.2, "weight_raw": 830.0 } ],
//!   "barcodes": [ { "id": "…", "timestamp": "…", "barcode": "0123" } ] }
//! ```
//!
//! - Atomic writes: every mutation is applied to a copy, written to a
//!   temp file and renamed over the original; memory is updated only once
//!   the rename succeeded.
//! - External edits: an operator (or the API layer) may rewrite the file;
//!   it is re-read whenever its modification time changes.
//! - [`FileStore::in_memory`] keeps everything in RAM (tests, simulation).

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::app::ports::{ConfigStore, RecordStore, StoreError};
use crate::config::ConfigOption;
use crate::records::{Record, RecordId, RecordKind, ScannedCode, WeightRecord};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct StoredOption {
    value: String,
    change_id: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct StoreDoc {
    change_id: u64,
    options: BTreeMap<String, StoredOption>,
    weights: Vec<WeightRecord>,
    barcodes: Vec<ScannedCode>,
}

pub struct FileStore {
    path: Option<PathBuf>,
    doc: RefCell<StoreDoc>,
    /// Modification time of the file as last read or written.
    seen_mtime: Cell<Option<SystemTime>>,
}

impl FileStore {
    /// Open (or create on first write) the store at `path`.
    ///
    /// A file that exists but does not parse is `Corrupted`; it is never
    /// overwritten silently.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let store = Self {
            path: Some(path.clone()),
            doc: RefCell::new(StoreDoc::default()),
            seen_mtime: Cell::new(None),
        };
        if path.exists() {
            store.reload()?;
            let doc = store.doc.borrow();
            info!(
                "FileStore: {} opened (change {}, {} weights, {} barcodes buffered)",
                path.display(),
                doc.change_id,
                doc.weights.len(),
                doc.barcodes.len()
            );
        } else {
            info!("FileStore: {} will be created on first write", path.display());
        }
        Ok(store)
    }

    /// Store with no backing file.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            doc: RefCell::new(StoreDoc::default()),
            seen_mtime: Cell::new(None),
        }
    }

    // ── File I/O ──────────────────────────────────────────────

    fn mtime(path: &Path) -> Option<SystemTime> {
        fs::metadata(path).and_then(|m| m.modified()).ok()
    }

    fn reload(&self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let bytes = fs::read(path)?;
        let doc: StoreDoc = serde_json::from_slice(&bytes).map_err(|e| {
            warn!("FileStore: {} does not parse: {}", path.display(), e);
            StoreError::Corrupted
        })?;
        *self.doc.borrow_mut() = doc;
        self.seen_mtime.set(Self::mtime(path));
        Ok(())
    }

    /// Pick up edits made to the file by someone else.
    fn refresh(&self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let current = Self::mtime(path);
        if current.is_some() && current != self.seen_mtime.get() {
            debug!("FileStore: {} changed on disk, re-reading", path.display());
            self.reload()?;
        }
        Ok(())
    }

    fn persist(&self, doc: &StoreDoc) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        let bytes = serde_json::to_vec_pretty(doc).map_err(|_| StoreError::Corrupted)?;
        let tmp = path.with_extension("tmp");
        {
            let mut f = fs::File::create(&tmp)?;
            f.write_all(&bytes)?;
            f.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        self.seen_mtime.set(Self::mtime(path));
        Ok(())
    }

    /// Apply `f` to a copy, persist it, then make it current.
    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut StoreDoc) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        self.refresh()?;
        let mut next = self.doc.borrow().clone();
        let out = f(&mut next)?;
        self.persist(&next)?;
        *self.doc.borrow_mut() = next;
        Ok(out)
    }

    fn read<T>(&self, f: impl FnOnce(&StoreDoc) -> T) -> Result<T, StoreError> {
        self.refresh()?;
        Ok(f(&self.doc.borrow()))
    }
}

// ───────────────────────────────────────────────────────────────
// RecordStore
// ───────────────────────────────────────────────────────────────

impl RecordStore for FileStore {
    fn append(&self, record: Record) -> Result<RecordId, StoreError> {
        let id = record.id();
        self.mutate(|doc| {
            match record {
                Record::Weight(w) => doc.weights.push(w),
                Record::Barcode(b) => doc.barcodes.push(b),
            }
            Ok(id)
        })
    }

    fn delete(&self, kind: RecordKind, id: RecordId) -> Result<(), StoreError> {
        self.mutate(|doc| {
            let before = match kind {
                RecordKind::Weight => {
                    let n = doc.weights.len();
                    doc.weights.retain(|w| w.id != id);
                    n != doc.weights.len()
                }
                RecordKind::Barcode => {
                    let n = doc.barcodes.len();
                    doc.barcodes.retain(|b| b.id != id);
                    n != doc.barcodes.len()
                }
            };
            if before { Ok(()) } else { Err(StoreError::NotFound) }
        })
    }

    fn list(&self, kind: RecordKind) -> Result<Vec<Record>, StoreError> {
        self.read(|doc| match kind {
            RecordKind::Weight => doc.weights.iter().cloned().map(Record::Weight).collect(),
            RecordKind::Barcode => doc.barcodes.iter().cloned().map(Record::Barcode).collect(),
        })
    }
}

// ───────────────────────────────────────────────────────────────
// ConfigStore
// ───────────────────────────────────────────────────────────────

impl ConfigStore for FileStore {
    fn options(&self) -> Result<Vec<ConfigOption>, StoreError> {
        self.read(|doc| {
            doc.options
                .iter()
                .map(|(name, o)| ConfigOption {
                    name: name.clone(),
                    value: o.value.clone(),
                    change_id: o.change_id,
                })
                .collect()
        })
    }

    fn get(&self, name: &str) -> Result<Option<String>, StoreError> {
        self.read(|doc| doc.options.get(name).map(|o| o.value.clone()))
    }

    fn set(&self, name: &str, value: &str) -> Result<u64, StoreError> {
        self.mutate(|doc| {
            doc.change_id += 1;
            doc.options.insert(
                name.to_owned(),
                StoredOption {
                    value: value.to_owned(),
                    change_id: doc.change_id,
                },
            );
            Ok(doc.change_id)
        })
    }

    fn change_id(&self) -> Result<u64, StoreError> {
        self.read(|doc| doc.change_id)
    }
}
