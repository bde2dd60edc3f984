//! JSON File License Store
//!
//! Keeps every license in one pretty-printed JSON array. Writes go to a
//! temporary file in the same directory which is fsynced and renamed over the
//! target, so readers only ever see the old or the new file, never a partial
//! one. Mutations are serialised by an in-process mutex held across the
//! whole read-modify-write.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tempfile::NamedTempFile;

use crate::error::{LicensingError, Result};
use crate::license::{LicenseRecord, LicenseStore};

/// File-backed license store
pub struct JsonFileLicenseStore {
    path: PathBuf,
    writer: Mutex<()>,
}

impl JsonFileLicenseStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        // The mutex guards no data, so a poisoned lock is still usable.
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read the file, failing on anything but "does not exist yet"
    fn read_strict(&self) -> Result<Vec<LicenseRecord>> {
        match fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                LicensingError::Storage(format!(
                    "{} is not a valid license file: {e}",
                    self.path.display()
                ))
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(LicensingError::Storage(format!(
                "failed to read {}: {e}",
                self.path.display()
            ))),
        }
    }

    fn write_atomic(&self, records: &[LicenseRecord]) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let storage_err = |what: &str, e: io::Error| {
            LicensingError::Storage(format!("failed to {what} {}: {e}", self.path.display()))
        };

        fs::create_dir_all(dir).map_err(|e| storage_err("prepare directory for", e))?;

        let payload = serde_json::to_vec_pretty(records)?;
        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| storage_err("stage", e))?;
        tmp.write_all(&payload).map_err(|e| storage_err("write", e))?;
        tmp.as_file().sync_all().map_err(|e| storage_err("sync", e))?;
        tmp.persist(&self.path)
            .map_err(|e| storage_err("replace", e.error))?;

        tracing::debug!(path = %self.path.display(), records = records.len(), "License file written");
        Ok(())
    }
}

impl LicenseStore for JsonFileLicenseStore {
    fn load_all(&self) -> Vec<LicenseRecord> {
        self.read_strict().unwrap_or_else(|err| {
            tracing::error!(
                path = %self.path.display(),
                error = %err,
                "License file unreadable, treating as empty"
            );
            Vec::new()
        })
    }

    fn save_all(&self, records: &[LicenseRecord]) -> Result<()> {
        let _guard = self.lock();
        self.write_atomic(records)
    }

    fn mutate<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Vec<LicenseRecord>) -> T,
    {
        let _guard = self.lock();

        // A corrupt file must not be replaced by whatever this mutation adds.
        let mut records = self.read_strict()?;
        let before = records.clone();

        let out = f(&mut records);

        if records != before {
            self.write_atomic(&records)?;
        }
        Ok(out)
    }
}
