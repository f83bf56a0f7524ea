//! Durable set of already-ingested item ids.
//!
//! Stored as a JSON array of strings. A missing or unreadable file is an empty
//! ledger: that favors re-processing (possible duplicate rows) over a failed run.

use crate::util::{create_with_backoff, open_with_backoff, remove_with_backoff, replace_file_atomic_backoff};
use ahash::AHashSet;
use anyhow::{Context, Result};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

#[derive(Clone, Debug, Default)]
pub struct Ledger {
    ids: AHashSet<String>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the ledger at `path`. Never fails: absence and corruption both yield
    /// an empty ledger (corruption is logged).
    pub fn load(path: &Path) -> Self {
        let f = match open_with_backoff(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no ledger yet, starting empty");
                return Self::new();
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ledger unreadable, treating as empty");
                return Self::new();
            }
        };
        match serde_json::from_reader::<_, Vec<String>>(BufReader::new(f)) {
            Ok(ids) => {
                let ledger = Self { ids: ids.into_iter().collect() };
                tracing::debug!(path = %path.display(), ids = ledger.len(), "ledger loaded");
                ledger
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "ledger is corrupt, treating as empty (already-seen items may be re-emitted)"
                );
                Self::new()
            }
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Returns true if the id was not present before.
    pub fn add(&mut self, id: impl Into<String>) -> bool {
        self.ids.insert(id.into())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    /// Overwrite `path` with the full set, sorted. Written to a sibling temp file
    /// first and then swapped in, so a failed write leaves the old file intact.
    pub fn persist(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        let mut ids: Vec<&str> = self.iter().collect();
        ids.sort_unstable();

        let tmp = path.with_extension("json.inprogress");
        let written = (|| -> Result<()> {
            let f = create_with_backoff(&tmp).with_context(|| format!("create {}", tmp.display()))?;
            let mut w = BufWriter::new(f);
            serde_json::to_writer(&mut w, &ids)?;
            w.flush()?;
            w.get_ref().sync_all()?;
            Ok(())
        })();
        if let Err(e) = written {
            let _ = remove_with_backoff(&tmp);
            return Err(e);
        }
        replace_file_atomic_backoff(&tmp, path)?;
        tracing::debug!(path = %path.display(), ids = ids.len(), "ledger persisted");
        Ok(())
    }
}

impl<S: Into<String>> FromIterator<S> for Ledger {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self { ids: iter.into_iter().map(Into::into).collect() }
    }
}
