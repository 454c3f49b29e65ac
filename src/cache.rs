//! On-disk artifact cache keyed by paper identifier.
//!
//! ```text
//! <root>/pdf/<key>.pdf        rendered binary        (pdf_cache_ttl_days)
//! <root>/source/<key>.tar     source archive         (source_cache_ttl_days)
//! <root>/source/<key>/        extracted source tree  (source_cache_ttl_days)
//! <root>/text/<key>.txt       normalized body text   (source_cache_ttl_days)
//! ```
//!
//! Each subdirectory is swept of entries older than its TTL at most once per
//! [`CacheManager`] instance, the first time an artifact under it is
//! requested. A process constructs one manager and shares it, which keeps the
//! "once per run" guarantee without process-wide statics.
//!
//! Writes go through a temp file in the same directory followed by a rename,
//! so a concurrent reader never observes a half-written artifact.

use crate::error::FulltextError;
use crate::paper::cache_key;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

const SECS_PER_DAY: u64 = 86_400;

/// The kinds of artifact kept per identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    RenderedBinary,
    SourceArchive,
    SourceExtracted,
    NormalizedText,
}

/// Cache subdirectories; each carries its own sweep flag and TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bucket {
    Pdf = 0,
    Source = 1,
    Text = 2,
}

impl Bucket {
    fn dir_name(self) -> &'static str {
        match self {
            Bucket::Pdf => "pdf",
            Bucket::Source => "source",
            Bucket::Text => "text",
        }
    }
}

impl CacheKind {
    fn bucket(self) -> Bucket {
        match self {
            CacheKind::RenderedBinary => Bucket::Pdf,
            CacheKind::SourceArchive | CacheKind::SourceExtracted => Bucket::Source,
            CacheKind::NormalizedText => Bucket::Text,
        }
    }

    fn file_name(self, key: &str) -> String {
        match self {
            CacheKind::RenderedBinary => format!("{key}.pdf"),
            CacheKind::SourceArchive => format!("{key}.tar"),
            CacheKind::SourceExtracted => key.to_string(),
            CacheKind::NormalizedText => format!("{key}.txt"),
        }
    }
}

/// Keyed artifact storage with lazy, once-per-instance TTL sweeps.
#[derive(Debug)]
pub struct CacheManager {
    root: PathBuf,
    pdf_ttl_days: i64,
    source_ttl_days: i64,
    swept: [AtomicBool; 3],
}

impl CacheManager {
    pub fn new(root: impl Into<PathBuf>, pdf_ttl_days: i64, source_ttl_days: i64) -> Self {
        Self {
            root: root.into(),
            pdf_ttl_days,
            source_ttl_days,
            swept: [
                AtomicBool::new(false),
                AtomicBool::new(false),
                AtomicBool::new(false),
            ],
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of an artifact, creating (and sweeping on first use) its directory.
    pub fn path(&self, identifier: &str, kind: CacheKind) -> Result<PathBuf, FulltextError> {
        let dir = self.bucket_dir(kind.bucket())?;
        Ok(dir.join(kind.file_name(&cache_key(identifier))))
    }

    /// Path of an existing artifact, if present.
    pub fn get(&self, identifier: &str, kind: CacheKind) -> Option<PathBuf> {
        match self.path(identifier, kind) {
            Ok(path) if path.exists() => Some(path),
            Ok(_) => None,
            Err(e) => {
                warn!("Cache lookup failed for {identifier}: {e}");
                None
            }
        }
    }

    /// Atomically store bytes for an artifact and return its path.
    pub fn put_bytes(
        &self,
        identifier: &str,
        kind: CacheKind,
        bytes: &[u8],
    ) -> Result<PathBuf, FulltextError> {
        let path = self.path(identifier, kind)?;
        write_atomic(&path, bytes)?;
        debug!("Cached {:?} for {identifier} ({} bytes)", kind, bytes.len());
        Ok(path)
    }

    pub fn put_text(
        &self,
        identifier: &str,
        kind: CacheKind,
        text: &str,
    ) -> Result<PathBuf, FulltextError> {
        self.put_bytes(identifier, kind, text.as_bytes())
    }

    /// Delete an artifact. Missing artifacts are not an error.
    pub fn remove(&self, identifier: &str, kind: CacheKind) {
        let Ok(path) = self.path(identifier, kind) else {
            return;
        };
        remove_path(&path);
    }

    /// Sweep every subdirectory now, ignoring the once-per-instance flags.
    pub fn sweep_all(&self) -> usize {
        [Bucket::Pdf, Bucket::Source, Bucket::Text]
            .into_iter()
            .map(|b| sweep(&self.root.join(b.dir_name()), self.ttl_days(b)))
            .sum()
    }

    fn ttl_days(&self, bucket: Bucket) -> i64 {
        match bucket {
            Bucket::Pdf => self.pdf_ttl_days,
            Bucket::Source | Bucket::Text => self.source_ttl_days,
        }
    }

    fn bucket_dir(&self, bucket: Bucket) -> Result<PathBuf, FulltextError> {
        let dir = self.root.join(bucket.dir_name());
        fs::create_dir_all(&dir).map_err(|e| FulltextError::io(&dir, e))?;
        if !self.swept[bucket as usize].swap(true, Ordering::SeqCst) {
            let removed = sweep(&dir, self.ttl_days(bucket));
            if removed > 0 {
                info!("Swept {removed} expired entries from {}", dir.display());
            }
        }
        Ok(dir)
    }
}

/// Delete entries of `dir` whose modification time is older than `ttl_days`.
///
/// Best effort: entries that cannot be inspected or removed are skipped.
/// Returns the number of entries removed. `ttl_days <= 0` disables the sweep.
pub fn sweep(dir: &Path, ttl_days: i64) -> usize {
    if ttl_days <= 0 {
        return 0;
    }
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };
    let max_age = Duration::from_secs((ttl_days as u64).saturating_mul(SECS_PER_DAY));
    let Some(cutoff) = SystemTime::now().checked_sub(max_age) else {
        return 0;
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
            continue;
        };
        if modified >= cutoff {
            continue;
        }
        if remove_path(&path) {
            removed += 1;
        }
    }
    removed
}

/// Remove a file or directory tree; returns whether something was removed.
pub(crate) fn remove_path(path: &Path) -> bool {
    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match result {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            debug!("Could not remove {}: {e}", path.display());
            false
        }
    }
}

/// Write `bytes` to `path` via a sibling temp file and rename.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), FulltextError> {
    let dir = path
        .parent()
        .ok_or_else(|| FulltextError::Internal(format!("no parent for {}", path.display())))?;
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| FulltextError::io(dir, e))?;
    tmp.write_all(bytes).map_err(|e| FulltextError::io(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| FulltextError::io(path, e.error))?;
    Ok(())
}
