//! Filesystem-backed store of per-recovery-point `index.json` and
//! `chunk.json` manifests, with atomic temp-then-rename writes and an
//! age-based garbage collector.
//!
//! Writes follow the same temp-then-rename-then-fsync discipline as
//! `proxmox_sys::fs::replace_file`: a reader never observes a partial
//! `index.json` or `chunk.json`.

mod atomic;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use log::{debug, info};

use bkp_api_types::{ChunkManifest, Index};

const INDEX_FILE: &str = "index.json";
const CHUNK_FILE: &str = "chunk.json";
const TMP_DIR: &str = "tmp";

/// Directories older than this (by mtime) are eligible for GC.
pub const GC_MAX_AGE: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// `<root>/<recovery_point_id>/` plus a sibling `tmp/` for in-flight writes.
pub struct CacheRepository {
    root: PathBuf,
}

impl CacheRepository {
    /// Creates the root directory if it does not exist yet.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).with_context(|| format!("creating cache root {}", root.display()))?;
        Ok(Self { root })
    }

    fn rp_dir(&self, recovery_point_id: &str) -> PathBuf {
        self.root.join(recovery_point_id)
    }

    fn tmp_dir(&self, recovery_point_id: &str) -> PathBuf {
        self.rp_dir(recovery_point_id).join(TMP_DIR)
    }

    fn ensure_rp_dir(&self, recovery_point_id: &str) -> Result<PathBuf> {
        let dir = self.rp_dir(recovery_point_id);
        fs::create_dir_all(dir.join(TMP_DIR))
            .with_context(|| format!("creating recovery point dir {}", dir.display()))?;
        Ok(dir)
    }

    pub fn write_index(&self, recovery_point_id: &str, index: &Index) -> Result<()> {
        self.ensure_rp_dir(recovery_point_id)?;
        let data = serde_json::to_vec_pretty(index).context("serializing index")?;
        atomic::write_atomic(
            &self.tmp_dir(recovery_point_id),
            &self.rp_dir(recovery_point_id).join(INDEX_FILE),
            &data,
        )
    }

    /// Readers must tolerate the index not existing yet (first backup).
    pub fn read_index(&self, recovery_point_id: &str) -> Result<Option<Index>> {
        let path = self.rp_dir(recovery_point_id).join(INDEX_FILE);
        match fs::read(&path) {
            Ok(data) => Ok(Some(serde_json::from_slice(&data).context("parsing index.json")?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("reading {}", path.display())),
        }
    }

    pub fn write_chunk_manifest(&self, recovery_point_id: &str, manifest: &ChunkManifest) -> Result<()> {
        self.ensure_rp_dir(recovery_point_id)?;
        let data = serde_json::to_vec_pretty(manifest).context("serializing chunk manifest")?;
        atomic::write_atomic(
            &self.tmp_dir(recovery_point_id),
            &self.rp_dir(recovery_point_id).join(CHUNK_FILE),
            &data,
        )
    }

    pub fn read_chunk_manifest(&self, recovery_point_id: &str) -> Result<Option<ChunkManifest>> {
        let path = self.rp_dir(recovery_point_id).join(CHUNK_FILE);
        match fs::read(&path) {
            Ok(data) => Ok(Some(serde_json::from_slice(&data).context("parsing chunk.json")?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("reading {}", path.display())),
        }
    }

    /// Directories whose mtime is older than `max_age`.
    pub fn old_entries(&self, max_age: Duration) -> Result<Vec<PathBuf>> {
        let now = SystemTime::now();
        let mut out = Vec::new();
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(err) => return Err(err).context("listing cache root"),
        };
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let meta = entry.metadata()?;
            let age = now
                .duration_since(meta.modified()?)
                .unwrap_or(Duration::ZERO);
            if age > max_age {
                out.push(entry.path());
            }
        }
        Ok(out)
    }

    /// Deletes directories older than `max_age`. Returns how many were
    /// removed.
    pub fn gc(&self, max_age: Duration) -> Result<usize> {
        let old = self.old_entries(max_age)?;
        for dir in &old {
            debug!("gc: removing {}", dir.display());
            fs::remove_dir_all(dir).with_context(|| format!("removing {}", dir.display()))?;
        }
        if !old.is_empty() {
            info!("gc: removed {} stale recovery-point directories", old.len());
        }
        Ok(old.len())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sample_index() -> Index {
        Index {
            backup_directory_id: "bd1".into(),
            recovery_point_id: "rp1".into(),
            items: HashMap::new(),
            total_files: 0,
        }
    }

    #[test]
    fn read_index_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let repo = CacheRepository::open(dir.path()).unwrap();
        assert!(repo.read_index("rp1").unwrap().is_none());
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let repo = CacheRepository::open(dir.path()).unwrap();
        let index = sample_index();
        repo.write_index("rp1", &index).unwrap();
        let read_back = repo.read_index("rp1").unwrap().unwrap();
        assert_eq!(read_back, index);

        let tmp_dir = dir.path().join("rp1").join("tmp");
        assert!(tmp_dir.read_dir().unwrap().next().is_none(), "no leftover temp files");
    }

    #[test]
    fn gc_removes_only_stale_directories() {
        let dir = tempfile::tempdir().unwrap();
        let repo = CacheRepository::open(dir.path()).unwrap();
        repo.write_index("fresh", &sample_index()).unwrap();

        let stale_dir = dir.path().join("stale");
        fs::create_dir_all(&stale_dir).unwrap();
        let old_time = SystemTime::now() - Duration::from_secs(40 * 24 * 60 * 60);
        filetime::set_file_mtime(&stale_dir, filetime::FileTime::from_system_time(old_time)).unwrap();

        let removed = repo.gc(GC_MAX_AGE).unwrap();
        assert_eq!(removed, 1);
        assert!(dir.path().join("fresh").exists());
        assert!(!stale_dir.exists());
    }
}
