use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};

use bkp_api_types::{ActionState, EngineError, Index, Node, NodeType};
use bkp_control::ControlPlaneClient;
use bkp_progress::{Delta, ProgressReporter};
use bkp_vault::ObjectVault;
use log::warn;

use crate::cancel::CancellationToken;
use crate::pool::WorkerPool;

/// Per-wave coordination for node-level restore parallelism: every node at
/// one directory depth is dispatched to the pool at once and the driving
/// thread blocks until the whole wave completes before moving to the next
/// depth, so a directory is always created before anything inside it is
/// reconciled.
struct NodeWaveBatch {
    results: Mutex<Vec<Option<(String, Result<(), EngineError>)>>>,
    remaining: Mutex<usize>,
    done_cv: Condvar,
}

impl NodeWaveBatch {
    fn new(size: usize) -> Self {
        Self {
            results: Mutex::new((0..size).map(|_| None).collect()),
            remaining: Mutex::new(size),
            done_cv: Condvar::new(),
        }
    }

    fn complete(&self, index: usize, relative_path: String, result: Result<(), EngineError>) {
        self.results.lock().unwrap()[index] = Some((relative_path, result));
        let mut remaining = self.remaining.lock().unwrap();
        *remaining -= 1;
        if *remaining == 0 {
            self.done_cv.notify_all();
        }
    }

    /// Blocks until every node in the wave has completed, then returns each
    /// node's path and outcome.
    fn join(&self) -> Vec<(String, Result<(), EngineError>)> {
        let mut remaining = self.remaining.lock().unwrap();
        while *remaining > 0 {
            remaining = self.done_cv.wait(remaining).unwrap();
        }
        drop(remaining);
        self.results.lock().unwrap().drain(..).map(|slot| slot.expect("wave slot never completed")).collect()
    }
}

/// Drives one restore action against an already-fetched [`Index`]:
/// reconciles directories, symlinks and files against what is already on
/// disk at the destination, fetching only what changed.
pub struct RestoreEngine {
    vault: Arc<dyn ObjectVault>,
    control: Arc<dyn ControlPlaneClient>,
    pool: WorkerPool,
    progress: ProgressReporter,
    cancel: CancellationToken,
}

impl RestoreEngine {
    pub fn new(
        vault: Arc<dyn ObjectVault>,
        control: Arc<dyn ControlPlaneClient>,
        pool: WorkerPool,
        progress: ProgressReporter,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            vault,
            control,
            pool,
            progress,
            cancel,
        }
    }

    /// Fetches `index.json` for `recovery_point_id` and restores it under
    /// `destination`. Nodes are grouped into depth waves so a directory is
    /// always reconciled before anything inside it; within a wave, every
    /// node is dispatched to the worker pool (sized by the same
    /// 20%-of-logical-cores heuristic as the backup engine) and the driving
    /// thread blocks until the wave completes. Errors on individual nodes
    /// are counted and do not abort the remaining nodes.
    pub fn run(&self, recovery_point_id: &str, action_id: &str, destination: &Path) -> Result<(), EngineError> {
        self.report(action_id, ActionState::Scan, 0, "fetching index");
        let index_bytes = self.vault.get_object(&format!("{recovery_point_id}/index.json"))?;
        let index: Index = serde_json::from_slice(&index_bytes).map_err(|e| EngineError::Fatal(e.to_string()))?;

        self.progress.start();
        self.report(action_id, ActionState::Uploading, 10, "restoring entries");

        // Directories must exist before the files/symlinks inside them do;
        // group by depth so each wave only contains siblings.
        let mut entries: Vec<Node> = index.items.into_values().collect();
        entries.sort_by_key(|n| n.relative_path.matches('/').count());

        let mut errors = 0u64;
        let mut succeeded = 0u64;
        let mut start = 0;
        while start < entries.len() {
            self.cancel.check()?;
            let depth = entries[start].relative_path.matches('/').count();
            let mut end = start;
            while end < entries.len() && entries[end].relative_path.matches('/').count() == depth {
                end += 1;
            }
            let wave = &entries[start..end];
            start = end;

            let batch = Arc::new(NodeWaveBatch::new(wave.len()));
            for (index, node) in wave.iter().enumerate() {
                let node = node.clone();
                let destination = destination.to_path_buf();
                let batch_for_job = Arc::clone(&batch);
                let vault = Arc::clone(&self.vault);
                let cancel = self.cancel.clone();
                let abort_handle = self.pool.abort_handle();
                let submitted = self.pool.submit(move || {
                    let relative_path = node.relative_path.clone();
                    let result = reconcile(&vault, &cancel, &node, &destination);
                    if let Err(EngineError::Fatal(msg)) = &result {
                        abort_handle.mark(msg.clone());
                    }
                    batch_for_job.complete(index, relative_path, result);
                });
                if let Err(err) = submitted {
                    batch.complete(index, node.relative_path.clone(), Err(err));
                }
            }

            for (relative_path, result) in batch.join() {
                match result {
                    Ok(()) => {
                        succeeded += 1;
                        self.progress.report(Delta {
                            items: 1,
                            item_name: Some(relative_path),
                            ..Default::default()
                        });
                    }
                    Err(EngineError::Cancelled) => return Err(EngineError::Cancelled),
                    Err(err) => {
                        warn!("failed to restore {relative_path}: {err}");
                        errors += 1;
                        self.progress.report(Delta {
                            errors: 1,
                            ..Default::default()
                        });
                    }
                }
            }
        }

        // A per-node error (unreadable destination, vanished chunk) must
        // not sink the whole action: only a total wipeout, where nothing
        // at all was restored, is FAILED.
        let final_state = if errors > 0 && succeeded == 0 {
            ActionState::Failed
        } else {
            ActionState::Completed
        };
        self.report(action_id, final_state, 100, "restore finished");
        self.progress.done();
        Ok(())
    }

    fn report(&self, action_id: &str, status: ActionState, progress: u8, message: &str) {
        if let Err(err) = self.control.report_activity(action_id, status, progress, message) {
            warn!("failed to report activity: {err}");
        }
    }
}

fn reconcile(vault: &Arc<dyn ObjectVault>, cancel: &CancellationToken, node: &Node, destination: &Path) -> Result<(), EngineError> {
    cancel.check()?;
    let target = destination.join(strip_base(&node.relative_path));
    match node.node_type {
        NodeType::Dir => reconcile_dir(node, &target),
        NodeType::Symlink => reconcile_symlink(node, &target),
        NodeType::File => reconcile_file(vault, cancel, node, &target),
    }
}

fn reconcile_dir(node: &Node, target: &Path) -> Result<(), EngineError> {
    match fs::symlink_metadata(target) {
        Ok(meta) if meta.is_dir() => {
            if ctime_differs(node, target) {
                apply_attributes(node, target)?;
            }
            Ok(())
        }
        _ => {
            fs::create_dir_all(target).map_err(|e| EngineError::Fatal(e.to_string()))?;
            apply_attributes(node, target)
        }
    }
}

fn reconcile_symlink(node: &Node, target: &Path) -> Result<(), EngineError> {
    let link_target = node
        .link_target
        .as_deref()
        .ok_or_else(|| EngineError::Fatal(format!("symlink {} has no recorded target", node.relative_path)))?;

    let exists = fs::symlink_metadata(target).is_ok();
    if !exists {
        create_symlink(link_target, target)?;
    } else if ctime_differs(node, target) {
        let _ = fs::remove_file(target);
        create_symlink(link_target, target)?;
    }
    Ok(())
}

fn reconcile_file(vault: &Arc<dyn ObjectVault>, cancel: &CancellationToken, node: &Node, target: &Path) -> Result<(), EngineError> {
    let exists = fs::symlink_metadata(target).is_ok();
    let needs_redownload = !exists || mtime_differs(node, target);

    if needs_redownload {
        if exists {
            fs::remove_file(target).map_err(|e| EngineError::Fatal(e.to_string()))?;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| EngineError::Fatal(e.to_string()))?;
        }
        download_file(vault, cancel, node, target)?;
    } else if ctime_differs(node, target) {
        apply_attributes(node, target)?;
        return Ok(());
    }
    apply_attributes(node, target)
}

/// Chunks are fetched sequentially in offset order and written in place;
/// fan-out happens one directory-depth wave at a time, one node per pool
/// job, not per-chunk within a single file.
fn download_file(vault: &Arc<dyn ObjectVault>, cancel: &CancellationToken, node: &Node, target: &Path) -> Result<(), EngineError> {
    use std::io::Write;
    let mut file = fs::File::create(target).map_err(|e| EngineError::Fatal(e.to_string()))?;
    for chunk in &node.content {
        cancel.check()?;
        let bytes = vault.get_object(&chunk.etag)?;
        if bytes.len() as u64 != chunk.length {
            return Err(EngineError::Integrity { key: chunk.etag.clone() });
        }
        file.write_all(&bytes).map_err(|e| EngineError::Fatal(e.to_string()))?;
    }
    Ok(())
}

fn strip_base(relative_path: &str) -> PathBuf {
    match relative_path.split_once('/') {
        Some((_, rest)) => PathBuf::from(rest),
        None => PathBuf::new(),
    }
}

fn ctime_differs(node: &Node, target: &Path) -> bool {
    match bkp_walk::read_attributes(target) {
        Ok(attrs) => bkp_walk::format_us(attrs.ctime_us) != node.ctime,
        Err(_) => true,
    }
}

fn mtime_differs(node: &Node, target: &Path) -> bool {
    match bkp_walk::read_attributes(target) {
        Ok(attrs) => bkp_walk::format_us(attrs.mtime_us) != node.mtime,
        Err(_) => true,
    }
}

#[cfg(unix)]
fn create_symlink(link_target: &str, target: &Path) -> Result<(), EngineError> {
    std::os::unix::fs::symlink(link_target, target).map_err(|e| EngineError::Fatal(e.to_string()))
}

#[cfg(windows)]
fn create_symlink(link_target: &str, target: &Path) -> Result<(), EngineError> {
    std::os::windows::fs::symlink_file(link_target, target).map_err(|e| EngineError::Fatal(e.to_string()))
}

#[cfg(unix)]
fn apply_attributes(node: &Node, target: &Path) -> Result<(), EngineError> {
    use nix::sys::stat::{fchmodat, FchmodatFlags, Mode};
    use nix::unistd::{chown, Gid, Uid};

    let mode = Mode::from_bits_truncate(node.mode);
    let _ = fchmodat(None, target, mode, FchmodatFlags::NoFollowSymlink);
    let _ = chown(target, Some(Uid::from_raw(node.uid)), Some(Gid::from_raw(node.gid)));
    set_times(node, target);
    Ok(())
}

#[cfg(windows)]
fn apply_attributes(node: &Node, target: &Path) -> Result<(), EngineError> {
    set_times(node, target);
    Ok(())
}

fn set_times(node: &Node, target: &Path) {
    let (Some(mtime_us), Some(atime_us)) = (bkp_walk::parse_us(&node.mtime), bkp_walk::parse_us(&node.atime)) else {
        return;
    };
    let mtime = filetime::FileTime::from_unix_time(mtime_us.div_euclid(1_000_000), (mtime_us.rem_euclid(1_000_000) * 1000) as u32);
    let atime = filetime::FileTime::from_unix_time(atime_us.div_euclid(1_000_000), (atime_us.rem_euclid(1_000_000) * 1000) as u32);
    let _ = filetime::set_file_times(target, atime, mtime);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_base_drops_root_segment() {
        assert_eq!(strip_base("mydata/a/b.txt"), PathBuf::from("a/b.txt"));
        assert_eq!(strip_base("mydata"), PathBuf::new());
    }
}
