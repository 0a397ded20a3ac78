use std::fs::File;
use std::path::Path;
use std::sync::{Arc, Condvar, Mutex};

use bkp_api_types::{ActionState, ChunkManifest, ChunkRef, EngineError, Index, Node, NodeType, RecoveryPointStatus};
use bkp_chunker::ChunkerStream;
use bkp_control::ControlPlaneClient;
use bkp_datastore::CacheRepository;
use bkp_progress::{Delta, ProgressReporter};
use bkp_vault::{put_chunk_with_verify, put_metadata, ObjectVault};
use bkp_walk::{WalkOutcome, Walker};
use log::{info, warn};

use crate::cancel::CancellationToken;
use crate::digest::{md5_hex, Sha256Accumulator};
use crate::pool::WorkerPool;

/// Per-file coordination for out-of-order chunk uploads: a worker may
/// finish chunk 3 before chunk 1, but the final `Node.content` must read in
/// offset order. Each chunk reserves its slot by index before dispatch; the
/// finishing worker writes into that slot and decrements `remaining`.
struct FileUploadBatch {
    slots: Mutex<Vec<Option<ChunkRef>>>,
    remaining: Mutex<usize>,
    done_cv: Condvar,
    first_error: Mutex<Option<EngineError>>,
}

impl FileUploadBatch {
    fn new() -> Self {
        Self {
            slots: Mutex::new(Vec::new()),
            remaining: Mutex::new(0),
            done_cv: Condvar::new(),
            first_error: Mutex::new(None),
        }
    }

    fn reserve(&self) -> usize {
        let mut slots = self.slots.lock().unwrap();
        let index = slots.len();
        slots.push(None);
        *self.remaining.lock().unwrap() += 1;
        index
    }

    fn complete(&self, index: usize, result: Result<ChunkRef, EngineError>) {
        match result {
            Ok(chunk_ref) => self.slots.lock().unwrap()[index] = Some(chunk_ref),
            Err(err) => {
                let mut first = self.first_error.lock().unwrap();
                if first.is_none() {
                    *first = Some(err);
                }
            }
        }
        let mut remaining = self.remaining.lock().unwrap();
        *remaining -= 1;
        if *remaining == 0 {
            self.done_cv.notify_all();
        }
    }

    /// Blocks until every reserved slot has completed, then returns the
    /// assembled content in offset order, or the first error observed.
    fn join(&self) -> Result<Vec<ChunkRef>, EngineError> {
        let mut remaining = self.remaining.lock().unwrap();
        while *remaining > 0 {
            remaining = self.done_cv.wait(remaining).unwrap();
        }
        drop(remaining);
        if let Some(err) = self.first_error.lock().unwrap().take() {
            return Err(err);
        }
        let slots = self.slots.lock().unwrap();
        slots
            .iter()
            .enumerate()
            .map(|(i, slot)| slot.clone().ok_or_else(|| EngineError::Fatal(format!("chunk slot {i} never completed"))))
            .collect()
    }
}

/// Drives one backup action: walk the source tree, skip unchanged files by
/// comparing against the previous `Index`, chunk and upload changed files
/// through the worker pool, then persist and publish `index.json` /
/// `chunk.json`.
pub struct BackupEngine {
    vault: Arc<dyn ObjectVault>,
    control: Arc<dyn ControlPlaneClient>,
    cache: CacheRepository,
    pool: WorkerPool,
    progress: ProgressReporter,
    cancel: CancellationToken,
}

pub struct BackupParams<'a> {
    pub backup_directory_id: String,
    pub source_path: &'a Path,
    pub recovery_point_id: String,
    pub action_id: String,
    pub previous_index: Option<Index>,
}

impl BackupEngine {
    pub fn new(
        vault: Arc<dyn ObjectVault>,
        control: Arc<dyn ControlPlaneClient>,
        cache: CacheRepository,
        pool: WorkerPool,
        progress: ProgressReporter,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            vault,
            control,
            cache,
            pool,
            progress,
            cancel,
        }
    }

    pub fn run(&self, params: BackupParams) -> Result<Index, EngineError> {
        let action_id = params.action_id.as_str();
        let backup_directory_id = params.backup_directory_id.as_str();
        let recovery_point_id = params.recovery_point_id.as_str();

        self.report(action_id, ActionState::Scan, 0, "scanning source tree");
        self.update_recovery_point(backup_directory_id, recovery_point_id, RecoveryPointStatus::Uploading);
        self.progress.start();

        let mut index = Index::new(params.backup_directory_id.clone(), params.recovery_point_id.clone());
        let mut chunk_manifest = ChunkManifest::new();
        let walker = Walker::new(params.source_path);

        self.report(action_id, ActionState::Uploading, 0, "uploading changed files");
        for outcome in walker.walk() {
            self.cancel.check()?;
            match outcome {
                WalkOutcome::Entry(node) => {
                    self.handle_entry(node, params.previous_index.as_ref(), &mut index, &mut chunk_manifest)?;
                }
                WalkOutcome::Error { path, message } => {
                    warn!("skipping unreadable entry {}: {message}", path.display());
                    self.progress.report(Delta {
                        errors: 1,
                        ..Default::default()
                    });
                }
            }
        }

        self.report(action_id, ActionState::UploadIndex, 90, "publishing index");
        self.publish(recovery_point_id, &index, &chunk_manifest)?;

        // A per-file error (unreadable or vanished source file) must not
        // sink the whole action: only a total wipeout, where nothing at
        // all was uploaded or reused, is FAILED.
        let stat = self.progress.snapshot();
        let final_state = if stat.errors > 0 && stat.items == 0 {
            ActionState::Failed
        } else {
            ActionState::Completed
        };
        let final_rp_status = match final_state {
            ActionState::Failed => RecoveryPointStatus::Failed,
            _ => RecoveryPointStatus::Completed,
        };
        self.update_recovery_point(backup_directory_id, recovery_point_id, final_rp_status);
        self.report(action_id, final_state, 100, "backup finished");
        self.progress.done();
        Ok(index)
    }

    fn handle_entry(
        &self,
        node: Node,
        previous_index: Option<&Index>,
        index: &mut Index,
        chunk_manifest: &mut ChunkManifest,
    ) -> Result<(), EngineError> {
        let relative_path = node.relative_path.clone();

        if node.node_type != NodeType::File {
            index.insert(relative_path, node);
            return Ok(());
        }

        if let Some(previous) = previous_index.and_then(|idx| idx.items.get(&relative_path)) {
            if previous.node_type == NodeType::File && previous.mtime == node.mtime && previous.size == node.size {
                for chunk in &previous.content {
                    chunk_manifest.record(&chunk.etag);
                }
                self.progress.report(Delta {
                    items: 1,
                    item_name: Some(relative_path.clone()),
                    ..Default::default()
                });
                let mut node = node;
                node.content = previous.content.clone();
                node.sha256_hash = previous.sha256_hash.clone();
                index.insert(relative_path, node);
                return Ok(());
            }
        }

        match self.upload_file(&node, chunk_manifest) {
            Ok((content, sha256_hash)) => {
                let mut node = node;
                node.content = content;
                node.sha256_hash = Some(sha256_hash);
                debug_assert!(node.content_is_contiguous());
                self.progress.report(Delta {
                    items: 1,
                    bytes: node.size.unwrap_or(0),
                    item_name: Some(relative_path.clone()),
                    ..Default::default()
                });
                index.insert(relative_path, node);
                Ok(())
            }
            Err(EngineError::Cancelled) => Err(EngineError::Cancelled),
            Err(err) => {
                warn!("failed to upload {relative_path}: {err}");
                self.progress.report(Delta {
                    errors: 1,
                    ..Default::default()
                });
                Ok(())
            }
        }
    }

    fn upload_file(&self, node: &Node, chunk_manifest: &mut ChunkManifest) -> Result<(Vec<ChunkRef>, String), EngineError> {
        let file = File::open(&node.absolute_path).map_err(|e| EngineError::Fatal(e.to_string()))?;
        let mut stream = ChunkerStream::new(file);
        let batch = Arc::new(FileUploadBatch::new());
        let mut hasher = Sha256Accumulator::new();

        loop {
            self.cancel.check()?;
            self.pool.check_abort()?;
            let next = stream
                .next()
                .map_err(|e| EngineError::Fatal(format!("reading {}: {e}", node.absolute_path)))?;
            let Some((offset, length, bytes)) = next else {
                break;
            };
            hasher.update(&bytes);

            let index = batch.reserve();
            let batch_for_job = Arc::clone(&batch);
            let vault = Arc::clone(&self.vault);
            let abort_handle = self.pool.abort_handle();
            let submitted = self.pool.submit(move || {
                let key = md5_hex(&bytes);
                let result = put_chunk_with_verify(vault.as_ref(), &key, &bytes).map(|_| ChunkRef {
                    offset,
                    length: length as u64,
                    etag: key,
                });
                if let Err(EngineError::Fatal(msg)) = &result {
                    abort_handle.mark(msg.clone());
                }
                batch_for_job.complete(index, result);
            });
            if let Err(err) = submitted {
                batch.complete(index, Err(err));
                break;
            }
        }

        let content = batch.join()?;
        for chunk in &content {
            chunk_manifest.record(&chunk.etag);
        }
        Ok((content, hasher.finish_hex()))
    }

    fn publish(&self, recovery_point_id: &str, index: &Index, chunk_manifest: &ChunkManifest) -> Result<(), EngineError> {
        self.cache
            .write_index(recovery_point_id, index)
            .map_err(|e| EngineError::Fatal(e.to_string()))?;
        self.cache
            .write_chunk_manifest(recovery_point_id, chunk_manifest)
            .map_err(|e| EngineError::Fatal(e.to_string()))?;

        let index_bytes = serde_json::to_vec(index).map_err(|e| EngineError::Fatal(e.to_string()))?;
        put_metadata(self.vault.as_ref(), &format!("{recovery_point_id}/index.json"), &index_bytes)?;

        let chunk_bytes = serde_json::to_vec(chunk_manifest).map_err(|e| EngineError::Fatal(e.to_string()))?;
        put_metadata(self.vault.as_ref(), &format!("{recovery_point_id}/chunk.json"), &chunk_bytes)?;

        info!("published index for recovery point {recovery_point_id}");
        Ok(())
    }

    fn report(&self, action_id: &str, status: ActionState, progress: u8, message: &str) {
        // A control-plane hiccup reporting status must not abort the
        // backup itself; it is surfaced by the caller's own retry loop on
        // the next report.
        if let Err(err) = self.control.report_activity(action_id, status, progress, message) {
            warn!("failed to report activity: {err}");
        }
    }

    fn update_recovery_point(&self, backup_directory_id: &str, recovery_point_id: &str, status: RecoveryPointStatus) {
        if let Err(err) = self.control.update_recovery_point(backup_directory_id, recovery_point_id, status) {
            warn!("failed to update recovery point {recovery_point_id}: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    use bkp_api_types::{Activity, AuthRestore, CredentialBundle, RecoveryPointStatus};
    use bkp_control::{ControlPlaneClient, CreateRecoveryPointRequest, CreateRecoveryPointResponse};

    #[derive(Default)]
    struct FakeVault {
        objects: Mutex<HashMap<String, Vec<u8>>>,
        puts: AtomicU32,
    }

    impl ObjectVault for FakeVault {
        fn put_object(&self, key: &str, bytes: &[u8]) -> Result<(), EngineError> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            self.objects.lock().unwrap().insert(key.to_string(), bytes.to_vec());
            Ok(())
        }
        fn put_object_multipart(&self, key: &str, bytes: &[u8]) -> Result<(), EngineError> {
            self.put_object(key, bytes)
        }
        fn get_object(&self, key: &str) -> Result<Vec<u8>, EngineError> {
            self.objects
                .lock()
                .unwrap()
                .get(key)
                .cloned()
                .ok_or_else(|| EngineError::NotFound(key.to_string()))
        }
        fn head_object(&self, key: &str) -> Result<(bool, Option<String>), EngineError> {
            let objects = self.objects.lock().unwrap();
            Ok(match objects.get(key) {
                Some(_) => (true, Some(key.to_string())),
                None => (false, None),
            })
        }
    }

    struct NoopControlPlane;

    impl ControlPlaneClient for NoopControlPlane {
        fn create_recovery_point(
            &self,
            _backup_directory_id: &str,
            _request: &CreateRecoveryPointRequest,
        ) -> anyhow::Result<CreateRecoveryPointResponse> {
            unimplemented!("not exercised by the backup engine")
        }
        fn update_recovery_point(
            &self,
            _backup_directory_id: &str,
            _recovery_point_id: &str,
            _status: RecoveryPointStatus,
        ) -> anyhow::Result<()> {
            Ok(())
        }
        fn get_credential(
            &self,
            _vault_id: &str,
            _action_id: &str,
            _auth_restore: Option<&AuthRestore>,
        ) -> anyhow::Result<CredentialBundle> {
            unimplemented!("not exercised by the backup engine")
        }
        fn get_restore_session_key(
            &self,
            _recovery_point_id: &str,
            _action_id: &str,
            _created_at: &str,
        ) -> anyhow::Result<String> {
            unimplemented!("not exercised by the backup engine")
        }
        fn list_activity(&self, _machine_id: &str, _statuses: &[ActionState]) -> anyhow::Result<Vec<Activity>> {
            Ok(Vec::new())
        }
        fn report_activity(&self, _action_id: &str, _status: ActionState, _progress: u8, _message: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn make_engine(vault: Arc<FakeVault>, cache_root: &Path) -> BackupEngine {
        let cancel = CancellationToken::new();
        BackupEngine::new(
            vault,
            Arc::new(NoopControlPlane),
            CacheRepository::open(cache_root).unwrap(),
            WorkerPool::new("backup-test", 2, cancel.clone()),
            ProgressReporter::new(|_, _, _| {}, |_, _| {}),
            cancel,
        )
    }

    #[test]
    fn unchanged_file_performs_zero_put_object_calls() {
        let source = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let root = source.path().join("data");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("a.txt"), b"hello, world").unwrap();

        let vault = Arc::new(FakeVault::default());

        let engine = make_engine(Arc::clone(&vault), cache.path());
        let first = engine
            .run(BackupParams {
                backup_directory_id: "bd1".into(),
                source_path: &root,
                recovery_point_id: "rp1".into(),
                action_id: "a1".into(),
                previous_index: None,
            })
            .unwrap();

        let puts_after_first = vault.puts.load(Ordering::SeqCst);
        assert!(puts_after_first > 0, "first backup must upload at least the chunk and the manifests");

        let engine = make_engine(Arc::clone(&vault), cache.path());
        engine
            .run(BackupParams {
                backup_directory_id: "bd1".into(),
                source_path: &root,
                recovery_point_id: "rp2".into(),
                action_id: "a2".into(),
                previous_index: Some(first),
            })
            .unwrap();

        // Only index.json/chunk.json get re-published; the unchanged
        // file's chunk is never re-uploaded.
        let chunk_puts_after_second = vault.puts.load(Ordering::SeqCst) - puts_after_first;
        assert_eq!(chunk_puts_after_second, 2, "only the two manifests should be re-published");
    }

    #[test]
    fn changed_mtime_triggers_reupload() {
        let source = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let root = source.path().join("data");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("a.txt"), b"hello, world").unwrap();

        let vault = Arc::new(FakeVault::default());
        let engine = make_engine(Arc::clone(&vault), cache.path());
        let first = engine
            .run(BackupParams {
                backup_directory_id: "bd1".into(),
                source_path: &root,
                recovery_point_id: "rp1".into(),
                action_id: "a1".into(),
                previous_index: None,
            })
            .unwrap();

        std::fs::write(root.join("a.txt"), b"hello, world, changed").unwrap();
        let newer = std::time::SystemTime::now() + std::time::Duration::from_secs(5);
        filetime::set_file_mtime(root.join("a.txt"), filetime::FileTime::from_system_time(newer)).unwrap();

        let puts_before_second = vault.puts.load(Ordering::SeqCst);
        let engine = make_engine(Arc::clone(&vault), cache.path());
        engine
            .run(BackupParams {
                backup_directory_id: "bd1".into(),
                source_path: &root,
                recovery_point_id: "rp2".into(),
                action_id: "a2".into(),
                previous_index: Some(first),
            })
            .unwrap();

        assert!(
            vault.puts.load(Ordering::SeqCst) > puts_before_second + 1,
            "changed content must trigger at least one chunk re-upload plus the two manifests"
        );
    }
}
