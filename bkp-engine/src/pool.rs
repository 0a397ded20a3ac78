use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use bkp_api_types::EngineError;
use crossbeam_channel::{unbounded, Sender};

use crate::cancel::CancellationToken;

type Job = Box<dyn FnOnce() + Send>;

/// A cloneable handle onto a pool's abort cell, so a job running *inside*
/// the pool can report a fatal, non-retryable error back to it without
/// holding a reference to the pool itself.
#[derive(Clone)]
pub struct AbortHandle(Arc<Mutex<Option<String>>>);

impl AbortHandle {
    /// Records the first fatal error; later calls are no-ops.
    pub fn mark(&self, message: String) {
        let mut guard = self.0.lock().unwrap();
        if guard.is_none() {
            *guard = Some(message);
        }
    }
}

/// A `crossbeam-channel`-backed pool of named worker threads with a shared
/// abort cell recording the first fatal error, shared by the backup and
/// restore engines for chunk uploads and per-node restore work.
pub struct WorkerPool {
    sender: Option<Sender<Job>>,
    handles: Vec<JoinHandle<()>>,
    abort: Arc<Mutex<Option<String>>>,
    name: String,
    cancel: CancellationToken,
}

impl WorkerPool {
    /// `threads` is sized by the caller using `AgentConfig::worker_pool_size`'s
    /// 20%-of-logical-cores (minimum 2) heuristic.
    pub fn new(name: &str, threads: usize, cancel: CancellationToken) -> Self {
        let (tx, rx) = unbounded::<Job>();
        let abort = Arc::new(Mutex::new(None));
        let mut handles = Vec::with_capacity(threads);
        for i in 0..threads.max(1) {
            let rx = rx.clone();
            handles.push(
                std::thread::Builder::new()
                    .name(format!("{name} ({i})"))
                    .spawn(move || {
                        while let Ok(job) = rx.recv() {
                            job();
                        }
                    })
                    .expect("spawn worker thread"),
            );
        }
        Self {
            sender: Some(tx),
            handles,
            abort,
            name: name.to_string(),
            cancel,
        }
    }

    pub fn check_abort(&self) -> Result<(), EngineError> {
        self.cancel.check()?;
        let guard = self.abort.lock().unwrap();
        match &*guard {
            Some(msg) => Err(EngineError::Fatal(format!("{}: {msg}", self.name))),
            None => Ok(()),
        }
    }

    /// Records the first fatal, non-retryable error. Subsequent dispatch
    /// attempts observe it via [`check_abort`](Self::check_abort).
    pub fn mark_abort(&self, message: String) {
        self.abort_handle().mark(message);
    }

    /// A cloneable handle a dispatched job can capture to call [`AbortHandle::mark`]
    /// from inside the pool without borrowing the pool itself.
    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle(Arc::clone(&self.abort))
    }

    /// Dispatches `job` unless the pool has already aborted or the action
    /// was cancelled.
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) -> Result<(), EngineError> {
        self.check_abort()?;
        self.sender
            .as_ref()
            .expect("pool not yet shut down")
            .send(Box::new(job))
            .map_err(|_| EngineError::Fatal(format!("{}: worker pool channel closed", self.name)))
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        drop(self.sender.take());
        while let Some(handle) = self.handles.pop() {
            let _ = handle.join();
        }
    }
}
