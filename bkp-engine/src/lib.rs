//! Backup and restore orchestration: the dedup algorithm, the cancellable
//! worker pool chunk uploads and per-node restores are dispatched to, and
//! the per-file offset-ordering discipline that reassembles `Node.content`
//! regardless of which worker finishes a chunk first.

mod backup;
mod cancel;
mod digest;
mod pool;
mod restore;

pub use backup::{BackupEngine, BackupParams};
pub use cancel::CancellationToken;
pub use digest::{md5_hex, Sha256Accumulator};
pub use pool::{AbortHandle, WorkerPool};
pub use restore::RestoreEngine;
