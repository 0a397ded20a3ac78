//! Thin facade over the backup/restore data engine workspace. CLI parsing,
//! daemon lifecycle and the message-bus subscriber loop live outside this
//! crate; it only re-exports the engine's building blocks and the wire type
//! (`Directive`) an external subscriber would decode before handing a
//! directive to [`BackupEngine`] or [`RestoreEngine`].

pub use bkp_api_types::{
    ActionState, Activity, AgentConfig, AuthRestore, ChunkManifest, ChunkRef, CredentialBundle, Directive,
    EngineError, Index, Node, NodeAttributes, NodeType, RecoveryPoint, RecoveryPointStatus, RecoveryPointType,
};
pub use bkp_chunker::{Chunker, ChunkerStream, CHUNK_SIZE_AVG, CHUNK_SIZE_MAX, CHUNK_SIZE_MIN};
pub use bkp_control::{
    ControlPlaneClient, ControlPlaneCredentialRefresher, CreateRecoveryPointRequest, CreateRecoveryPointResponse,
    HttpControlPlaneClient, VaultDescriptor,
};
pub use bkp_datastore::CacheRepository;
pub use bkp_engine::{BackupEngine, BackupParams, CancellationToken, RestoreEngine, WorkerPool};
pub use bkp_progress::{Delta, ProgressReporter, Stat};
pub use bkp_vault::{CredentialCell, CredentialRefresher, HttpObjectVault, ObjectVault, RateLimiter};
pub use bkp_walk::{WalkOutcome, Walker};

/// Resolves the worker-pool / restore-concurrency size from an
/// [`AgentConfig`] and the host's logical core count: 20% of cores,
/// minimum 2, overridable via `num_goroutine`.
pub fn worker_pool_size(config: &AgentConfig) -> usize {
    let logical_cores = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    config.worker_pool_size(logical_cores)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_pool_size_falls_back_to_host_cores() {
        let config = AgentConfig {
            broker_url: "amqp://localhost".into(),
            machine_id: "m1".into(),
            access_key: "ak".into(),
            secret_key: "sk".into(),
            api_url: "https://control.example".into(),
            num_goroutine: 0,
            limit_upload: 0,
            limit_download: 0,
        };
        assert!(worker_pool_size(&config) >= 2);
    }
}
