use std::sync::Mutex;

use bkp_api_types::{AuthRestore, CredentialBundle, EngineError};

/// Capability the vault calls into to obtain a fresh credential bundle (or,
/// during restore, a fresh restore-session-key first). Implemented by the
/// control-plane client; kept as a trait here so `bkp-vault` does not
/// depend on `bkp-control`.
pub trait CredentialRefresher: Send + Sync {
    fn refresh_credential(&self, auth_restore: Option<&AuthRestore>) -> Result<CredentialBundle, EngineError>;
}

/// Holds the vault's shared, mutable credential bundle. Refresh is
/// serialized by the mutex so at most one refresh is in flight per vault.
pub struct CredentialCell {
    current: Mutex<CredentialBundle>,
}

impl CredentialCell {
    pub fn new(initial: CredentialBundle) -> Self {
        Self {
            current: Mutex::new(initial),
        }
    }

    pub fn get(&self) -> CredentialBundle {
        self.current.lock().unwrap().clone()
    }

    /// Refreshes and stores the new bundle; returns it. Held under the same
    /// mutex as `get`, so concurrent callers serialize on one refresh.
    pub fn refresh(
        &self,
        refresher: &dyn CredentialRefresher,
        auth_restore: Option<&AuthRestore>,
    ) -> Result<CredentialBundle, EngineError> {
        let mut guard = self.current.lock().unwrap();
        let fresh = refresher.refresh_credential(auth_restore)?;
        *guard = fresh.clone();
        Ok(fresh)
    }
}
