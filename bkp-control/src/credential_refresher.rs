use std::sync::Arc;

use bkp_api_types::{AuthRestore, CredentialBundle, EngineError};
use bkp_vault::CredentialRefresher;

use crate::contract::ControlPlaneClient;

/// Adapts a [`ControlPlaneClient`] into the [`CredentialRefresher`] the
/// vault calls into. The restore path always re-mints the restore-session-
/// key before re-issuing a credential request; credential refresh and
/// session-key rotation are distinct operations guarded by the vault's
/// single per-vault refresh mutex.
pub struct ControlPlaneCredentialRefresher {
    client: Arc<dyn ControlPlaneClient>,
    vault_id: String,
    action_id: String,
    recovery_point_id: Option<String>,
}

impl ControlPlaneCredentialRefresher {
    pub fn new(client: Arc<dyn ControlPlaneClient>, vault_id: String, action_id: String) -> Self {
        Self {
            client,
            vault_id,
            action_id,
            recovery_point_id: None,
        }
    }

    pub fn for_restore(mut self, recovery_point_id: String) -> Self {
        self.recovery_point_id = Some(recovery_point_id);
        self
    }
}

impl CredentialRefresher for ControlPlaneCredentialRefresher {
    fn refresh_credential(&self, auth_restore: Option<&AuthRestore>) -> Result<CredentialBundle, EngineError> {
        let auth_restore = match (auth_restore, &self.recovery_point_id) {
            (Some(ar), Some(rp_id)) => {
                let new_key = self
                    .client
                    .get_restore_session_key(rp_id, &self.action_id, &ar.created_at)
                    .map_err(|e| EngineError::Auth(e.to_string()))?;
                Some(AuthRestore {
                    restore_session_key: new_key,
                    ..ar.clone()
                })
            }
            (other, _) => other.cloned(),
        };

        self.client
            .get_credential(&self.vault_id, &self.action_id, auth_restore.as_ref())
            .map_err(|e| EngineError::Auth(e.to_string()))
    }
}
