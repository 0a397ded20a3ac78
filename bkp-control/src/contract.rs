use bkp_api_types::{ActionState, Activity, AuthRestore, CredentialBundle, RecoveryPoint, RecoveryPointStatus};

/// Carries credentials for the first attempt against a freshly created
/// recovery point, plus enough identity to ask for refreshed credentials
/// later.
#[derive(Debug, Clone)]
pub struct VaultDescriptor {
    pub vault_id: String,
    pub endpoint: String,
    pub credential: CredentialBundle,
}

#[derive(Debug, Clone)]
pub struct CreateRecoveryPointRequest {
    pub backup_directory_id: String,
    pub recovery_point_type: bkp_api_types::RecoveryPointType,
    pub policy_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateRecoveryPointResponse {
    pub id: String,
    pub recovery_point: RecoveryPoint,
    pub action_id: String,
    pub vault_descriptor: VaultDescriptor,
}

/// Capabilities the engine consumes from the control plane: recovery-point
/// CRUD, activity updates, credential issuance and restore-session-key
/// rotation. This is the engine-facing interface, not the control plane's
/// own HTTP wire contract.
pub trait ControlPlaneClient: Send + Sync {
    fn create_recovery_point(
        &self,
        backup_directory_id: &str,
        request: &CreateRecoveryPointRequest,
    ) -> anyhow::Result<CreateRecoveryPointResponse>;

    /// Idempotent status transition.
    fn update_recovery_point(
        &self,
        backup_directory_id: &str,
        recovery_point_id: &str,
        status: RecoveryPointStatus,
    ) -> anyhow::Result<()>;

    fn get_credential(
        &self,
        vault_id: &str,
        action_id: &str,
        auth_restore: Option<&AuthRestore>,
    ) -> anyhow::Result<CredentialBundle>;

    /// Rotates the restore-session-key, minted fresh on a 401 during
    /// restore-credential issuance.
    fn get_restore_session_key(
        &self,
        recovery_point_id: &str,
        action_id: &str,
        created_at: &str,
    ) -> anyhow::Result<String>;

    fn list_activity(&self, machine_id: &str, statuses: &[ActionState]) -> anyhow::Result<Vec<Activity>>;

    fn report_activity(
        &self,
        action_id: &str,
        status: ActionState,
        progress: u8,
        message: &str,
    ) -> anyhow::Result<()>;
}
