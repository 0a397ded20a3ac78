use serde::{Deserialize, Serialize};

/// Opaque-to-the-engine, refreshable object-store credentials. Issued on
/// demand per `(vault_id, action_id)`, rotated on `Forbidden`/`AccessDenied`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialBundle {
    pub access_key_id: String,
    pub secret_key: String,
    pub session_token: Option<String>,
    pub endpoint: String,
    pub region: String,
}

/// A rotating token used during restore to authorize credential issuance
/// for historical recovery points. Re-minted on 401.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthRestore {
    pub recovery_point_id: String,
    pub action_id: String,
    pub created_at: String,
    pub restore_session_key: String,
}
