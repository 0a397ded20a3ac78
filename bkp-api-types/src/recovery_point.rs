use serde::{Deserialize, Serialize};

/// An immutable snapshot identity. Created by the control plane on request;
/// the engine only ever advances [`RecoveryPointStatus`] forward.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecoveryPoint {
    pub id: String,
    pub backup_directory_id: String,
    #[serde(rename = "type")]
    pub recovery_point_type: RecoveryPointType,
    pub status: RecoveryPointStatus,
    pub created_at: String,
    pub updated_at: String,
    pub policy_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryPointType {
    RecoveryPoint,
    InitialReplica,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryPointStatus {
    Created,
    Uploading,
    Completed,
    Failed,
}

impl RecoveryPointStatus {
    /// Terminal statuses never transition further.
    pub fn is_terminal(self) -> bool {
        matches!(self, RecoveryPointStatus::Completed | RecoveryPointStatus::Failed)
    }

    /// Whether `self -> next` is an allowed, monotone transition.
    pub fn can_transition_to(self, next: RecoveryPointStatus) -> bool {
        use RecoveryPointStatus::*;
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (Created, Uploading)
                | (Created, Completed)
                | (Created, Failed)
                | (Uploading, Completed)
                | (Uploading, Failed)
        )
    }
}
