use serde::{Deserialize, Serialize};

/// Per-action state machine named in prose by the backup engine design:
/// `PENDING -> SCAN -> UPLOADING -> UPLOAD_INDEX -> COMPLETED|FAILED`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionState {
    Pending,
    Scan,
    Uploading,
    UploadIndex,
    Completed,
    Failed,
    Cancelled,
}

impl ActionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ActionState::Completed | ActionState::Failed | ActionState::Cancelled
        )
    }
}

/// An external record of an in-progress or past backup/restore action,
/// reported periodically to the control plane.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Activity {
    pub action_id: String,
    pub status: ActionState,
    /// 0-100.
    pub progress: u8,
    pub message: String,
    pub updated_at: String,
}
