use serde::{Deserialize, Serialize};

/// Message-bus payload the daemon's subscriber decodes and hands to the
/// engine. One variant per `event_type`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum Directive {
    BackupManual {
        machine_id: String,
        created_at: String,
        backup_directory_id: String,
        policy_id: Option<String>,
        action_id: String,
    },
    RestoreManual {
        machine_id: String,
        created_at: String,
        recovery_point_id: String,
        dest_directory: String,
        restore_session_key: String,
        action_id: String,
    },
    UpdateConfig {
        machine_id: String,
        created_at: String,
    },
    RefreshConfig {
        machine_id: String,
        created_at: String,
    },
    AgentUpgrade {
        machine_id: String,
        created_at: String,
    },
    StatusNotify {
        machine_id: String,
        created_at: String,
        action_id: String,
    },
}

impl Directive {
    pub fn action_id(&self) -> Option<&str> {
        match self {
            Directive::BackupManual { action_id, .. } => Some(action_id),
            Directive::RestoreManual { action_id, .. } => Some(action_id),
            Directive::StatusNotify { action_id, .. } => Some(action_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_backup_manual() {
        let payload = r#"{
            "event_type": "backup_manual",
            "machine_id": "m1",
            "created_at": "2026-01-01T00:00:00Z",
            "backup_directory_id": "bd1",
            "policy_id": null,
            "action_id": "a1"
        }"#;
        let directive: Directive = serde_json::from_str(payload).unwrap();
        assert_eq!(directive.action_id(), Some("a1"));
    }

    #[test]
    fn rejects_unknown_event_type() {
        let payload = r#"{"event_type": "teleport", "machine_id": "m1"}"#;
        assert!(serde_json::from_str::<Directive>(payload).is_err());
    }
}
