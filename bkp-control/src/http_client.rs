use anyhow::Context;
use bkp_api_types::{ActionState, Activity, AuthRestore, CredentialBundle, EngineError, RecoveryPoint, RecoveryPointStatus};
use bkp_vault::with_retry;
use serde::{Deserialize, Serialize};

use crate::contract::{ControlPlaneClient, CreateRecoveryPointRequest, CreateRecoveryPointResponse, VaultDescriptor};
use crate::signing::sign;

/// Retrying HTTP implementation of [`ControlPlaneClient`]. Every request
/// carries the `VBS <access>:hex(sha256(method||access||secret||date))`
/// signature header and a matching `Date:`; restore-credential calls also
/// carry `X-Session-Created-At`/`X-Restore-Session-Key`.
pub struct HttpControlPlaneClient {
    base_url: String,
    access_key: String,
    secret_key: String,
    agent: ureq::Agent,
}

impl HttpControlPlaneClient {
    pub fn new(base_url: String, access_key: String, secret_key: String) -> Self {
        Self {
            base_url,
            access_key,
            secret_key,
            agent: ureq::AgentBuilder::new()
                .timeout(std::time::Duration::from_secs(120))
                .build(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Issues one signed request, classifying the response the way the
    /// retry loop expects: status < 400 or == 404 is returned to the
    /// caller, everything else is retried or surfaced as fatal.
    fn request_json<B: Serialize + ?Sized, T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        path: &str,
        body: Option<&B>,
        extra_headers: &[(&str, &str)],
    ) -> Result<T, EngineError> {
        with_retry(
            || {
                let (auth, date) = sign(method, &self.access_key, &self.secret_key);
                let url = self.url(path);
                let mut request = self
                    .agent
                    .request(method, &url)
                    .set("Authorization", &auth)
                    .set("Date", &date);
                for (name, value) in extra_headers {
                    request = request.set(name, value);
                }

                let response = match body {
                    Some(body) => request.send_json(serde_json::to_value(body).unwrap()),
                    None => request.call(),
                };

                match response {
                    Ok(response) => response
                        .into_json::<T>()
                        .map_err(|e| EngineError::Fatal(format!("decoding response: {e}"))),
                    Err(ureq::Error::Status(404, response)) => {
                        Err(EngineError::NotFound(response.into_string().unwrap_or_default()))
                    }
                    Err(ureq::Error::Status(401, response)) | Err(ureq::Error::Status(403, response)) => {
                        Err(EngineError::Auth(response.into_string().unwrap_or_default()))
                    }
                    Err(ureq::Error::Status(code, response)) if (500..600).contains(&code) => {
                        Err(EngineError::Transient(response.into_string().unwrap_or_default()))
                    }
                    Err(ureq::Error::Status(code, response)) => Err(EngineError::Fatal(format!(
                        "{code}: {}",
                        response.into_string().unwrap_or_default()
                    ))),
                    Err(ureq::Error::Transport(t)) => Err(EngineError::Transient(t.to_string())),
                }
            },
            || false,
        )
    }

    fn request_empty<B: Serialize + ?Sized>(&self, method: &str, path: &str, body: &B) -> Result<(), EngineError> {
        self.request_json::<B, serde_json::Value>(method, path, Some(body), &[])
            .map(|_| ())
    }
}

#[derive(Serialize)]
struct CreateRecoveryPointBody<'a> {
    backup_directory_id: &'a str,
    #[serde(rename = "type")]
    recovery_point_type: bkp_api_types::RecoveryPointType,
    policy_id: &'a Option<String>,
}

#[derive(Deserialize)]
struct CreateRecoveryPointWireResponse {
    id: String,
    recovery_point: RecoveryPoint,
    action_id: String,
    vault_id: String,
    endpoint: String,
    credential: CredentialBundle,
}

#[derive(Serialize)]
struct UpdateStatusBody {
    status: RecoveryPointStatus,
}

#[derive(Serialize)]
struct ReportActivityBody<'a> {
    status: ActionState,
    progress: u8,
    message: &'a str,
}

#[derive(Serialize)]
struct RestoreSessionKeyBody<'a> {
    action_id: &'a str,
    created_at: &'a str,
}

#[derive(Deserialize)]
struct RestoreSessionKeyResponse {
    restore_session_key: String,
}

impl ControlPlaneClient for HttpControlPlaneClient {
    fn create_recovery_point(
        &self,
        backup_directory_id: &str,
        request: &CreateRecoveryPointRequest,
    ) -> anyhow::Result<CreateRecoveryPointResponse> {
        let body = CreateRecoveryPointBody {
            backup_directory_id,
            recovery_point_type: request.recovery_point_type,
            policy_id: &request.policy_id,
        };
        let path = format!("/backup-directories/{backup_directory_id}/recovery-points");
        let response: CreateRecoveryPointWireResponse = self
            .request_json("POST", &path, Some(&body), &[])
            .context("create_recovery_point")?;

        Ok(CreateRecoveryPointResponse {
            id: response.id,
            recovery_point: response.recovery_point,
            action_id: response.action_id,
            vault_descriptor: VaultDescriptor {
                vault_id: response.vault_id,
                endpoint: response.endpoint,
                credential: response.credential,
            },
        })
    }

    fn update_recovery_point(
        &self,
        backup_directory_id: &str,
        recovery_point_id: &str,
        status: RecoveryPointStatus,
    ) -> anyhow::Result<()> {
        let path = format!("/backup-directories/{backup_directory_id}/recovery-points/{recovery_point_id}");
        self.request_empty("PATCH", &path, &UpdateStatusBody { status })
            .context("update_recovery_point")
    }

    fn get_credential(
        &self,
        vault_id: &str,
        action_id: &str,
        auth_restore: Option<&AuthRestore>,
    ) -> anyhow::Result<CredentialBundle> {
        let path = format!("/vaults/{vault_id}/credential?action_id={action_id}");
        let headers: Vec<(&str, &str)> = match auth_restore {
            Some(ar) => vec![
                ("X-Session-Created-At", ar.created_at.as_str()),
                ("X-Restore-Session-Key", ar.restore_session_key.as_str()),
            ],
            None => vec![],
        };
        self.request_json::<(), CredentialBundle>("GET", &path, None, &headers)
            .context("get_credential")
    }

    fn get_restore_session_key(
        &self,
        recovery_point_id: &str,
        action_id: &str,
        created_at: &str,
    ) -> anyhow::Result<String> {
        let path = format!("/recovery-points/{recovery_point_id}/restore-session-key");
        let body = RestoreSessionKeyBody { action_id, created_at };
        let response: RestoreSessionKeyResponse = self
            .request_json("POST", &path, Some(&body), &[])
            .context("get_restore_session_key")?;
        Ok(response.restore_session_key)
    }

    fn list_activity(&self, machine_id: &str, statuses: &[ActionState]) -> anyhow::Result<Vec<Activity>> {
        let statuses_str = statuses
            .iter()
            .map(|s| serde_plain::to_string(s).unwrap_or_default())
            .collect::<Vec<_>>()
            .join(",");
        let path = format!("/machines/{machine_id}/activity?statuses={statuses_str}");
        self.request_json::<(), Vec<Activity>>("GET", &path, None, &[])
            .context("list_activity")
    }

    fn report_activity(
        &self,
        action_id: &str,
        status: ActionState,
        progress: u8,
        message: &str,
    ) -> anyhow::Result<()> {
        let path = format!("/actions/{action_id}/activity");
        self.request_empty(
            "POST",
            &path,
            &ReportActivityBody {
                status,
                progress,
                message,
            },
        )
        .context("report_activity")
    }
}
