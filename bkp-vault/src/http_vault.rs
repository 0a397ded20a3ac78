use std::io::Read;
use std::sync::Arc;

use bkp_api_types::{AuthRestore, CredentialBundle, EngineError};
use log::{debug, warn};

use crate::credential::{CredentialCell, CredentialRefresher};
use crate::rate_limit::{RateLimiter, ThrottledReader};
use crate::retry::with_retry;
use crate::vault::ObjectVault;

/// A blocking `ureq` client exercising enough of an S3-compatible surface
/// (PUT/GET/HEAD under a base URL, credentials as headers) to carry the
/// retry/backoff/refresh/rate-limit logic; the exact wire format of a real
/// S3-compatible backend is not reproduced.
pub struct HttpObjectVault {
    endpoint_base: String,
    credentials: CredentialCell,
    refresher: Arc<dyn CredentialRefresher>,
    auth_restore: Option<AuthRestore>,
    upload_limiter: RateLimiter,
    download_limiter: RateLimiter,
    agent: ureq::Agent,
    cancelled: Arc<dyn Fn() -> bool + Send + Sync>,
}

impl HttpObjectVault {
    pub fn new(
        endpoint_base: String,
        initial_credential: CredentialBundle,
        refresher: Arc<dyn CredentialRefresher>,
        upload_kb_per_sec: u64,
        download_kb_per_sec: u64,
    ) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(std::time::Duration::from_secs(120))
            .build();
        Self {
            endpoint_base,
            credentials: CredentialCell::new(initial_credential),
            refresher,
            auth_restore: None,
            upload_limiter: RateLimiter::new(upload_kb_per_sec),
            download_limiter: RateLimiter::new(download_kb_per_sec),
            agent,
            cancelled: Arc::new(|| false),
        }
    }

    pub fn with_auth_restore(mut self, auth_restore: AuthRestore) -> Self {
        self.auth_restore = Some(auth_restore);
        self
    }

    pub fn with_cancellation(mut self, cancelled: Arc<dyn Fn() -> bool + Send + Sync>) -> Self {
        self.cancelled = cancelled;
        self
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.endpoint_base.trim_end_matches('/'), key)
    }

    fn classify_request_error(err: ureq::Error) -> EngineError {
        match err {
            ureq::Error::Status(code, response) => {
                let body = response.into_string().unwrap_or_default();
                match code {
                    404 => EngineError::NotFound(body),
                    401 | 403 => EngineError::Auth(body),
                    409 if body.contains("SignatureDoesNotMatch") => EngineError::Auth(body),
                    500..=599 => EngineError::Transient(format!("{code}: {body}")),
                    other => EngineError::Fatal(format!("{other}: {body}")),
                }
            }
            ureq::Error::Transport(transport) => EngineError::Transient(transport.to_string()),
        }
    }

    /// Runs `op` under the retry loop; on an `Auth` error, refreshes the
    /// credential bundle once (minting a fresh restore-session-key first
    /// when restoring) and retries the whole retry loop once more.
    fn with_auth_retry<T>(&self, op: impl Fn(&CredentialBundle) -> Result<T, EngineError>) -> Result<T, EngineError> {
        let cancelled = || (self.cancelled)();
        let first = with_retry(|| op(&self.credentials.get()), cancelled);
        match first {
            Err(EngineError::Auth(msg)) => {
                warn!("object vault auth error, refreshing credentials: {msg}");
                self.credentials.refresh(&*self.refresher, self.auth_restore.as_ref())?;
                with_retry(|| op(&self.credentials.get()), cancelled)
            }
            other => other,
        }
    }

    fn do_put(&self, key: &str, bytes: &[u8]) -> Result<(), EngineError> {
        self.with_auth_retry(|creds| {
            let url = self.object_url(key);
            let mut reader = ThrottledReader::new(bytes, &self.upload_limiter);
            let mut body = Vec::with_capacity(bytes.len());
            reader.read_to_end(&mut body).map_err(|e| EngineError::Transient(e.to_string()))?;
            self.agent
                .put(&url)
                .set("Authorization", &format!("Bearer {}", creds.access_key_id))
                .send_bytes(&body)
                .map(|_| ())
                .map_err(Self::classify_request_error)
        })
    }
}

impl ObjectVault for HttpObjectVault {
    fn put_object(&self, key: &str, bytes: &[u8]) -> Result<(), EngineError> {
        debug!("put_object {key} ({} bytes)", bytes.len());
        self.do_put(key, bytes)
    }

    fn put_object_multipart(&self, key: &str, bytes: &[u8]) -> Result<(), EngineError> {
        debug!("put_object_multipart {key} ({} bytes)", bytes.len());
        // Real multipart wire format not reproduced; a real backend would
        // chunk `bytes` into parts and issue CreateMultipartUpload/
        // UploadPart/CompleteMultipartUpload.
        self.do_put(key, bytes)
    }

    fn get_object(&self, key: &str) -> Result<Vec<u8>, EngineError> {
        self.with_auth_retry(|creds| {
            let url = self.object_url(key);
            let response = self
                .agent
                .get(&url)
                .set("Authorization", &format!("Bearer {}", creds.access_key_id))
                .call()
                .map_err(Self::classify_request_error)?;
            let mut body = Vec::new();
            let mut reader = ThrottledReader::new(response.into_reader(), &self.download_limiter);
            reader
                .read_to_end(&mut body)
                .map_err(|e| EngineError::Transient(e.to_string()))?;
            Ok(body)
        })
    }

    fn head_object(&self, key: &str) -> Result<(bool, Option<String>), EngineError> {
        self.with_auth_retry(|creds| {
            let url = self.object_url(key);
            match self
                .agent
                .head(&url)
                .set("Authorization", &format!("Bearer {}", creds.access_key_id))
                .call()
            {
                Ok(response) => {
                    let etag = response.header("ETag").map(|s| s.trim_matches('"').to_string());
                    Ok((true, etag))
                }
                Err(ureq::Error::Status(404, _)) => Ok((false, None)),
                Err(err) => Err(Self::classify_request_error(err)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    struct FakeRefresher {
        issued: AtomicU32,
    }

    impl CredentialRefresher for FakeRefresher {
        fn refresh_credential(&self, _auth_restore: Option<&AuthRestore>) -> Result<CredentialBundle, EngineError> {
            let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(CredentialBundle {
                access_key_id: format!("ak-{n}"),
                secret_key: "sk".into(),
                session_token: None,
                endpoint: "https://vault.example".into(),
                region: "us-east-1".into(),
            })
        }
    }

    fn make_vault(refresher: Arc<FakeRefresher>) -> HttpObjectVault {
        HttpObjectVault::new(
            "https://vault.example".into(),
            CredentialBundle {
                access_key_id: "ak-stale".into(),
                secret_key: "sk".into(),
                session_token: None,
                endpoint: "https://vault.example".into(),
                region: "us-east-1".into(),
            },
            refresher,
            0,
            0,
        )
    }

    #[test]
    fn auth_error_mid_put_triggers_one_credential_refresh_and_retry() {
        let refresher = Arc::new(FakeRefresher { issued: AtomicU32::new(0) });
        let vault = make_vault(Arc::clone(&refresher));

        let attempts = AtomicU32::new(0);
        let result = vault.with_auth_retry(|creds| {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst);
            if attempt == 0 {
                assert_eq!(creds.access_key_id, "ak-stale");
                Err(EngineError::Auth("token expired".into()))
            } else {
                assert_eq!(creds.access_key_id, "ak-1");
                Ok(())
            }
        });

        assert!(result.is_ok());
        assert_eq!(refresher.issued.load(Ordering::SeqCst), 1, "exactly one refresh for one auth failure");
        assert_eq!(vault.credentials.get().access_key_id, "ak-1");
    }

    #[test]
    fn not_found_is_never_retried_or_refreshed() {
        let refresher = Arc::new(FakeRefresher { issued: AtomicU32::new(0) });
        let vault = make_vault(Arc::clone(&refresher));

        let attempts = AtomicU32::new(0);
        let result: Result<(), EngineError> = vault.with_auth_retry(|_creds| {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(EngineError::NotFound("missing".into()))
        });

        assert!(matches!(result, Err(EngineError::NotFound(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(refresher.issued.load(Ordering::SeqCst), 0);
    }
}
