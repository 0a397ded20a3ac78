use thiserror::Error;

/// Tagged error taxonomy driving retry/refresh decisions across the vault,
/// control-plane and engine crates. Never stringly typed: callers match on
/// the variant, not on a message.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Network timeouts, connection resets, 5xx: retried with backoff.
    #[error("transient I/O error: {0}")]
    Transient(String),

    /// 401/403 on the control plane, or `Forbidden`/`AccessDenied`/
    /// `SignatureDoesNotMatch` on the vault: triggers a credential or
    /// restore-session-key refresh, then one retry.
    #[error("authorization error: {0}")]
    Auth(String),

    /// `NotFound`/404: returned verbatim, never retried.
    #[error("not found: {0}")]
    NotFound(String),

    /// ETag does not contain the expected key after upload.
    #[error("integrity mismatch for {key}")]
    Integrity { key: String },

    /// Observed at a suspension point after a cancellation signal.
    #[error("operation cancelled")]
    Cancelled,

    /// Local I/O that does not abort the action (file disappeared,
    /// permission denied) is reported by the caller as a counted error, not
    /// through this variant. This variant is for errors that ARE fatal to
    /// the action: backoff max-elapsed exhaustion, persistent auth failure,
    /// or any error a caller decides cannot be retried further.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl EngineError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Transient(_))
    }
}
