use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use bkp_api_types::EngineError;

/// Canonical backoff shape shared by the vault and control-plane clients:
/// initial interval ~500ms, max interval 3 minutes, max elapsed time 3
/// minutes.
pub fn default_backoff() -> ExponentialBackoff {
    ExponentialBackoff {
        initial_interval: Duration::from_millis(500),
        max_interval: Duration::from_secs(180),
        max_elapsed_time: Some(Duration::from_secs(180)),
        ..ExponentialBackoff::default()
    }
}

/// Retries `op` under [`default_backoff`]. Only `EngineError::Transient`
/// errors are retried; `NotFound` is returned immediately; everything else
/// (including `Auth`, which the caller handles by refreshing credentials
/// and retrying once) is also returned immediately. This loop only ever
/// absorbs transient network failures.
pub fn with_retry<T>(
    mut op: impl FnMut() -> Result<T, EngineError>,
    cancelled: impl Fn() -> bool,
) -> Result<T, EngineError> {
    let mut backoff = default_backoff();
    loop {
        if cancelled() {
            return Err(EngineError::Cancelled);
        }
        match op() {
            Ok(value) => return Ok(value),
            Err(EngineError::Transient(msg)) => match backoff.next_backoff() {
                Some(delay) => std::thread::sleep(delay),
                None => return Err(EngineError::Fatal(format!("backoff exhausted: {msg}"))),
            },
            Err(other) => return Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn retries_transient_then_succeeds() {
        let attempts = AtomicU32::new(0);
        let result = with_retry(
            || {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(EngineError::Transient("timeout".into()))
                } else {
                    Ok(42)
                }
            },
            || false,
        );
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn not_found_is_never_retried() {
        let attempts = AtomicU32::new(0);
        let result = with_retry(
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(EngineError::NotFound("k".into()))
            },
            || false,
        );
        assert!(matches!(result, Err(EngineError::NotFound(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancellation_is_observed_before_each_attempt() {
        let result: Result<(), EngineError> = with_retry(|| Ok(()), || true);
        assert!(matches!(result, Err(EngineError::Cancelled)));
    }
}
