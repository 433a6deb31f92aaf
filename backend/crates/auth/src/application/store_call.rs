//! Store call helpers

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{AuthError, AuthResult};

/// Run a store call under `limit`; a timeout becomes `ServiceUnavailable`.
///
/// The call's future is dropped on timeout. Store operations are individually
/// atomic, so a dropped call has either fully applied or not at all.
pub(crate) async fn bounded<T, F>(limit: Duration, operation: &'static str, call: F) -> AuthResult<T>
where
    F: Future<Output = AuthResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                operation,
                timeout_ms = limit.as_millis() as u64,
                "Store call timed out"
            );
            Err(AuthError::ServiceUnavailable(format!("{operation} timed out")))
        }
    }
}

/// `now + ttl`
pub(crate) fn expires_after(now: DateTime<Utc>, ttl: Duration) -> AuthResult<DateTime<Utc>> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(|| AuthError::Internal(format!("TTL out of range: {ttl:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bounded_passes_result_through() {
        let result = bounded(Duration::from_secs(1), "noop", async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_times_out() {
        let result: AuthResult<()> = bounded(Duration::from_millis(50), "slow", async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await;

        let err = result.unwrap_err();
        assert!(matches!(err, AuthError::ServiceUnavailable(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_expires_after() {
        let now = Utc::now();
        let at = expires_after(now, Duration::from_secs(300)).unwrap();
        assert_eq!((at - now).num_seconds(), 300);
        assert!(expires_after(now, Duration::MAX).is_err());
    }
}
