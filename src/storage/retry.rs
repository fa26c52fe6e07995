use crate::error::OpsResult;
use log::warn;
use std::future::Future;
use tokio::time::{sleep, Duration};

pub const MAX_ATTEMPTS: u32 = 3;
const BASE_DELAY_MS: u64 = 50;
const MAX_DELAY_MS: u64 = 1_000;

/// Runs `op` again when it fails with a transient storage error (lock
/// contention, pool exhaustion). Validation failures are returned at once.
pub async fn with_retry<T, F, Fut>(op_name: &str, mut op: F) -> OpsResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = OpsResult<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(err) if err.is_transient() && attempt < MAX_ATTEMPTS => {
                let delay = backoff_delay(attempt);
                warn!(
                    "⚠ {} hit transient storage error (attempt {}/{}), retrying in {}ms: {}",
                    op_name,
                    attempt,
                    MAX_ATTEMPTS,
                    delay.as_millis(),
                    err
                );
                sleep(delay).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    let exp = (1u64 << attempt.min(10)).saturating_mul(BASE_DELAY_MS);
    let delay = exp.min(MAX_DELAY_MS);
    // jitter: 0~20%
    let jitter = (delay / 5) * (rand::random::<u8>() as u64 % 5) / 5;
    Duration::from_millis(delay + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OpsError;
    use sea_orm::DbErr;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = with_retry("test", move || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Err(OpsError::Storage(DbErr::Custom(
                    "database is locked".to_string(),
                )))
            } else {
                Ok(n)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: OpsResult<()> = with_retry("test", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(OpsError::Storage(DbErr::Custom(
                "database is locked".to_string(),
            )))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }

    #[tokio::test]
    async fn validation_errors_are_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: OpsResult<()> = with_retry("test", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(OpsError::MissingRequiredField("reason"))
        })
        .await;
        assert!(matches!(result, Err(OpsError::MissingRequiredField(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn backoff_is_capped() {
        assert!(backoff_delay(10) <= Duration::from_millis(MAX_DELAY_MS + MAX_DELAY_MS / 5));
    }
}
