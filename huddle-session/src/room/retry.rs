use crate::config::RetryPolicy;
use huddle_core::Result;
use std::future::Future;
use tracing::warn;

/// Run `op`, retrying transient failures with the policy's backoff.
pub(crate) async fn with_retry<T, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.backoff(attempt);
                warn!("{} failed (attempt {}): {}, retrying in {:?}", what, attempt, e, delay);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
