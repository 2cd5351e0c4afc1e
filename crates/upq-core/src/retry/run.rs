//! Retry loop: run an async operation until success or the policy says stop.

use std::future::Future;

use super::classify;
use super::policy::{RetryDecision, RetryPolicy};
use crate::control::Shutdown;
use crate::remote::RemoteError;

/// Runs `f` until it succeeds or the retry policy says to stop. Once shutdown
/// is requested no further attempt is started, including when the request
/// arrives during a backoff sleep; the last error is returned.
pub async fn run_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    shutdown: &Shutdown,
    mut f: F,
) -> Result<T, RemoteError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RemoteError>>,
{
    let mut attempt = 1u32;
    loop {
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                let kind = classify::classify(&e);
                match policy.decide(attempt, kind) {
                    RetryDecision::NoRetry => return Err(e),
                    RetryDecision::RetryAfter(_) if shutdown.is_requested() => return Err(e),
                    RetryDecision::RetryAfter(d) => {
                        tracing::debug!(attempt, ?kind, delay_ms = d.as_millis() as u64, "retrying after: {}", e);
                        tokio::select! {
                            _ = tokio::time::sleep(d) => {}
                            _ = shutdown.requested() => {}
                        }
                        if shutdown.is_requested() {
                            tracing::debug!(attempt, "shutdown requested during backoff, not retrying");
                            return Err(e);
                        }
                        attempt += 1;
                    }
                }
            }
        }
    }
}
