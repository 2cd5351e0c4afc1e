//! Retry and backoff policy for chunk transfers.
//!
//! Classifies remote failures (timeouts, throttling, connection resets, 5xx)
//! and decides exponential backoff so a transient blip doesn't push a whole
//! job onto the failure queue.

mod classify;
mod policy;
mod run;

pub use classify::{classify, classify_curl_error, classify_http_status};
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
pub use run::run_with_retry;
