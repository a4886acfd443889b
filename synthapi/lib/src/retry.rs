//! Timeout handling for outbound calls.
//!
//! Every outbound request runs under a deadline. A request that times out is
//! retried once; any other failure is returned to the caller immediately.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Number of extra attempts made after a timeout.
const TIMEOUT_RETRIES: u32 = 1;

/// Runs `operation` under `timeout`, retrying once if the deadline elapses.
///
/// `on_timeout` builds the caller's error type once every attempt has timed
/// out.
pub(crate) async fn with_timeout_retry<F, Fut, T, E>(
    timeout: Duration,
    label: &str,
    operation: F,
    on_timeout: impl FnOnce(Duration) -> E,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    for attempt in 0..=TIMEOUT_RETRIES {
        match tokio::time::timeout(timeout, operation()).await {
            Ok(result) => return result,
            Err(_) if attempt < TIMEOUT_RETRIES => {
                warn!(
                    "{} timed out after {:?}, retry {} of {}",
                    label,
                    timeout,
                    attempt + 1,
                    TIMEOUT_RETRIES
                );
            }
            Err(_) => {}
        }
    }

    Err(on_timeout(timeout))
}
