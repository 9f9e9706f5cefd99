//! Shared utility functions for the tienda application.

use std::future::Future;
use std::time::Duration;

use sha2::{Digest, Sha256};

/// Bounded retry policy for outbound gateway calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(4),
        }
    }
}

/// Run `op` up to `policy.max_attempts` times, sleeping with doubling backoff
/// between attempts. Only errors for which `is_retryable` returns true are
/// retried; the last error is returned once attempts are exhausted.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    is_retryable: impl Fn(&E) -> bool,
    mut op: F,
) -> std::result::Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
{
    let mut delay = policy.base_delay;
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if attempt < policy.max_attempts && is_retryable(&e) => {
                tracing::warn!("Retryable failure (attempt {}/{})", attempt, policy.max_attempts);
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(policy.max_delay);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Shorten an internal id to at most `max` characters for gateways that cap
/// merchant-supplied reference fields. Ids within the limit pass through
/// unchanged; longer ids keep a prefix and append a 16-hex-char digest so the
/// result stays deterministic and collision-resistant.
pub fn shorten_reference(id: &str, max: usize) -> String {
    if id.len() <= max {
        return id.to_string();
    }
    let digest = hex::encode(Sha256::digest(id.as_bytes()));
    let tail = &digest[..16];
    let head = &id[..max.saturating_sub(tail.len() + 1)];
    format!("{}-{}", head, tail)
}
